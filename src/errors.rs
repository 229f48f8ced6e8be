use crate::{collection::CollectionError, models::PostId, store::StoreError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

#[derive(Debug)]
pub enum ApiError {
    ValidationError(String),
    BadRequest(String),
    /// The body or query string could not be extracted.
    Rejected { status: StatusCode, message: String },
    StoreUnavailable(String),
    PartialFailure { evicted: Vec<PostId>, message: String },
    InternalError(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => ApiError::ValidationError(msg),
            StoreError::Store(CollectionError::Unavailable(_)) | StoreError::Timeout { .. } => {
                ApiError::StoreUnavailable(err.to_string())
            }
            StoreError::Store(_) => ApiError::InternalError(err.to_string()),
            StoreError::PartialFailure { ref evicted, .. } => ApiError::PartialFailure {
                evicted: evicted.clone(),
                message: err.to_string(),
            },
        }
    }
}

/// Convert our custom errors to HTTP responses
///
/// Validation and store-availability messages reach the client as-is so
/// the user (or operator) can act on them. Internal details only go to the log.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::ValidationError(msg) | ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": msg }),
            ),
            ApiError::Rejected { status, message } => {
                (status, serde_json::json!({ "error": message }))
            }
            ApiError::StoreUnavailable(msg) => {
                warn!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({ "error": msg }),
                )
            }
            ApiError::PartialFailure { evicted, message } => {
                error!("Partial failure: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({
                      "error": "Post was not saved, but older posts at this location were removed",
                      "evicted": evicted
                    }),
                )
            }
            ApiError::InternalError(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
