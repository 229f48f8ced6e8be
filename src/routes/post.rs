use crate::{
    AppState,
    bucket::BucketKey,
    dto::{BucketListParams, CreatePostRequest, ListParams, ListResponse},
    errors::ApiError,
    extract::{JsonBody, QueryParams},
    models::Post,
    store::BucketGroup,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use validator::Validate;

/// POST /posts
/// Body: { "text": "...", "lat": 35.9897, "lng": 139.9791, "mode": "emergency", "category": "aid_request" }
pub async fn create_post(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::ValidationError(e.to_string()))?;

    let post = state.store.submit(payload.into()).await?;

    info!("Post created: {} at {}", post.id, post.bucket);

    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /posts?limit=100
/// Live posts, newest first.
pub async fn list_posts(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ListResponse<Post>>, ApiError> {
    let limit = state.config.list_limit(params.limit);
    let posts = state.store.list_active(limit).await?;

    Ok(Json(ListResponse::new(posts, limit)))
}

/// GET /posts/groups?limit=100
/// Live posts grouped by bucket, one entry per map marker.
pub async fn list_groups(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ListResponse<BucketGroup>>, ApiError> {
    let limit = state.config.list_limit(params.limit);
    let groups = state.store.list_grouped(limit).await?;

    Ok(Json(ListResponse::new(groups, limit)))
}

/// GET /buckets/{key}/posts?limit=4&order=asc
/// `key` is the bucket text form, e.g. `35.990_139.979`.
pub async fn list_bucket_posts(
    State(state): State<AppState>,
    Path(key): Path<String>,
    QueryParams(params): QueryParams<BucketListParams>,
) -> Result<Json<ListResponse<Post>>, ApiError> {
    let key: BucketKey = key
        .parse()
        .map_err(|e: crate::bucket::ParseBucketKeyError| ApiError::BadRequest(e.to_string()))?;

    let limit = state.config.list_limit(params.limit);
    let posts = state
        .store
        .list_by_bucket_ordered(key, limit, params.order)
        .await?;

    Ok(Json(ListResponse::new(posts, limit)))
}
