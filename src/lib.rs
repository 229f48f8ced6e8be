pub mod bucket;
pub mod clock;
pub mod collection;
pub mod config;
pub mod dto;
pub mod errors;
pub mod eviction;
pub mod extract;
pub mod models;
pub mod routes;
pub mod states;
pub mod store;

pub use states::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router over shared state.
pub fn app(state: AppState) -> Router {
    // The map client talks to the API straight from the browser.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_concurrent = state.config.max_concurrent_requests;

    Router::new()
        .route("/health", get(routes::health_check))
        .route("/posts", post(routes::create_post).get(routes::list_posts))
        .route("/posts/groups", get(routes::list_groups))
        .route("/buckets/{key}/posts", get(routes::list_bucket_posts))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
}
