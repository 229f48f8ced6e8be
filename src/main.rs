// ============================================================================
// GEODROP - LOCATION-BUCKETED EPHEMERAL POSTS
// ============================================================================

// - Anonymous posts pinned to ~100 m coordinate buckets
// - Per-bucket capacity with oldest-first eviction
// - Global time-to-live (sweep on write, or filter on read)
// - Grouped read path for map markers
// - Input validation
// - Structured logging

use geodrop::{
    AppState, app,
    collection::MemoryCollection,
    config::Config,
    store::PostStore,
};
use std::{process::ExitCode, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = PostStore::new(Arc::new(MemoryCollection::new()), config.store_settings());

    info!(
        "Store: capacity {} per bucket, display limit {}, TTL {}s, enforcement {}",
        config.bucket_capacity,
        config.display_limit,
        config.post_ttl_secs,
        config.ttl_enforcement
    );

    let _sweeper = config.sweep_interval().map(|every| {
        info!("Background sweep every {:?}", every);
        store.spawn_sweeper(every)
    });

    let addr = config.bind_addr.clone();
    let state = AppState {
        store,
        config: Arc::new(config),
    };

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server running on http://{}", addr);
    info!("API Endpoints:");
    info!("  GET    /health                - Health check");
    info!("  POST   /posts                 - Submit a post");
    info!("  GET    /posts                 - Live posts, newest first");
    info!("  GET    /posts/groups          - Live posts grouped by bucket");
    info!("  GET    /buckets/:key/posts    - Live posts at one bucket");

    if let Err(e) = axum::serve(listener, app(state)).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
