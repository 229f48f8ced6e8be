use crate::{config::Config, store::PostStore};
use std::sync::Arc;

// ============================================================================
// APPLICATION STATE - Shared data across all requests
// ============================================================================
/// `PostStore` is cheap to clone: the backend, the bucket locks and the
/// settings all sit behind `Arc`s, so every request sees the same store.
#[derive(Clone)]
pub struct AppState {
    pub store: PostStore,
    pub config: Arc<Config>,
}
