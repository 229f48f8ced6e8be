mod health;
mod post;

pub use health::health_check;
pub use post::{create_post, list_bucket_posts, list_groups, list_posts};
