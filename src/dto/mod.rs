mod requests;
mod responses;

pub use requests::{BucketListParams, CreatePostRequest, ListParams};
pub use responses::ListResponse;
