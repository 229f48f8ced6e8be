mod post;

pub use post::{Category, Mode, NewPost, Post, PostId};
