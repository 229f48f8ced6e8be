use crate::{
    bucket::BucketKey,
    models::{Mode, Post},
};
use serde::Serialize;
use std::collections::HashMap;

/// Posts sharing one bucket, as rendered by a single map marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketGroup {
    pub key: BucketKey,
    pub lat: f64,
    pub lng: f64,
    /// Taken from the newest post in the group.
    pub mode: Mode,
    pub posts: Vec<Post>,
}

/// Partition newest-first posts by bucket.
///
/// Groups come out in the order their newest post appears; each keeps at
/// most `display_limit` posts, newest first. The display limit is
/// independent of bucket capacity.
pub fn group_by_bucket(
    posts: impl IntoIterator<Item = Post>,
    display_limit: usize,
) -> Vec<BucketGroup> {
    let mut groups: Vec<BucketGroup> = Vec::new();
    let mut index: HashMap<BucketKey, usize> = HashMap::new();

    for post in posts {
        let slot = *index.entry(post.bucket).or_insert_with(|| {
            groups.push(BucketGroup {
                key: post.bucket,
                lat: post.bucket.lat(),
                lng: post.bucket.lng(),
                mode: post.mode,
                posts: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        if group.posts.len() < display_limit {
            group.posts.push(post);
        }
    }

    groups
}
