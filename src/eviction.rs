//! Capacity and age rules for posts.
//!
//! The policy only decides *which* posts go. Deleting them is the store's
//! job, so everything here is pure and synchronous.

use crate::{
    collection::{Direction, Field, Op, Query, Value},
    models::{Post, PostId},
};
use chrono::{DateTime, Duration, Utc};

/// Default time-to-live of a post.
pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

/// Default number of live posts kept per bucket.
pub const DEFAULT_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    capacity: usize,
    ttl: Duration,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl EvictionPolicy {
    /// A capacity of zero would leave no room for the incoming post, so it
    /// is raised to one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Posts to delete so the bucket holds exactly `capacity` once the
    /// pending post is inserted.
    ///
    /// `bucket` is expected oldest-first. Equal timestamps keep the order they
    /// arrived in (the collection's insertion order), so the choice between
    /// them is never arbitrary.
    pub fn make_room(&self, bucket: &[Post]) -> Vec<PostId> {
        let n = bucket.len();
        if n < self.capacity {
            return Vec::new();
        }

        let mut oldest_first: Vec<&Post> = bucket.iter().collect();
        oldest_first.sort_by_key(|post| post.created_at);

        let excess = n - (self.capacity - 1);
        oldest_first
            .into_iter()
            .take(excess)
            .map(|post| post.id)
            .collect()
    }

    /// Posts created strictly before this instant are expired. A TTL
    /// reaching past the earliest representable time expires nothing.
    pub fn expiry_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_expired(&self, post: &Post, now: DateTime<Utc>) -> bool {
        post.created_at < self.expiry_cutoff(now)
    }

    /// Store-wide range selecting every expired post, oldest first.
    pub fn sweep_query(&self, now: DateTime<Utc>) -> Query {
        Query::new()
            .filter(
                Field::CreatedAt,
                Op::Lt,
                Value::Timestamp(self.expiry_cutoff(now)),
            )
            .order_by(Field::CreatedAt, Direction::Asc)
    }

    /// Range selecting every live post, newest first.
    pub fn live_query(&self, now: DateTime<Utc>) -> Query {
        Query::new()
            .filter(
                Field::CreatedAt,
                Op::Ge,
                Value::Timestamp(self.expiry_cutoff(now)),
            )
            .order_by(Field::CreatedAt, Direction::Desc)
    }
}
