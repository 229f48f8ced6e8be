//! Port to the backing document store.
//!
//! The post store only needs four capabilities: a server clock,
//! insert-with-generated-id, filtered/ordered/limited queries, and batch
//! delete. Anything offering those can back a `PostStore`.

mod memory;

pub use memory::MemoryCollection;

use crate::{
    bucket::BucketKey,
    models::{NewPost, Post, PostId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("collection unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// The collection's own clock. Post timestamps and TTL cutoffs are both
    /// taken from here, never from the caller.
    fn now(&self) -> DateTime<Utc>;

    /// Store a post, assigning its id and server timestamp.
    async fn insert(&self, collection: &str, post: NewPost) -> Result<Post, CollectionError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Post>, CollectionError>;

    /// Remove every listed post as one unit. Ids that are already gone are
    /// skipped. Returns how many posts were removed.
    async fn delete_batch(&self, collection: &str, ids: &[PostId])
    -> Result<usize, CollectionError>;
}

/// Queryable post fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Bucket,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Bucket(BucketKey),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: Field,
    pub op: Op,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, post: &Post) -> Result<bool, CollectionError> {
        let ordering = compare(post, self.field, &self.value)?;
        Ok(match self.op {
            Op::Eq => ordering == Ordering::Equal,
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
            Op::Gt => ordering == Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
        })
    }
}

/// Compare a post's field against a filter value.
fn compare(post: &Post, field: Field, value: &Value) -> Result<Ordering, CollectionError> {
    match (field, value) {
        (Field::Bucket, Value::Bucket(key)) => Ok(post.bucket.cmp(key)),
        (Field::CreatedAt, Value::Timestamp(ts)) => Ok(post.created_at.cmp(ts)),
        (field, value) => Err(CollectionError::InvalidQuery(format!(
            "{field:?} cannot be compared with {value:?}"
        ))),
    }
}

/// Order two posts by a field. Ties are left to the caller.
pub fn order_by_field(a: &Post, b: &Post, field: Field) -> Ordering {
    match field {
        Field::Bucket => a.bucket.cmp(&b.bucket),
        Field::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

/// A conjunction of filters with optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<(Field, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: Field, op: Op, value: Value) -> Self {
        self.filters.push(Filter { field, op, value });
        self
    }

    pub fn where_eq(self, field: Field, value: Value) -> Self {
        self.filter(field, Op::Eq, value)
    }

    pub fn order_by(mut self, field: Field, direction: Direction) -> Self {
        self.order = Some((field, direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn matches(&self, post: &Post) -> Result<bool, CollectionError> {
        for filter in &self.filters {
            if !filter.matches(post)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
