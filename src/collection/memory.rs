use super::{CollectionError, Direction, DocumentCollection, Query, order_by_field};
use crate::{
    clock::{Clock, SystemClock},
    models::{NewPost, Post, PostId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use uuid::Uuid;

struct Stored {
    seq: u64,
    post: Post,
}

/// In-process document collection.
///
/// `DashMap` shards by collection name; each collection's documents sit
/// behind that shard's lock, so a batch delete is applied as one unit and
/// readers never see half of it.
#[derive(Clone)]
pub struct MemoryCollection {
    collections: Arc<DashMap<String, HashMap<PostId, Stored>>>,
    next_seq: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            collections: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
            clock,
        }
    }

    /// Number of documents currently held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |docs| docs.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn insert(&self, collection: &str, post: NewPost) -> Result<Post, CollectionError> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let post = post.into_post(Uuid::new_v4(), self.clock.now());

        docs.insert(
            post.id,
            Stored {
                seq,
                post: post.clone(),
            },
        );

        Ok(post)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Post>, CollectionError> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<&Stored> = Vec::new();
        for stored in docs.values() {
            if query.matches(&stored.post)? {
                hits.push(stored);
            }
        }

        // Insertion sequence breaks ties, in the same direction as the order.
        match query.order {
            Some((field, Direction::Asc)) => hits.sort_by(|a, b| {
                order_by_field(&a.post, &b.post, field).then(a.seq.cmp(&b.seq))
            }),
            Some((field, Direction::Desc)) => hits.sort_by(|a, b| {
                order_by_field(&b.post, &a.post, field).then(b.seq.cmp(&a.seq))
            }),
            None => hits.sort_by_key(|s| s.seq),
        }

        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }

        Ok(hits.into_iter().map(|s| s.post.clone()).collect())
    }

    async fn delete_batch(
        &self,
        collection: &str,
        ids: &[PostId],
    ) -> Result<usize, CollectionError> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };

        Ok(ids.iter().filter(|id| docs.remove(*id).is_some()).count())
    }
}
