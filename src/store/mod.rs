//! The post store façade.
//!
//! Coordinates bucket keys, the eviction policy and the backing collection.
//! After `submit` returns, the bucket it wrote to holds at most `capacity`
//! posts, and no read ever returns a post older than the TTL.

mod grouping;

pub use grouping::{BucketGroup, group_by_bucket};

use crate::{
    bucket::{BucketKey, quantize},
    collection::{CollectionError, Direction, DocumentCollection, Field, Op, Query, Value},
    eviction::EvictionPolicy,
    models::{Category, Mode, NewPost, Post, PostId},
};
use chrono::{DateTime, Duration, Utc};
use std::{
    fmt,
    future::Future,
    hash::{DefaultHasher, Hash, Hasher},
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

/// Collection the store reads and writes.
pub const POSTS_COLLECTION: &str = "posts";

const LOCK_STRIPES: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] CollectionError),

    #[error("store operation `{op}` timed out after {after:?}")]
    Timeout {
        op: &'static str,
        after: std::time::Duration,
    },

    /// Eviction committed, then a later step failed. The bucket lost
    /// `evicted` and did not gain the new post.
    #[error("{count} post(s) evicted before failure: {source}", count = .evicted.len())]
    PartialFailure {
        evicted: Vec<PostId>,
        source: Box<StoreError>,
    },
}

/// How posts older than the TTL are kept out of sight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TtlEnforcement {
    /// Every submit deletes expired posts store-wide before touching its
    /// bucket.
    #[default]
    SweepOnWrite,
    /// Expired posts stay stored (and keep occupying bucket capacity); reads
    /// skip them.
    FilterOnRead,
}

impl fmt::Display for TtlEnforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TtlEnforcement::SweepOnWrite => "sweep_on_write",
            TtlEnforcement::FilterOnRead => "filter_on_read",
        })
    }
}

impl FromStr for TtlEnforcement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sweep_on_write" | "sweep" => Ok(TtlEnforcement::SweepOnWrite),
            "filter_on_read" | "filter" => Ok(TtlEnforcement::FilterOnRead),
            other => Err(format!(
                "unknown TTL enforcement `{other}` (expected sweep_on_write or filter_on_read)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub collection: String,
    pub capacity: usize,
    pub ttl: Duration,
    pub display_limit: usize,
    pub ttl_enforcement: TtlEnforcement,
    pub timeout: std::time::Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        let policy = EvictionPolicy::default();
        Self {
            collection: POSTS_COLLECTION.to_string(),
            capacity: policy.capacity(),
            ttl: policy.ttl(),
            display_limit: 4,
            ttl_enforcement: TtlEnforcement::default(),
            timeout: std::time::Duration::from_secs(5),
        }
    }
}

/// A post as submitted, before quantization and server stamping.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub text: String,
    pub lat: f64,
    pub lng: f64,
    pub mode: Mode,
    pub category: Option<Category>,
}

impl Submission {
    pub fn new(text: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            text: text.into(),
            lat,
            lng,
            mode: Mode::Normal,
            category: None,
        }
    }

    pub fn emergency(mut self, category: Category) -> Self {
        self.mode = Mode::Emergency;
        self.category = Some(category);
        self
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.text.trim().is_empty() {
            return Err(StoreError::Validation("text must not be empty".into()));
        }
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(StoreError::Validation(format!(
                "latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(StoreError::Validation(format!(
                "longitude {} is outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }

    fn into_new_post(self) -> Result<NewPost, StoreError> {
        self.validate()?;

        let lat = quantize(self.lat);
        let lng = quantize(self.lng);
        Ok(NewPost {
            text: self.text,
            lat,
            lng,
            bucket: BucketKey::from_coords(lat, lng),
            category: self.mode.effective_category(self.category),
            mode: self.mode,
        })
    }
}

#[derive(Clone)]
pub struct PostStore {
    backend: Arc<dyn DocumentCollection>,
    policy: EvictionPolicy,
    settings: Arc<StoreSettings>,
    locks: Arc<[Mutex<()>]>,
}

impl PostStore {
    pub fn new(backend: Arc<dyn DocumentCollection>, settings: StoreSettings) -> Self {
        let policy = EvictionPolicy::new(settings.capacity, settings.ttl);
        let locks: Vec<Mutex<()>> = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        Self {
            backend,
            policy,
            settings: Arc::new(settings),
            locks: locks.into(),
        }
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Admit a post into its bucket, evicting the oldest posts there as
    /// needed.
    ///
    /// The read-evict-insert sequence runs under the bucket's lock, so
    /// concurrent submits to one bucket in this process are serialized.
    /// Writers elsewhere sharing the backend can still overshoot; the next
    /// submit to the bucket evicts back down to capacity.
    pub async fn submit(&self, submission: Submission) -> Result<Post, StoreError> {
        let new_post = submission.into_new_post()?;
        let bucket = new_post.bucket;

        if self.settings.ttl_enforcement == TtlEnforcement::SweepOnWrite {
            self.sweep_expired().await?;
        }

        let _guard = self.lock_for(&bucket).lock().await;

        let existing = self
            .timed(
                "query bucket",
                self.backend.query(
                    &self.settings.collection,
                    &Query::new()
                        .where_eq(Field::Bucket, Value::Bucket(bucket))
                        .order_by(Field::CreatedAt, Direction::Asc),
                ),
            )
            .await?;

        let evicted = self.policy.make_room(&existing);
        if !evicted.is_empty() {
            self.timed(
                "evict",
                self.backend
                    .delete_batch(&self.settings.collection, &evicted),
            )
            .await?;
            debug!(%bucket, count = evicted.len(), "evicted oldest posts");
        }

        match self
            .timed(
                "insert",
                self.backend.insert(&self.settings.collection, new_post),
            )
            .await
        {
            Ok(post) => {
                debug!(id = %post.id, %bucket, mode = ?post.mode, "post stored");
                Ok(post)
            }
            Err(e) if !evicted.is_empty() => {
                warn!(%bucket, evicted = evicted.len(), error = %e, "insert failed after eviction");
                Err(StoreError::PartialFailure {
                    evicted,
                    source: Box::new(e),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Live posts, newest first. Every call queries the backend afresh.
    pub async fn list_active(&self, limit: usize) -> Result<Vec<Post>, StoreError> {
        let now = self.backend.now();
        let query = self.policy.live_query(now).limit(limit);
        let posts = self
            .timed(
                "list active",
                self.backend.query(&self.settings.collection, &query),
            )
            .await?;

        debug_assert!(self.all_live(&posts, now));
        Ok(posts)
    }

    /// Live posts of one bucket, newest first.
    pub async fn list_by_bucket(
        &self,
        key: BucketKey,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        self.list_by_bucket_ordered(key, limit, Direction::Desc).await
    }

    pub async fn list_by_bucket_ordered(
        &self,
        key: BucketKey,
        limit: usize,
        direction: Direction,
    ) -> Result<Vec<Post>, StoreError> {
        let now = self.backend.now();
        let query = Query::new()
            .where_eq(Field::Bucket, Value::Bucket(key))
            .filter(
                Field::CreatedAt,
                Op::Ge,
                Value::Timestamp(self.policy.expiry_cutoff(now)),
            )
            .order_by(Field::CreatedAt, direction)
            .limit(limit);

        let posts = self
            .timed(
                "list bucket",
                self.backend.query(&self.settings.collection, &query),
            )
            .await?;

        debug_assert!(self.all_live(&posts, now));
        Ok(posts)
    }

    /// `list_active` partitioned per bucket for map markers, each group
    /// capped at the display limit.
    pub async fn list_grouped(&self, limit: usize) -> Result<Vec<BucketGroup>, StoreError> {
        let posts = self.list_active(limit).await?;
        Ok(group_by_bucket(posts, self.settings.display_limit))
    }

    /// Delete every expired post. Returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let query = self.policy.sweep_query(self.backend.now());
        let expired = self
            .timed(
                "query expired",
                self.backend.query(&self.settings.collection, &query),
            )
            .await?;

        if expired.is_empty() {
            return Ok(0);
        }

        let ids: Vec<PostId> = expired.iter().map(|post| post.id).collect();
        let removed = self
            .timed(
                "sweep",
                self.backend.delete_batch(&self.settings.collection, &ids),
            )
            .await?;

        info!(removed, "swept expired posts");
        Ok(removed)
    }

    /// Periodically sweep expired posts until the task is aborted.
    pub fn spawn_sweeper(&self, every: std::time::Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = store.sweep_expired().await {
                    warn!(error = %e, "background sweep failed");
                }
            }
        })
    }

    /// A backend that ignores the live-window filter would leak expired
    /// posts to readers.
    fn all_live(&self, posts: &[Post], now: DateTime<Utc>) -> bool {
        posts.iter().all(|post| !self.policy.is_expired(post, now))
    }

    fn lock_for(&self, bucket: &BucketKey) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        bucket.hash(&mut hasher);
        &self.locks[(hasher.finish() as usize) % self.locks.len()]
    }

    async fn timed<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, CollectionError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.settings.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => {
                warn!(op, "store operation timed out");
                Err(StoreError::Timeout {
                    op,
                    after: self.settings.timeout,
                })
            }
        }
    }
}
