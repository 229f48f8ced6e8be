//! Post store integration tests: capacity, eviction order, TTL, concurrency
//! and failure reporting.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use geodrop::bucket::BucketKey;
use geodrop::clock::{Clock, ManualClock};
use geodrop::collection::{
    CollectionError, Direction, DocumentCollection, Field, MemoryCollection, Query, Value,
};
use geodrop::models::{Category, Mode, NewPost, Post, PostId};
use geodrop::store::{
    POSTS_COLLECTION, PostStore, StoreError, StoreSettings, Submission, TtlEnforcement,
};

const LAT: f64 = 35.9897;
const LNG: f64 = 139.9791;

fn settings(capacity: usize, ttl_enforcement: TtlEnforcement) -> StoreSettings {
    StoreSettings {
        capacity,
        ttl_enforcement,
        ..StoreSettings::default()
    }
}

/// Store over an in-memory collection with a hand-driven clock.
fn setup(settings: StoreSettings) -> (PostStore, MemoryCollection, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let collection = MemoryCollection::with_clock(clock.clone());
    let store = PostStore::new(Arc::new(collection.clone()), settings);
    (store, collection, clock)
}

async fn bucket_texts(collection: &MemoryCollection, key: BucketKey) -> Vec<String> {
    let query = Query::new()
        .where_eq(Field::Bucket, Value::Bucket(key))
        .order_by(Field::CreatedAt, Direction::Asc);
    collection
        .query(POSTS_COLLECTION, &query)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.text)
        .collect()
}

fn here() -> BucketKey {
    BucketKey::from_coords(LAT, LNG)
}

#[tokio::test]
async fn fifth_post_evicts_the_first() {
    let (store, collection, clock) = setup(settings(4, TtlEnforcement::SweepOnWrite));

    for text in ["A", "B", "C", "D", "E"] {
        store.submit(Submission::new(text, LAT, LNG)).await.unwrap();
        clock.advance(Duration::seconds(1));
    }

    assert_eq!(bucket_texts(&collection, here()).await, ["B", "C", "D", "E"]);
}

#[tokio::test]
async fn capacity_holds_across_many_buckets() {
    let (store, collection, clock) = setup(settings(3, TtlEnforcement::SweepOnWrite));

    let spots = [(10.0, 10.0), (10.0004, 10.0004), (20.0, 20.0), (-5.5, 100.25)];
    for i in 0..40 {
        let (lat, lng) = spots[i % spots.len()];
        store
            .submit(Submission::new(format!("post {i}"), lat, lng))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));

        for (lat, lng) in spots {
            let key = BucketKey::from_coords(lat, lng);
            assert!(bucket_texts(&collection, key).await.len() <= 3);
        }
    }

    // (10.0, 10.0) and (10.0004, 10.0004) quantize to the same bucket.
    assert_eq!(collection.len(POSTS_COLLECTION), 9);
}

#[tokio::test]
async fn eviction_keeps_the_newest_and_the_new_post() {
    let capacity = 20;
    let (store, collection, clock) = setup(settings(capacity, TtlEnforcement::SweepOnWrite));

    for i in 0..capacity {
        store
            .submit(Submission::new(format!("t{i}"), LAT, LNG))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
    }

    store.submit(Submission::new("new", LAT, LNG)).await.unwrap();

    let texts = bucket_texts(&collection, here()).await;
    let mut expected: Vec<String> = (1..capacity).map(|i| format!("t{i}")).collect();
    expected.push("new".into());
    assert_eq!(texts, expected);
}

#[tokio::test]
async fn ttl_boundary_on_read() {
    let ttl = Duration::hours(24);
    let (store, _collection, clock) = setup(settings(4, TtlEnforcement::FilterOnRead));
    let start = clock.now();

    store.submit(Submission::new("hello", LAT, LNG)).await.unwrap();

    clock.set(start + ttl - Duration::seconds(1));
    assert_eq!(store.list_active(10).await.unwrap().len(), 1);

    clock.set(start + ttl + Duration::seconds(1));
    assert!(store.list_active(10).await.unwrap().is_empty());
    assert!(store.list_by_bucket(here(), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn post_visible_for_a_day() {
    let (store, _collection, clock) = setup(settings(4, TtlEnforcement::SweepOnWrite));
    let start = clock.now();

    let post = store.submit(Submission::new("still here", LAT, LNG)).await.unwrap();

    clock.set(start + Duration::hours(23) + Duration::minutes(59));
    let active = store.list_active(10).await.unwrap();
    assert_eq!(active.iter().map(|p| p.id).collect::<Vec<_>>(), vec![post.id]);

    clock.set(start + Duration::hours(24) + Duration::minutes(1));
    assert!(store.list_active(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_on_write_deletes_expired_posts_everywhere() {
    let (store, collection, clock) = setup(settings(4, TtlEnforcement::SweepOnWrite));

    store.submit(Submission::new("old here", LAT, LNG)).await.unwrap();
    store.submit(Submission::new("old there", 1.0, 1.0)).await.unwrap();
    clock.advance(Duration::hours(25));

    store.submit(Submission::new("fresh", -20.0, 40.0)).await.unwrap();

    assert_eq!(collection.len(POSTS_COLLECTION), 1);
}

#[tokio::test]
async fn filter_on_read_keeps_expired_posts_stored() {
    let (store, collection, clock) = setup(settings(2, TtlEnforcement::FilterOnRead));

    store.submit(Submission::new("old 1", LAT, LNG)).await.unwrap();
    store.submit(Submission::new("old 2", LAT, LNG)).await.unwrap();
    clock.advance(Duration::hours(25));

    assert!(store.list_active(10).await.unwrap().is_empty());
    assert_eq!(collection.len(POSTS_COLLECTION), 2);

    // Expired posts still occupy the bucket and are evicted like any other.
    store.submit(Submission::new("fresh", LAT, LNG)).await.unwrap();
    assert_eq!(bucket_texts(&collection, here()).await, ["old 2", "fresh"]);
}

#[tokio::test]
async fn explicit_sweep_reports_removed_count() {
    let (store, collection, clock) = setup(settings(4, TtlEnforcement::FilterOnRead));

    for i in 0..3 {
        store
            .submit(Submission::new(format!("p{i}"), i as f64, 0.0))
            .await
            .unwrap();
    }
    clock.advance(Duration::hours(12));
    store.submit(Submission::new("young", LAT, LNG)).await.unwrap();
    clock.advance(Duration::hours(13));

    assert_eq!(store.sweep_expired().await.unwrap(), 3);
    assert_eq!(collection.len(POSTS_COLLECTION), 1);
    assert_eq!(store.sweep_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn overshoot_heals_on_next_submit() {
    let (store, collection, clock) = setup(settings(1, TtlEnforcement::SweepOnWrite));

    // Two writers outside this store both saw an empty bucket and inserted.
    for text in ["racer 1", "racer 2"] {
        collection
            .insert(POSTS_COLLECTION, new_post(text, LAT, LNG))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
    }
    assert_eq!(bucket_texts(&collection, here()).await.len(), 2);

    store.submit(Submission::new("third", LAT, LNG)).await.unwrap();
    assert_eq!(bucket_texts(&collection, here()).await, ["third"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_never_exceed_capacity() {
    let (store, collection, _clock) = setup(settings(4, TtlEnforcement::SweepOnWrite));

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .submit(Submission::new(format!("writer {i}"), LAT, LNG))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(bucket_texts(&collection, here()).await.len(), 4);
    assert_eq!(collection.len(POSTS_COLLECTION), 4);
}

#[tokio::test]
async fn bucket_listing_orders_and_limits() {
    let (store, _collection, clock) = setup(settings(4, TtlEnforcement::SweepOnWrite));

    for text in ["a", "b", "c"] {
        store.submit(Submission::new(text, LAT, LNG)).await.unwrap();
        clock.advance(Duration::seconds(1));
    }
    store.submit(Submission::new("elsewhere", 0.0, 0.0)).await.unwrap();

    let newest: Vec<_> = store
        .list_by_bucket(here(), 2)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.text)
        .collect();
    assert_eq!(newest, ["c", "b"]);

    let oldest: Vec<_> = store
        .list_by_bucket_ordered(here(), 10, Direction::Asc)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.text)
        .collect();
    assert_eq!(oldest, ["a", "b", "c"]);
}

#[tokio::test]
async fn list_active_is_newest_first_and_restartable() {
    let (store, _collection, clock) = setup(settings(4, TtlEnforcement::SweepOnWrite));

    for i in 0..5 {
        store
            .submit(Submission::new(format!("p{i}"), i as f64, i as f64))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
    }

    let first: Vec<_> = store.list_active(3).await.unwrap().into_iter().map(|p| p.text).collect();
    let again: Vec<_> = store.list_active(3).await.unwrap().into_iter().map(|p| p.text).collect();
    assert_eq!(first, ["p4", "p3", "p2"]);
    assert_eq!(first, again);
    assert!(store.list_active(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn grouping_uses_display_limit_not_capacity() {
    let (store, _collection, clock) = setup(StoreSettings {
        capacity: 20,
        display_limit: 4,
        ..StoreSettings::default()
    });

    for i in 0..10 {
        store
            .submit(Submission::new(format!("p{i}"), LAT, LNG))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
    }
    store
        .submit(Submission::new("help", 1.0, 1.0).emergency(Category::AidRequest))
        .await
        .unwrap();

    let groups = store.list_grouped(100).await.unwrap();
    assert_eq!(groups.len(), 2);

    assert_eq!(groups[0].key, BucketKey::from_coords(1.0, 1.0));
    assert_eq!(groups[0].mode, Mode::Emergency);
    assert_eq!(groups[0].posts[0].category, Category::AidRequest);

    assert_eq!(groups[1].key, here());
    assert_eq!(
        groups[1].posts.iter().map(|p| p.text.as_str()).collect::<Vec<_>>(),
        ["p9", "p8", "p7", "p6"]
    );
}

#[tokio::test]
async fn validation_happens_before_the_store_is_touched() {
    let backend = Arc::new(Faulty::new());
    backend.fail_query.store(true, Ordering::SeqCst);
    let store = PostStore::new(backend, StoreSettings::default());

    let err = store.submit(Submission::new("  ", LAT, LNG)).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = store.submit(Submission::new("hi", 91.0, LNG)).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn insert_failure_after_eviction_is_partial() {
    let backend = Arc::new(Faulty::new());
    let store = PostStore::new(backend.clone(), settings(2, TtlEnforcement::SweepOnWrite));

    store.submit(Submission::new("one", LAT, LNG)).await.unwrap();
    store.submit(Submission::new("two", LAT, LNG)).await.unwrap();

    backend.fail_insert.store(true, Ordering::SeqCst);
    let err = store.submit(Submission::new("three", LAT, LNG)).await.unwrap_err();

    match err {
        StoreError::PartialFailure { evicted, source } => {
            assert_eq!(evicted.len(), 1);
            assert!(matches!(*source, StoreError::Store(CollectionError::Write(_))));
        }
        other => panic!("expected partial failure, got {other:?}"),
    }

    // The bucket shrank and the read path still works.
    let left = store.list_by_bucket(here(), 10).await.unwrap();
    assert_eq!(left.iter().map(|p| p.text.as_str()).collect::<Vec<_>>(), ["two"]);
}

#[tokio::test]
async fn insert_failure_without_eviction_is_clean() {
    let backend = Arc::new(Faulty::new());
    backend.fail_insert.store(true, Ordering::SeqCst);
    let store = PostStore::new(backend.clone(), StoreSettings::default());

    let err = store.submit(Submission::new("one", LAT, LNG)).await.unwrap_err();
    assert!(matches!(err, StoreError::Store(CollectionError::Write(_))));
    assert!(store.list_active(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_backend_fails_cleanly_and_recovers() {
    let backend = Arc::new(Faulty::new());
    let store = PostStore::new(backend.clone(), StoreSettings::default());
    store.submit(Submission::new("before", LAT, LNG)).await.unwrap();

    backend.fail_query.store(true, Ordering::SeqCst);
    let err = store.submit(Submission::new("during", LAT, LNG)).await.unwrap_err();
    assert!(matches!(err, StoreError::Store(CollectionError::Unavailable(_))));

    backend.fail_query.store(false, Ordering::SeqCst);
    let texts: Vec<_> = store
        .list_active(10)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.text)
        .collect();
    assert_eq!(texts, ["before"]);

    // The failed submit released the bucket lock.
    store.submit(Submission::new("after", LAT, LNG)).await.unwrap();
}

#[tokio::test]
async fn slow_backend_times_out() {
    let backend = Arc::new(Faulty::new());
    backend.stall_query.store(true, Ordering::SeqCst);
    let store = PostStore::new(
        backend,
        StoreSettings {
            timeout: StdDuration::from_millis(50),
            ..StoreSettings::default()
        },
    );

    let err = store.list_active(10).await.unwrap_err();
    assert!(matches!(err, StoreError::Timeout { op: "list active", .. }));
}

#[tokio::test]
async fn unbounded_ttl_reads_and_writes() {
    let (store, _collection, _clock) = setup(StoreSettings {
        ttl: Duration::MAX,
        ..StoreSettings::default()
    });

    store.submit(Submission::new("forever", LAT, LNG)).await.unwrap();
    assert_eq!(store.list_active(10).await.unwrap().len(), 1);
    assert_eq!(store.list_by_bucket(here(), 10).await.unwrap().len(), 1);
    assert_eq!(store.sweep_expired().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_removes_expired_posts() {
    let (store, collection, clock) = setup(settings(4, TtlEnforcement::SweepOnWrite));

    store.submit(Submission::new("old here", LAT, LNG)).await.unwrap();
    store.submit(Submission::new("old there", 1.0, 1.0)).await.unwrap();
    clock.advance(Duration::hours(25));

    let sweeper = store.spawn_sweeper(StdDuration::from_secs(60));

    // First tick fires immediately; let the task run it.
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert_eq!(collection.len(POSTS_COLLECTION), 0);

    store.submit(Submission::new("later", LAT, LNG)).await.unwrap();
    clock.advance(Duration::hours(25));
    tokio::time::advance(StdDuration::from_secs(60)).await;
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert_eq!(collection.len(POSTS_COLLECTION), 0);

    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_survives_backend_failures() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let backend = Arc::new(Faulty::with_clock(clock.clone()));
    let store = PostStore::new(backend.clone(), settings(4, TtlEnforcement::SweepOnWrite));

    store.submit(Submission::new("stale", LAT, LNG)).await.unwrap();
    clock.advance(Duration::hours(25));

    backend.fail_query.store(true, Ordering::SeqCst);
    let sweeper = store.spawn_sweeper(StdDuration::from_secs(60));

    // Ticks at 0s and 60s both fail.
    tokio::time::sleep(StdDuration::from_secs(90)).await;
    assert_eq!(backend.inner.len(POSTS_COLLECTION), 1);
    assert!(!sweeper.is_finished());

    backend.fail_query.store(false, Ordering::SeqCst);
    tokio::time::sleep(StdDuration::from_secs(60)).await;
    assert_eq!(backend.inner.len(POSTS_COLLECTION), 0);
    assert!(!sweeper.is_finished());

    sweeper.abort();
}

// ----------------------------------------------------------------------------
// helpers
// ----------------------------------------------------------------------------

fn new_post(text: &str, lat: f64, lng: f64) -> NewPost {
    let bucket = BucketKey::from_coords(lat, lng);
    NewPost {
        text: text.into(),
        lat: bucket.lat(),
        lng: bucket.lng(),
        bucket,
        category: Category::Normal,
        mode: Mode::Normal,
    }
}

/// Memory collection with switchable faults.
struct Faulty {
    inner: MemoryCollection,
    fail_insert: AtomicBool,
    fail_query: AtomicBool,
    stall_query: AtomicBool,
}

impl Faulty {
    fn new() -> Self {
        Self::with_inner(MemoryCollection::new())
    }

    fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self::with_inner(MemoryCollection::with_clock(clock))
    }

    fn with_inner(inner: MemoryCollection) -> Self {
        Self {
            inner,
            fail_insert: AtomicBool::new(false),
            fail_query: AtomicBool::new(false),
            stall_query: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DocumentCollection for Faulty {
    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    async fn insert(&self, collection: &str, post: NewPost) -> Result<Post, CollectionError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(CollectionError::Write("insert rejected".into()));
        }
        self.inner.insert(collection, post).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Post>, CollectionError> {
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(CollectionError::Unavailable("connection refused".into()));
        }
        if self.stall_query.load(Ordering::SeqCst) {
            tokio::time::sleep(StdDuration::from_secs(30)).await;
        }
        self.inner.query(collection, query).await
    }

    async fn delete_batch(
        &self,
        collection: &str,
        ids: &[PostId],
    ) -> Result<usize, CollectionError> {
        self.inner.delete_batch(collection, ids).await
    }
}
