//! GET response cache with write invalidation.
//!
//! # Contract
//!
//! - A `Get` whose key is cached (and not expired) is answered from the cache;
//!   nothing further down the pipeline runs.
//! - A `Get` miss is forwarded; an `Ok` answer is stored.
//! - A completed `Post`, `Put` or `Delete` removes every entry whose resource
//!   overlaps the written one *before* its response is handed back. A write
//!   that was cancelled mid-flight, or whose future was dropped, does the
//!   same, since the backend may or may not have applied it. Only a backend
//!   error leaves the cache untouched.
//!
//! Concurrent misses for the same key are all forwarded; the last one to
//! finish wins the slot. A `Get` that was in flight while a write completed
//! never stores its (possibly pre-write) answer: every invalidation bumps a
//! generation counter and a read only stores if the counter is unchanged.
//!
//! # Expiry
//!
//! With a `max_age`, an expired entry is dropped when its key is read again,
//! and every [`SWEEP_EVERY`] stores sweep the whole map. Call
//! [`Cache::purge_expired`] yourself for a tighter bound.
//!
//! # Keys
//!
//! A key is the resource id, verb, kind, routing hints and every request
//! property except the ignored ones (`correlation-id` by default). Properties
//! are sorted by name, so their order on the request does not matter.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::Result;
use crate::middleware::{Middleware, Next};
use crate::properties::RoutingHints;
use crate::request::Request;
use crate::resource_id::ResourceId;
use crate::response::Response;
use crate::verb::Verb;

/// Stores between two sweeps of expired entries, when a `max_age` is set.
pub const SWEEP_EVERY: u64 = 64;

/// Which cached resources a write to `id` evicts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Invalidation {
    /// `id` itself, under any query.
    Exact,
    /// `id` and everything below it in the path hierarchy.
    #[default]
    Subtree,
}

/// Identity of a cached response.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey {
    id: ResourceId,
    verb: Verb,
    kind: String,
    hints: RoutingHints,
    properties: Vec<(String, String)>,
}

impl CacheKey {
    pub fn id(&self) -> &ResourceId { &self.id }
}

struct Entry {
    response: Response,
    stored_at: Instant,
}

struct Inner {
    entries: DashMap<CacheKey, Entry>,
    generation: AtomicU64,
    stores: AtomicU64,
    max_age: Option<Duration>,
    invalidation: Invalidation,
    ignored: BTreeSet<String>,
}

/// Concurrent response cache, usable directly as pipeline middleware.
///
/// Cloning is cheap and clones share the same entries, so an application can
/// keep one handle for [`len`](Cache::len) or [`clear`](Cache::clear) while
/// another sits in the pipeline.
///
/// ```rust
/// use std::time::Duration;
/// use resmux::middleware::cache::{Cache, Invalidation};
///
/// let cache = Cache::builder()
///     .max_age(Duration::from_secs(60))
///     .invalidation(Invalidation::Exact)
///     .ignore_property("request-id")
///     .build();
/// assert!(cache.is_empty());
/// ```
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl Cache {
    pub fn builder() -> CacheBuilder {
        CacheBuilder {
            max_age: None,
            invalidation: Invalidation::default(),
            ignored: BTreeSet::from(["correlation-id".to_owned()]),
        }
    }

    /// The key `req` would be cached under.
    pub fn key_for(&self, req: &Request) -> CacheKey {
        let mut properties: Vec<(String, String)> = req.props().iter()
            .filter(|(k, _)| !self.inner.ignored.contains(*k))
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        properties.sort();

        CacheKey {
            id: req.id().clone(),
            verb: req.verb(),
            kind: req.request_kind().to_owned(),
            hints: req.routing().clone(),
            properties,
        }
    }

    /// The cached response for `key`, unless absent or expired. Expired
    /// entries are removed on the way.
    pub fn get(&self, key: &CacheKey) -> Option<Response> {
        let expired = {
            let entry = self.inner.entries.get(key)?;
            if !self.is_expired(&entry) {
                return Some(entry.response.clone());
            }
            entry.stored_at
        };
        self.inner.entries.remove_if(key, |_, entry| entry.stored_at == expired);
        None
    }

    /// Stores `response` under `key` unless an invalidation happened since
    /// `generation` was read. Returns whether the entry was stored.
    fn put(&self, key: CacheKey, response: Response, generation: u64) -> bool {
        // Holding the shard lock while checking the generation means a
        // concurrent invalidation either is seen here or sees the new entry.
        {
            let slot = self.inner.entries.entry(key);
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            slot.insert(Entry { response, stored_at: Instant::now() });
        }

        // Outside the shard lock: the sweep visits every shard.
        if self.inner.max_age.is_some()
            && (self.inner.stores.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0
        {
            let purged = self.purge_expired();
            debug!(purged, "swept expired entries");
        }
        true
    }

    /// Removes every entry overlapping `id` under the configured
    /// [`Invalidation`] mode. Returns the number of entries removed.
    pub fn invalidate(&self, id: &ResourceId) -> usize {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let mode = self.inner.invalidation;
        let mut removed = 0;
        self.inner.entries.retain(|key, _| {
            let keep = !overlaps(mode, &key.id, id);
            removed += usize::from(!keep);
            keep
        });
        removed
    }

    /// Removes expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        self.inner.entries.retain(|_, entry| {
            let keep = !self.is_expired(entry);
            removed += usize::from(!keep);
            keep
        });
        removed
    }

    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.entries.clear();
    }

    pub fn len(&self) -> usize { self.inner.entries.len() }
    pub fn is_empty(&self) -> bool { self.inner.entries.is_empty() }

    fn is_expired(&self, entry: &Entry) -> bool {
        self.inner.max_age.is_some_and(|max_age| entry.stored_at.elapsed() >= max_age)
    }
}

fn overlaps(mode: Invalidation, cached: &ResourceId, written: &ResourceId) -> bool {
    match mode {
        Invalidation::Exact => cached.same_resource(written),
        Invalidation::Subtree => cached.is_under(written),
    }
}

#[async_trait]
impl Middleware for Cache {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response> {
        if !req.verb().is_mutating() {
            let key = self.key_for(&req);
            if let Some(hit) = self.get(&key) {
                debug!(resource = %req.id(), "cache hit");
                return Ok(hit);
            }
            debug!(resource = %req.id(), "cache miss");

            let generation = self.inner.generation.load(Ordering::SeqCst);
            let res = next.run(req).await?;
            if res.is_ok() && !self.put(key, res.clone(), generation) {
                debug!("write raced the read, response not cached");
            }
            return Ok(res);
        }

        let pending = PendingWrite { cache: self, written: Some(req.id().clone()) };
        let outcome = next.run(req).await;
        if matches!(&outcome, Err(e) if !e.is_cancelled()) {
            pending.disarm();
        }
        outcome
    }
}

/// Invalidates the written resource when dropped, whether the write
/// completed, was cancelled, or had its future dropped part-way.
struct PendingWrite<'a> {
    cache: &'a Cache,
    written: Option<ResourceId>,
}

impl PendingWrite<'_> {
    fn disarm(mut self) {
        self.written = None;
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        if let Some(written) = self.written.take() {
            let removed = self.cache.invalidate(&written);
            debug!(resource = %written, removed, "cache invalidated");
        }
    }
}

/// Fluent builder for [`Cache`]. Obtain via [`Cache::builder()`].
pub struct CacheBuilder {
    max_age: Option<Duration>,
    invalidation: Invalidation,
    ignored: BTreeSet<String>,
}

impl CacheBuilder {
    /// Entries older than `max_age` count as misses. Default: no expiry.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn invalidation(mut self, invalidation: Invalidation) -> Self {
        self.invalidation = invalidation;
        self
    }

    /// Leave `key` out of cache keys, in addition to `correlation-id`.
    pub fn ignore_property(mut self, key: impl Into<String>) -> Self {
        self.ignored.insert(key.into());
        self
    }

    pub fn build(self) -> Cache {
        Cache {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                generation: AtomicU64::new(0),
                stores: AtomicU64::new(0),
                max_age: self.max_age,
                invalidation: self.invalidation,
                ignored: self.ignored,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use crate::error::Error;
    use crate::pipeline::Pipeline;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    /// One mutable value per path, counting backend reads.
    fn store(reads: Arc<AtomicUsize>) -> Controller {
        let data = Arc::new(Mutex::new(std::collections::HashMap::<String, String>::new()));
        let (read_data, write_data, delete_data) = (Arc::clone(&data), Arc::clone(&data), data);
        Controller::builder()
            .scheme("mem")
            .get(move |req: Request, _cancel: CancellationToken| {
                reads.fetch_add(1, Ordering::SeqCst);
                let value = read_data.lock().unwrap().get(req.id().path()).cloned();
                async move { Ok::<_, Error>(value) }
            })
            .post({
                let post_data = Arc::clone(&write_data);
                move |req: Request, _cancel: CancellationToken| {
                    let value = req.payload_str().unwrap_or_default().to_owned();
                    post_data.lock().unwrap().insert(req.id().path().to_owned(), value);
                    async { Ok::<_, Error>(crate::Status::Ok) }
                }
            })
            .put(move |req: Request, _cancel: CancellationToken| {
                let value = req.payload_str().unwrap_or_default().to_owned();
                write_data.lock().unwrap().insert(req.id().path().to_owned(), value);
                async { Ok::<_, Error>(crate::Status::Ok) }
            })
            .delete(move |req: Request, _cancel: CancellationToken| {
                delete_data.lock().unwrap().remove(req.id().path());
                async { Ok::<_, Error>(crate::Status::Ok) }
            })
            .build()
    }

    fn id(path: &str) -> ResourceId {
        ResourceId::new("mem", path)
    }

    #[test]
    fn keys_ignore_correlation_ids_and_property_order() {
        let cache = Cache::builder().build();
        let a = Request::get(id("x")).property("a", "1").property("b", "2").property("correlation-id", "c1");
        let b = Request::get(id("x")).property("b", "2").property("a", "1").property("correlation-id", "c2");
        let c = Request::get(id("x")).property("a", "other");
        assert_eq!(cache.key_for(&a), cache.key_for(&b));
        assert_ne!(cache.key_for(&a), cache.key_for(&c));
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let reads = Arc::new(AtomicUsize::new(0));
        let cache = Cache::builder().build();
        let pipeline = Pipeline::builder()
            .controller(store(Arc::clone(&reads)))
            .layer(cache.clone())
            .build();

        assert!(pipeline.invoke(Request::get(id("nothing"))).await.unwrap().is_not_found());
        assert!(pipeline.invoke(Request::get(id("nothing"))).await.unwrap().is_not_found());
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn subtree_invalidation_evicts_children_only() {
        let reads = Arc::new(AtomicUsize::new(0));
        let cache = Cache::builder().build();
        let pipeline = Pipeline::builder()
            .controller(store(Arc::clone(&reads)))
            .layer(cache.clone())
            .build();

        for path in ["dir/a", "dir/b", "dirt", "other"] {
            pipeline.invoke(Request::put(id(path), "v")).await.unwrap();
            pipeline.invoke(Request::get(id(path))).await.unwrap();
        }
        assert_eq!(cache.len(), 4);

        pipeline.invoke(Request::delete(id("dir"))).await.unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn exact_invalidation_ignores_the_query() {
        let cache = Cache::builder().invalidation(Invalidation::Exact).build();
        let generation = cache.inner.generation.load(Ordering::SeqCst);
        for query in ["a", "b"] {
            let req = Request::get(id("doc").with_query(query));
            assert!(cache.put(cache.key_for(&req), Response::text(query), generation));
        }
        let child = Request::get(id("doc/part"));
        assert!(cache.put(cache.key_for(&child), Response::text("part"), generation));

        assert_eq!(cache.invalidate(&id("doc")), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = Cache::builder().max_age(Duration::from_millis(10)).build();
        let key = cache.key_for(&Request::get(id("x")));
        assert!(cache.put(key.clone(), Response::text("x"), 0));
        assert!(cache.get(&key).is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn stale_generation_is_not_stored() {
        let cache = Cache::builder().build();
        let generation = cache.inner.generation.load(Ordering::SeqCst);
        cache.invalidate(&id("unrelated"));

        let key = cache.key_for(&Request::get(id("x")));
        assert!(!cache.put(key, Response::text("stale"), generation));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn cancelled_writes_still_invalidate() {
        let reads = Arc::new(AtomicUsize::new(0));
        let cache = Cache::builder().build();
        let pipeline = Pipeline::builder()
            .controller(store(Arc::clone(&reads)))
            .layer(cache.clone())
            .build();

        pipeline.invoke(Request::put(id("x"), "old")).await.unwrap();
        pipeline.invoke(Request::get(id("x"))).await.unwrap();
        assert_eq!(cache.len(), 1);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pipeline.invoke_with(Request::put(id("x"), "new"), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(cache.is_empty());
    }

    /// One value behind `get` and `put`. The first read takes its snapshot,
    /// signals `read_done` and waits for `release` before answering; writes
    /// store immediately and then take `write_delay` to answer.
    struct Slow {
        value: Arc<Mutex<String>>,
        block_first_read: Arc<AtomicBool>,
        read_done: Arc<Notify>,
        release: Arc<Notify>,
        write_delay: Duration,
    }

    impl Slow {
        fn new(initial: &str) -> Self {
            Self {
                value: Arc::new(Mutex::new(initial.to_owned())),
                block_first_read: Arc::new(AtomicBool::new(false)),
                read_done: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
                write_delay: Duration::ZERO,
            }
        }

        fn controller(&self) -> Controller {
            let (value, block, read_done, release) = (
                Arc::clone(&self.value),
                Arc::clone(&self.block_first_read),
                Arc::clone(&self.read_done),
                Arc::clone(&self.release),
            );
            let (written, delay) = (Arc::clone(&self.value), self.write_delay);
            Controller::builder()
                .scheme("mem")
                .get(move |_req: Request, _cancel: CancellationToken| {
                    let snapshot = value.lock().unwrap().clone();
                    let blocked = block.swap(false, Ordering::SeqCst);
                    let (read_done, release) = (Arc::clone(&read_done), Arc::clone(&release));
                    async move {
                        if blocked {
                            read_done.notify_one();
                            release.notified().await;
                        }
                        Ok::<_, Error>(Response::text(snapshot))
                    }
                })
                .put(move |req: Request, _cancel: CancellationToken| {
                    *written.lock().unwrap() = req.payload_str().unwrap_or_default().to_owned();
                    async move {
                        tokio::time::sleep(delay).await;
                        Ok::<_, Error>("stored")
                    }
                })
                .build()
        }
    }

    #[tokio::test]
    async fn read_overtaken_by_a_write_is_not_stored() {
        let slow = Slow::new("old");
        let cache = Cache::builder().build();
        let pipeline = Pipeline::builder()
            .controller(slow.controller())
            .layer(cache.clone())
            .build();

        slow.block_first_read.store(true, Ordering::SeqCst);
        let reader = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.invoke(Request::get(id("x"))).await }
        });

        slow.read_done.notified().await;
        pipeline.invoke(Request::put(id("x"), "new")).await.unwrap();
        slow.release.notify_one();

        let stale = reader.await.unwrap().unwrap();
        assert_eq!(stale.text_body(), Some("old"));
        assert!(cache.is_empty());

        let fresh = pipeline.invoke(Request::get(id("x"))).await.unwrap();
        assert_eq!(fresh.text_body(), Some("new"));
    }

    #[tokio::test]
    async fn dropped_writes_still_invalidate() {
        let slow = Slow { write_delay: Duration::from_secs(30), ..Slow::new("old") };
        let cache = Cache::builder().build();
        let pipeline = Pipeline::builder()
            .controller(slow.controller())
            .layer(cache.clone())
            .build();

        pipeline.invoke(Request::get(id("x"))).await.unwrap();
        assert_eq!(cache.len(), 1);

        let write = pipeline.invoke(Request::put(id("x"), "new"));
        assert!(tokio::time::timeout(Duration::from_millis(20), write).await.is_err());
        assert!(cache.is_empty());

        let res = pipeline.invoke(Request::get(id("x"))).await.unwrap();
        assert_eq!(res.text_body(), Some("new"));
    }

    #[tokio::test]
    async fn failed_writes_keep_the_cache() {
        let cache = Cache::builder().build();
        let pipeline = Pipeline::builder()
            .controller(Controller::builder()
                .scheme("mem")
                .get(|_req: Request, _cancel: CancellationToken| async { Ok::<_, Error>("v") })
                .put(|_req: Request, _cancel: CancellationToken| async {
                    Err::<Response, _>(Error::backend("disk full"))
                })
                .build())
            .layer(cache.clone())
            .build();

        pipeline.invoke(Request::get(id("x"))).await.unwrap();
        assert!(pipeline.invoke(Request::put(id("x"), "w")).await.is_err());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn posts_invalidate_too() {
        let reads = Arc::new(AtomicUsize::new(0));
        let cache = Cache::builder().build();
        let pipeline = Pipeline::builder()
            .controller(store(Arc::clone(&reads)))
            .layer(cache.clone())
            .build();

        pipeline.invoke(Request::put(id("inbox/1"), "first")).await.unwrap();
        pipeline.invoke(Request::get(id("inbox/1"))).await.unwrap();
        assert_eq!(cache.len(), 1);

        pipeline.invoke(Request::post(id("inbox"), "second")).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn stores_sweep_expired_entries() {
        let cache = Cache::builder().max_age(Duration::from_millis(200)).build();
        let first = cache.key_for(&Request::get(id("first")));
        assert!(cache.put(first.clone(), Response::text("x"), 0));

        tokio::time::sleep(Duration::from_millis(250)).await;
        for i in 1..SWEEP_EVERY {
            let key = cache.key_for(&Request::get(id(&format!("k{i}"))));
            assert!(cache.put(key, Response::text("x"), 0));
        }

        assert!(!cache.inner.entries.contains_key(&first));
        assert_eq!(cache.len(), (SWEEP_EVERY - 1) as usize);
    }
}
