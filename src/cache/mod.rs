//! Single-flight session cache
//!
//! [`SessionCache`] maps canonical [`SessionKey`]s to loaded sessions. Each key is
//! in one of three states:
//!
//! - absent: the next `get` starts a load
//! - loading: a detached task is fetching; later callers subscribe to its outcome
//! - ready: the shared `Arc<Session>` is handed out without further locking
//!
//! The state map sits behind one mutex that is only held to check or create an
//! entry and to publish an outcome, never across an `.await`. Loads run in their
//! own task, so a caller that gives up waiting does not cancel the load for
//! everyone else.
//!
//! A failed load removes its entry before waiters are told, so the next `get`
//! retries. Each load is stamped with a generation; if the key is invalidated
//! while the load is in flight, the generations no longer match and the late
//! result is handed to its waiters but not cached.

mod disk;

pub use disk::DiskStore;

use futures::FutureExt;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::error::{Result, SessionError};
use crate::loader::SessionLoader;
use crate::model::{Session, SessionKey};

type LoadOutcome = Result<Arc<Session>>;

enum Entry {
    Ready { session: Arc<Session>, loaded_at: Instant, generation: u64 },
    Loading { rx: watch::Receiver<Option<LoadOutcome>>, generation: u64 },
}

impl Entry {
    fn generation(&self) -> u64 {
        match self {
            Entry::Ready { generation, .. } | Entry::Loading { generation, .. } => *generation,
        }
    }
}

struct State {
    entries: LruCache<SessionKey, Entry>,
    next_generation: u64,
}

/// Counters describing cache behaviour since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Requests answered from memory
    pub hits: u64,
    /// Requests that started a load
    pub misses: u64,
    /// Loads satisfied by the disk tier
    pub disk_hits: u64,
    /// Loads that went to the source
    pub loads: u64,
    pub load_failures: u64,
    /// Requests that joined a load already in flight
    pub coalesced: u64,
    /// Entries dropped for capacity or age
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    disk_hits: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    loader: SessionLoader,
    disk: Option<DiskStore>,
    ttl: Option<Duration>,
    capacity: Option<usize>,
    state: Mutex<State>,
    counters: Counters,
}

/// Keyed store of loaded sessions with single-flight population.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("loader", &self.inner.loader)
            .field("disk", &self.inner.disk)
            .field("ttl", &self.inner.ttl)
            .field("capacity", &self.inner.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

enum Lookup {
    Hit(Arc<Session>),
    Join(watch::Receiver<Option<LoadOutcome>>),
    Start(watch::Receiver<Option<LoadOutcome>>, watch::Sender<Option<LoadOutcome>>, u64),
}

impl SessionCache {
    pub fn new(loader: SessionLoader, config: &CacheConfig) -> Self {
        let inner = Inner {
            loader,
            disk: config.disk_dir.clone().map(DiskStore::new),
            ttl: config.ttl(),
            capacity: config.capacity,
            state: Mutex::new(State { entries: LruCache::unbounded(), next_generation: 0 }),
            counters: Counters::default(),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Return the session for `key`, loading it if necessary.
    ///
    /// Concurrent callers for the same uncached key share one load and receive
    /// the same `Arc<Session>` or the same error.
    pub async fn get(&self, key: &SessionKey) -> Result<Arc<Session>> {
        let key = key.canonical();

        let mut rx = match self.lookup(&key) {
            Lookup::Hit(session) => return Ok(session),
            Lookup::Join(rx) => rx,
            Lookup::Start(rx, tx, generation) => {
                let inner = Arc::clone(&self.inner);
                let task_key = key.clone();
                tokio::spawn(async move {
                    inner.load_and_publish(task_key, generation, tx).await;
                });
                rx
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(SessionError::source_unavailable(format!("load of {} was aborted", key))))
    }

    fn lookup(&self, key: &SessionKey) -> Lookup {
        let mut state = self.inner.lock();
        let ttl = self.inner.ttl;

        let found = match state.entries.get(key) {
            Some(Entry::Ready { session, loaded_at, .. }) => {
                Some(Ok((Arc::clone(session), *loaded_at)))
            }
            Some(Entry::Loading { rx, .. }) => Some(Err(rx.clone())),
            None => None,
        };

        match found {
            Some(Ok((session, loaded_at))) if !is_expired(loaded_at, ttl) => {
                Counters::bump(&self.inner.counters.hits);
                debug!(key = %key, "Session cache hit");
                return Lookup::Hit(session);
            }
            Some(Ok(_)) => {
                state.entries.pop(key);
                Counters::bump(&self.inner.counters.evictions);
                debug!(key = %key, "Cached session expired");
            }
            Some(Err(rx)) => {
                Counters::bump(&self.inner.counters.coalesced);
                debug!(key = %key, "Joining in-flight session load");
                return Lookup::Join(rx);
            }
            None => {}
        }

        Counters::bump(&self.inner.counters.misses);
        let generation = state.next_generation;
        state.next_generation += 1;

        let (tx, rx) = watch::channel(None);
        state.entries.put(key.clone(), Entry::Loading { rx: rx.clone(), generation });
        Lookup::Start(rx, tx, generation)
    }

    /// Drop the cached session for `key` from memory and disk.
    ///
    /// A load already in flight keeps running for its current waiters, but its
    /// result is not cached. Returns whether anything was removed.
    pub async fn invalidate(&self, key: &SessionKey) -> bool {
        let key = key.canonical();
        let removed = self.inner.lock().entries.pop(&key).is_some();

        let removed_from_disk = match &self.inner.disk {
            Some(disk) => disk.remove(&key).await.unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "Failed to remove disk entry");
                false
            }),
            None => false,
        };

        info!(key = %key, memory = removed, disk = removed_from_disk, "Session invalidated");
        removed || removed_from_disk
    }

    /// Whether a fresh loaded session for `key` is held in memory.
    pub fn contains(&self, key: &SessionKey) -> bool {
        let key = key.canonical();
        let state = self.inner.lock();
        matches!(
            state.entries.peek(&key),
            Some(Entry::Ready { loaded_at, .. }) if !is_expired(*loaded_at, self.inner.ttl)
        )
    }

    /// Number of loaded sessions held in memory.
    pub fn len(&self) -> usize {
        let state = self.inner.lock();
        state.entries.iter().filter(|(_, entry)| matches!(entry, Entry::Ready { .. })).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot()
    }

    /// Drop every expired session; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.inner.ttl else {
            return 0;
        };
        let mut state = self.inner.lock();
        let expired: Vec<SessionKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                matches!(entry, Entry::Ready { loaded_at, .. } if is_expired(*loaded_at, Some(ttl)))
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.entries.pop(key);
            Counters::bump(&self.inner.counters.evictions);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Purged expired sessions");
        }
        expired.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load_and_publish(
        self: Arc<Self>,
        key: SessionKey,
        generation: u64,
        tx: watch::Sender<Option<LoadOutcome>>,
    ) {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.populate(&key, generation))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(SessionError::source_unavailable(format!("load of {} panicked", key))))
            .map(Arc::new);

        match &outcome {
            Ok(_) => debug!(key = %key, elapsed_ms = started.elapsed().as_millis() as u64, "Session ready"),
            Err(e) => {
                Counters::bump(&self.counters.load_failures);
                error!(key = %key, error = %e, "Session load failed");
            }
        }

        self.publish(&key, generation, &outcome);
        tx.send_replace(Some(outcome));
    }

    /// Disk tier first, then the loader.
    async fn populate(&self, key: &SessionKey, generation: u64) -> Result<Session> {
        if let Some(disk) = &self.disk {
            match disk.read(key, self.ttl).await {
                Ok(Some(session)) => {
                    Counters::bump(&self.counters.disk_hits);
                    debug!(key = %key, "Session restored from disk");
                    return Ok(session);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Disk tier unavailable, loading from source"),
            }
        }

        Counters::bump(&self.counters.loads);
        let session = self.loader.load(key).await?;

        if let Some(disk) = &self.disk {
            if self.is_current(key, generation) {
                if let Err(e) = disk.write(&session).await {
                    warn!(key = %key, error = %e, "Failed to persist session to disk");
                }
            }
        }
        Ok(session)
    }

    fn is_current(&self, key: &SessionKey, generation: u64) -> bool {
        self.lock().entries.peek(key).is_some_and(|entry| entry.generation() == generation)
    }

    fn publish(&self, key: &SessionKey, generation: u64, outcome: &LoadOutcome) {
        let mut state = self.lock();
        let current = matches!(
            state.entries.peek(key),
            Some(Entry::Loading { generation: g, .. }) if *g == generation
        );
        if !current {
            debug!(key = %key, "Discarding result of invalidated load");
            return;
        }

        match outcome {
            Ok(session) => {
                state.entries.put(
                    key.clone(),
                    Entry::Ready { session: Arc::clone(session), loaded_at: Instant::now(), generation },
                );
                self.enforce_capacity(&mut state);
            }
            Err(_) => {
                state.entries.pop(key);
            }
        }
    }

    fn enforce_capacity(&self, state: &mut State) {
        let Some(capacity) = self.capacity else {
            return;
        };
        let mut ready = state.entries.iter().filter(|(_, e)| matches!(e, Entry::Ready { .. })).count();
        while ready > capacity {
            // `iter` runs most to least recently used
            let victim = state
                .entries
                .iter()
                .rev()
                .find(|(_, e)| matches!(e, Entry::Ready { .. }))
                .map(|(key, _)| key.clone());
            let Some(victim) = victim else {
                break;
            };
            state.entries.pop(&victim);
            ready -= 1;
            Counters::bump(&self.counters.evictions);
            debug!(key = %victim, "Evicted least recently used session");
        }
    }
}

fn is_expired(loaded_at: Instant, ttl: Option<Duration>) -> bool {
    ttl.is_some_and(|ttl| loaded_at.elapsed() >= ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionType;
    use crate::test_utils::{MockSource, SessionFixture, bahrain_race};

    fn fixture(event: &str) -> SessionFixture {
        SessionFixture::new(SessionKey::new(2024, event, SessionType::Race))
            .driver("NOR", "McLaren")
            .lap("NOR", 1, 95.1, "MEDIUM", 4)
            .lap("NOR", 2, 94.8, "MEDIUM", 5)
    }

    fn cache_with(source: Arc<MockSource>, config: CacheConfig) -> SessionCache {
        SessionCache::new(SessionLoader::new(source), &config)
    }

    #[tokio::test]
    async fn second_get_is_a_hit() {
        let source = Arc::new(MockSource::new().with_fixture(&bahrain_race()));
        let cache = cache_with(source.clone(), CacheConfig::default());
        let key = bahrain_race().key().clone();

        let first = cache.get(&key).await.unwrap();
        let second = cache.get(&SessionKey::parse(2024, "BAHRAIN", "r").unwrap()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetch_count(), 1);
        assert!(cache.contains(&key));

        let stats = cache.stats();
        assert_eq!((stats.misses, stats.hits, stats.loads), (1, 1, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_fetch() {
        let source = Arc::new(
            MockSource::new().with_fixture(&bahrain_race()).with_delay(Duration::from_millis(50)),
        );
        let cache = cache_with(source.clone(), CacheConfig::default());
        let key = bahrain_race().key().clone();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                tokio::spawn(async move { cache.get(&key).await })
            })
            .collect();

        let sessions: Vec<Arc<Session>> =
            futures::future::join_all(handles).await.into_iter().map(|r| r.unwrap().unwrap()).collect();

        assert_eq!(source.fetch_count(), 1);
        assert!(sessions.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced + stats.hits, 15);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let source = Arc::new(MockSource::new().with_fixture(&bahrain_race()));
        source.fail_next(SessionError::source_unavailable("timing feed returned 503"));
        let cache = cache_with(source.clone(), CacheConfig::default());
        let key = bahrain_race().key().clone();

        let err = cache.get(&key).await.unwrap_err();
        assert!(matches!(err, SessionError::SourceUnavailable { .. }));
        assert!(!cache.contains(&key));
        assert_eq!(cache.len(), 0);

        cache.get(&key).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(cache.stats().load_failures, 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let source = Arc::new(MockSource::new().with_fixture(&bahrain_race()));
        let cache = cache_with(source.clone(), CacheConfig::default());
        let key = bahrain_race().key().clone();

        let first = cache.get(&key).await.unwrap();
        assert!(cache.invalidate(&key).await);
        assert!(!cache.invalidate(&key).await);

        let second = cache.get(&key).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_during_load_drops_the_late_result() {
        let source = Arc::new(
            MockSource::new().with_fixture(&bahrain_race()).with_delay(Duration::from_secs(1)),
        );
        let cache = cache_with(source.clone(), CacheConfig::default());
        let key = bahrain_race().key().clone();

        let waiter = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.invalidate(&key).await);

        assert!(waiter.await.unwrap().is_ok());
        assert!(!cache.contains(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let source = Arc::new(MockSource::new().with_fixture(&bahrain_race()));
        let config = CacheConfig { ttl_secs: Some(60), ..CacheConfig::default() };
        let cache = cache_with(source.clone(), config);
        let key = bahrain_race().key().clone();

        cache.get(&key).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.contains(&key));
        assert_eq!(cache.purge_expired(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!cache.contains(&key));
        assert_eq!(cache.purge_expired(), 1);

        cache.get(&key).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let (a, b, c) = (fixture("imola"), fixture("monaco"), fixture("miami"));
        let source = Arc::new(MockSource::new().with_fixture(&a).with_fixture(&b).with_fixture(&c));
        let config = CacheConfig { capacity: Some(2), ..CacheConfig::default() };
        let cache = cache_with(source.clone(), config);

        cache.get(a.key()).await.unwrap();
        cache.get(b.key()).await.unwrap();
        cache.get(a.key()).await.unwrap();
        cache.get(c.key()).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(a.key()));
        assert!(!cache.contains(b.key()));
        assert!(cache.contains(c.key()));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn disk_tier_survives_a_new_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig { disk_dir: Some(dir.path().to_path_buf()), ..CacheConfig::default() };
        let key = bahrain_race().key().clone();

        let source = Arc::new(MockSource::new().with_fixture(&bahrain_race()));
        let warm = cache_with(source.clone(), config.clone());
        let original = warm.get(&key).await.unwrap();

        let restarted = cache_with(source.clone(), config);
        let restored = restarted.get(&key).await.unwrap();
        assert_eq!(*original, *restored);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(restarted.stats().disk_hits, 1);

        assert!(restarted.invalidate(&key).await);
        restarted.get(&key).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_cancel_the_load() {
        let source = Arc::new(
            MockSource::new().with_fixture(&bahrain_race()).with_delay(Duration::from_millis(50)),
        );
        let cache = cache_with(source.clone(), CacheConfig::default());
        let key = bahrain_race().key().clone();

        let gave_up = tokio::time::timeout(Duration::from_millis(5), cache.get(&key)).await;
        assert!(gave_up.is_err());

        let session = cache.get(&key).await.unwrap();
        assert_eq!(session.key, key);
        assert_eq!(source.fetch_count(), 1);
    }
}
