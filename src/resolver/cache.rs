use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::error::SqlFxError;

pub(crate) type CachedValue = Arc<dyn Any + Send + Sync>;
pub(crate) type Slot = Shared<BoxFuture<'static, Result<CachedValue, SqlFxError>>>;

/// Resolver tag, transaction scope and canonical encoded input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub(crate) tag: Arc<str>,
    pub(crate) transaction: Option<u64>,
    pub(crate) input: String,
}

struct Entry {
    id: u64,
    slot: Slot,
    /// Set once the slot resolves; pending entries never expire.
    completed: Arc<OnceLock<Instant>>,
}

impl Entry {
    fn is_complete(&self) -> bool {
        self.completed.get().is_some()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.completed.get().is_some_and(|at| at.elapsed() >= ttl)
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, Entry>,
    order: VecDeque<(CacheKey, u64)>,
    next_id: u64,
}

struct Inner {
    state: Mutex<State>,
    capacity: usize,
    ttl: Duration,
}

/// Deduplicates resolver requests within one scope.
///
/// Each key maps to a pending or completed result. Concurrent requests for
/// the same key share one batch execution; completed successes are served
/// until they expire or are invalidated. Failures are dropped so the next
/// request retries.
///
/// The TTL counts from completion. Pending entries are never expired or
/// evicted for capacity, so the cache may briefly hold more than `capacity`
/// entries while many requests are in flight.
#[derive(Clone)]
pub struct RequestCache {
    inner: Arc<Inner>,
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new(65_536, Duration::from_secs(60))
    }
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("capacity", &self.inner.capacity)
            .field("ttl", &self.inner.ttl)
            .field("len", &self.len())
            .finish()
    }
}

pub(crate) enum Lookup {
    Hit { id: u64, slot: Slot },
    Inserted { id: u64, slot: Slot },
}

impl Lookup {
    pub(crate) fn into_parts(self) -> (u64, Slot) {
        match self {
            Lookup::Hit { id, slot } | Lookup::Inserted { id, slot } => (id, slot),
        }
    }
}

impl RequestCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                capacity: capacity.max(1),
                ttl,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of live entries, pending ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.order.clear();
    }

    /// Return the live entry for `key`, or insert the slot built by `start`.
    ///
    /// `start` runs under the cache lock, so at most one caller starts work
    /// for a given key.
    pub(crate) fn lookup_or_insert<F, Fut>(&self, key: CacheKey, start: F) -> Lookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue, SqlFxError>> + Send + 'static,
    {
        let mut state = self.state();
        if let Some(entry) = state.entries.get(&key) {
            if !entry.is_expired(self.inner.ttl) {
                return Lookup::Hit {
                    id: entry.id,
                    slot: entry.slot.clone(),
                };
            }
            state.entries.remove(&key);
        }
        let completed = Arc::new(OnceLock::new());
        let done = Arc::clone(&completed);
        let work = start();
        let slot = async move {
            let result = work.await;
            let _ = done.set(Instant::now());
            result
        }
        .boxed()
        .shared();
        let id = self.insert_locked(&mut state, key, slot.clone(), completed);
        Lookup::Inserted { id, slot }
    }

    /// Seed `key` with a completed value, replacing whatever was there.
    pub(crate) fn populate(&self, key: CacheKey, value: CachedValue) {
        let slot = futures_util::future::ready(Ok(value)).boxed().shared();
        let completed = Arc::new(OnceLock::from(Instant::now()));
        let mut state = self.state();
        self.insert_locked(&mut state, key, slot, completed);
    }

    pub(crate) fn invalidate(&self, key: &CacheKey) {
        self.state().entries.remove(key);
    }

    /// Remove `key` only if it still holds the entry `id`.
    pub(crate) fn evict_failed(&self, key: &CacheKey, id: u64) {
        let mut state = self.state();
        if state.entries.get(key).is_some_and(|e| e.id == id) {
            state.entries.remove(key);
        }
    }

    fn insert_locked(
        &self,
        state: &mut State,
        key: CacheKey,
        slot: Slot,
        completed: Arc<OnceLock<Instant>>,
    ) -> u64 {
        state.next_id += 1;
        let id = state.next_id;
        state.order.push_back((key.clone(), id));
        state.entries.insert(
            key,
            Entry {
                id,
                slot,
                completed,
            },
        );

        // Evict the oldest completed entries, never the one just inserted.
        while state.entries.len() > self.inner.capacity {
            let State { entries, order, .. } = &mut *state;
            let Some(pos) = order.iter().position(|(k, entry_id)| {
                *entry_id != id
                    && entries
                        .get(k)
                        .is_some_and(|e| e.id == *entry_id && e.is_complete())
            }) else {
                break;
            };
            if let Some((oldest, _)) = order.remove(pos) {
                entries.remove(&oldest);
            }
        }
        // Keep the order queue from growing without bound under churn.
        if state.order.len() > self.inner.capacity.saturating_mul(2) {
            let State { entries, order, .. } = state;
            order.retain(|(k, id)| entries.get(k).is_some_and(|e| e.id == *id));
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn key(input: &str) -> CacheKey {
        CacheKey {
            tag: Arc::from("people"),
            transaction: None,
            input: input.to_string(),
        }
    }

    fn value(v: i64) -> CachedValue {
        Arc::new(v)
    }

    async fn read(slot: Slot) -> Option<i64> {
        let value = slot.await.ok()?;
        value.downcast_ref::<i64>().copied()
    }

    #[tokio::test]
    async fn second_lookup_shares_the_first_slot() {
        let cache = RequestCache::default();
        let first = cache.lookup_or_insert(key("1"), || async { Ok(value(10)) });
        let second = cache.lookup_or_insert(key("1"), || async { Ok(value(99)) });

        assert!(matches!(first, Lookup::Inserted { .. }));
        let Lookup::Hit { slot, .. } = second else {
            panic!("expected a cache hit");
        };
        assert_eq!(read(slot).await, Some(10));
    }

    #[tokio::test]
    async fn populate_overwrites_and_invalidate_removes() {
        let cache = RequestCache::default();
        let _ = cache.lookup_or_insert(key("1"), || async { Ok(value(1)) });
        cache.populate(key("1"), value(2));

        let Lookup::Hit { slot, .. } = cache.lookup_or_insert(key("1"), || async { Ok(value(3)) })
        else {
            panic!("expected a cache hit");
        };
        assert_eq!(read(slot).await, Some(2));

        cache.invalidate(&key("1"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn evict_failed_ignores_replaced_entries() {
        let cache = RequestCache::default();
        let Lookup::Inserted { id, .. } =
            cache.lookup_or_insert(key("1"), || async { Err(SqlFxError::sql("boom")) })
        else {
            panic!("expected an insert");
        };
        cache.populate(key("1"), value(5));
        cache.evict_failed(&key("1"), id);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = RequestCache::new(2, Duration::from_secs(60));
        cache.populate(key("1"), value(1));
        cache.populate(key("2"), value(2));
        cache.populate(key("3"), value(3));
        assert_eq!(cache.len(), 2);
        assert!(matches!(
            cache.lookup_or_insert(key("1"), || async { Ok(value(0)) }),
            Lookup::Inserted { .. }
        ));
    }

    #[tokio::test]
    async fn pending_entries_outlive_the_ttl() {
        let cache = RequestCache::new(8, Duration::from_millis(1));
        let starts = Arc::new(AtomicUsize::new(0));
        let start = || {
            starts.fetch_add(1, Ordering::SeqCst);
            futures_util::future::pending::<Result<CachedValue, SqlFxError>>()
        };

        let first = cache.lookup_or_insert(key("1"), start);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.lookup_or_insert(key("1"), start);

        assert!(matches!(first, Lookup::Inserted { .. }));
        assert!(matches!(second, Lookup::Hit { .. }));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ttl_counts_from_completion() {
        let cache = RequestCache::new(8, Duration::from_millis(20));
        let (tx, rx) = tokio::sync::oneshot::channel::<i64>();
        let Lookup::Inserted { slot, .. } = cache.lookup_or_insert(key("1"), || async move {
            match rx.await {
                Ok(v) => Ok(value(v)),
                Err(_) => Err(SqlFxError::sql("sender dropped")),
            }
        }) else {
            panic!("expected an insert");
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = tx.send(7);
        assert_eq!(read(slot).await, Some(7));

        let Lookup::Hit { slot, .. } = cache.lookup_or_insert(key("1"), || async { Ok(value(0)) })
        else {
            panic!("a freshly completed entry should still be served");
        };
        assert_eq!(read(slot).await, Some(7));
    }

    #[test]
    fn capacity_never_evicts_pending_entries() {
        let cache = RequestCache::new(1, Duration::from_secs(60));
        let _ = cache.lookup_or_insert(
            key("1"),
            futures_util::future::pending::<Result<CachedValue, SqlFxError>>,
        );
        cache.populate(key("2"), value(2));

        assert_eq!(cache.len(), 2);
        assert!(matches!(
            cache.lookup_or_insert(key("1"), || async { Ok(value(0)) }),
            Lookup::Hit { .. }
        ));
        assert!(matches!(
            cache.lookup_or_insert(key("2"), || async { Ok(value(0)) }),
            Lookup::Hit { .. }
        ));
    }

    #[tokio::test]
    async fn expired_entries_are_replaced() {
        let cache = RequestCache::new(8, Duration::from_millis(1));
        cache.populate(key("1"), value(1));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(matches!(
            cache.lookup_or_insert(key("1"), || async { Ok(value(2)) }),
            Lookup::Inserted { .. }
        ));
    }
}
