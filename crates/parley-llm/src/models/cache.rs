use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::time::Instant;

type Slot<V> = Arc<OnceCell<(Instant, V)>>;

/// Keyed cache with a time-to-live and one in-flight fetch per key
///
/// Concurrent misses on the same key share a single fetch. A failed fetch is
/// not cached; the next caller retries. An expired slot is swapped for an
/// empty one while the map entry is held, so only one refresh starts.
pub struct TtlCache<K, V> {
    ttl: Duration,
    slots: DashMap<K, Slot<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: DashMap::new(),
        }
    }

    /// Cached value for `key`, or the result of `fetch`
    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let (_, value) = slot
            .get_or_try_init(|| async { fetch().await.map(|value| (Instant::now(), value)) })
            .await?;
        Ok(value.clone())
    }

    /// Drop every cached value
    pub fn clear(&self) {
        self.slots.clear();
    }

    // The map guard must be released before the caller awaits the slot.
    fn slot(&self, key: K) -> Slot<V> {
        let mut entry = self.slots.entry(key).or_insert_with(|| Arc::new(OnceCell::new()));
        let expired = entry
            .value()
            .get()
            .is_some_and(|(fetched_at, _)| fetched_at.elapsed() >= self.ttl);
        if expired {
            *entry.value_mut() = Arc::new(OnceCell::new());
        }
        Arc::clone(entry.value())
    }
}
