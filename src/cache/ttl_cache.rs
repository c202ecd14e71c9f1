use parking_lot::Mutex;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Number of items a cached value holds, checked against the size bound.
pub trait Cardinality {
    fn cardinality(&self) -> usize;
}

impl<T> Cardinality for Vec<T> {
    fn cardinality(&self) -> usize {
        self.len()
    }
}

impl<T: Cardinality + ?Sized> Cardinality for Arc<T> {
    fn cardinality(&self) -> usize {
        (**self).cardinality()
    }
}

/// Cache entry con expiración
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Memoizador de un solo slot con TTL y límite de tamaño.
///
/// Holds at most one value: the result of the last factory run. The slot is
/// only written after the factory future completes, so readers see either
/// the previous complete value or nothing.
#[derive(Debug)]
pub struct TtlCache<V> {
    slot: Mutex<Option<CacheEntry<V>>>,
    ttl: Duration,
    max_size: Option<usize>,
    stats: CacheStats,
}

impl<V> TtlCache<V>
where
    V: Clone + Cardinality,
{
    /// `ttl == 0` disables storage; `max_size` of `None` means unbounded.
    pub fn new(ttl: Duration, max_size: Option<usize>) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
            max_size,
            stats: CacheStats::default(),
        }
    }

    /// Returns the live value, or runs `factory` and stores its result.
    ///
    /// Concurrent misses may each run the factory; the last one to finish
    /// wins the slot.
    pub async fn get<F, Fut>(&self, factory: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.live_value() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return value;
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let value = factory().await;
        self.store(&value);
        value
    }

    /// Descarta el valor almacenado sin importar su expiración.
    pub fn clear(&self) {
        self.slot.lock().take();
        self.stats.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            clears: self.stats.clears.load(Ordering::Relaxed),
            overflows: self.stats.overflows.load(Ordering::Relaxed),
        }
    }

    fn live_value(&self) -> Option<V> {
        let mut slot = self.slot.lock();
        if let Some(entry) = slot.as_ref() {
            if !entry.is_expired(Instant::now()) {
                return Some(entry.value.clone());
            }
            debug!("Entrada de caché expirada");
            *slot = None;
        }
        None
    }

    fn store(&self, value: &V) {
        if let Some(max) = self.max_size {
            let size = value.cardinality();
            if size > max {
                warn!(size, max, "Cache limit exceeded, clearing instead of storing");
                self.slot.lock().take();
                self.stats.overflows.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        if self.ttl.is_zero() {
            return;
        }

        *self.slot.lock() = Some(CacheEntry {
            value: value.clone(),
            expires_at: Instant::now() + self.ttl,
        });
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
    overflows: AtomicU64,
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub clears: u64,
    pub overflows: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn counting_factory(
        calls: &AtomicUsize,
        len: usize,
    ) -> impl Future<Output = Arc<Vec<usize>>> + '_ {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Arc::new((0..len).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_value_skips_factory() {
        let cache = TtlCache::new(Duration::from_secs(60), None);
        let calls = AtomicUsize::new(0);

        let first = cache.get(|| counting_factory(&calls, 3)).await;
        let second = cache.get(|| counting_factory(&calls, 3)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.metrics().hits, 1);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_forces_recompute() {
        let cache = TtlCache::new(Duration::from_secs(60), None);
        let calls = AtomicUsize::new(0);

        cache.get(|| counting_factory(&calls, 1)).await;
        cache.clear();
        cache.get(|| counting_factory(&calls, 1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.metrics().clears, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_forces_recompute() {
        let ttl = Duration::from_millis(500);
        let cache = TtlCache::new(ttl, None);
        let calls = AtomicUsize::new(0);

        cache.get(|| counting_factory(&calls, 1)).await;
        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        cache.get(|| counting_factory(&calls, 1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        cache.get(|| counting_factory(&calls, 1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_stores() {
        let cache = TtlCache::new(Duration::ZERO, None);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            cache.get(|| counting_factory(&calls, 1)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.metrics().hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_returns_value_but_leaves_slot_empty() {
        let cache = TtlCache::new(Duration::from_secs(60), Some(2));
        let calls = AtomicUsize::new(0);

        let value = cache.get(|| counting_factory(&calls, 3)).await;
        assert_eq!(value.len(), 3);
        assert_eq!(cache.metrics().overflows, 1);

        cache.get(|| counting_factory(&calls, 3)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_limit_is_still_cached() {
        let cache = TtlCache::new(Duration::from_secs(60), Some(2));
        let calls = AtomicUsize::new(0);

        cache.get(|| counting_factory(&calls, 2)).await;
        cache.get(|| counting_factory(&calls, 2)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_see_complete_values() {
        let cache = TtlCache::new(Duration::from_secs(60), None);
        let calls = AtomicUsize::new(0);

        let slow = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Arc::new(vec![1, 2, 3])
        };

        let (a, b) = tokio::join!(cache.get(slow), cache.get(slow));

        assert_eq!(*a, vec![1, 2, 3]);
        assert_eq!(*b, vec![1, 2, 3]);
        // Sin colapso de peticiones: ambos pueden recalcular.
        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(*cache.get(slow).await, vec![1, 2, 3]);
    }

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics {
            hits: 3,
            misses: 1,
            clears: 0,
            overflows: 0,
        };
        assert_eq!(metrics.hit_rate(), 0.75);
    }
}
