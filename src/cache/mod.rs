//! # Cache Module
//!
//! Time-bounded, size-bounded memoization for the sample server.
//!
//! Each [`TtlCache`] holds exactly one value: the result of the last run of
//! an expensive computation (a full directory scan, or the metadata batch
//! derived from it). It is not a keyed map.
//!
//! ## Features
//!
//! - **TTL Support**: a stored value is returned only while `now < expires_at`
//! - **Disable Switch**: a TTL of zero never stores, every access recomputes
//! - **Memory Bounded**: a result larger than the configured maximum is
//!   returned to its caller but not kept, and the slot is emptied
//! - **Thread Safety**: the slot is swapped under a mutex only after the
//!   factory completes, so no caller observes a partial value
//! - **Performance Metrics**: hit/miss/clear/overflow counters
//!
//! ## Configuration
//!
//! ```env
//! CACHE_TTL=3600000          # Time-to-live in milliseconds (0 disables)
//! CACHE_MAX_SIZE=500         # Entry count that forces a clear (0 = unbounded)
//! ```
//!
//! ## Concurrency
//!
//! Concurrent misses are not collapsed into a single computation: each
//! caller may run its own factory and the last one to finish stores its
//! result. A `clear()` that lands while a factory is still running can be
//! overwritten by that factory's store; the next invalidation or TTL expiry
//! converges the cache again.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use strudel_sampler::cache::TtlCache;
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example() {
//! let cache: TtlCache<Arc<Vec<String>>> = TtlCache::new(Duration::from_secs(60), Some(500));
//!
//! let names = cache
//!     .get(|| async { Arc::new(vec!["kick".to_string(), "snare".to_string()]) })
//!     .await;
//! assert_eq!(names.len(), 2);
//!
//! // Forzar recálculo en el próximo acceso
//! cache.clear();
//! # }
//! ```

pub mod ttl_cache;

pub use ttl_cache::TtlCache;
