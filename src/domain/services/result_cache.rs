use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

const SECONDS_PER_HOUR: i64 = 3600;

/// Cache performance statistics
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Wall-clock hour an instant falls into
pub fn hour_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(SECONDS_PER_HOUR)
}

#[derive(Clone)]
struct CachedResult<V> {
    value: V,
    cached_at: Instant,
}

struct Inner<V> {
    entries: LruCache<(String, i64), CachedResult<V>>,
    stats: CacheStats,
}

/// Per-entity analysis results keyed by `(entity, hour bucket)`
///
/// An entry dies at the end of its hour or after `ttl`, whichever comes first,
/// so its effective lifetime is anywhere between zero and one hour.
pub struct ResultCache<V> {
    inner: Mutex<Inner<V>>,
    ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        ResultCache {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    pub async fn get(&self, entity: &str, as_of: DateTime<Utc>) -> Option<V> {
        let key = (entity.to_string(), hour_bucket(as_of));
        let mut inner = self.inner.lock().await;

        let lookup = inner
            .entries
            .get(&key)
            .map(|cached| (cached.cached_at.elapsed() < self.ttl, cached.value.clone()));

        let fresh = match lookup {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                inner.entries.pop(&key);
                inner.stats.expirations += 1;
                None
            }
            None => None,
        };

        match fresh {
            Some(value) => {
                inner.stats.hits += 1;
                debug!(
                    entity = %entity,
                    cache_hit_rate = format!("{:.2}%", inner.stats.hit_rate()),
                    "Cache hit - reusing analysis result"
                );
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub async fn insert(&self, entity: &str, as_of: DateTime<Utc>, value: V) {
        let key = (entity.to_string(), hour_bucket(as_of));
        let mut inner = self.inner.lock().await;
        inner.entries.put(
            key,
            CachedResult {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        let cleared = inner.entries.len();
        inner.entries.clear();
        debug!(cleared_entries = cleared, "Result cache cleared");
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats.clone()
    }
}
