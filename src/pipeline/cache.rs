//! Two-tier GEO cache. Tier 1 is a hot key-value layer (redis when
//! configured, otherwise a bounded in-memory LRU; a redis outage degrades to
//! the LRU transparently). Tier 2 is the datastore's aggregate read. The hot
//! tier is never authoritative: every value in it is also durable.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use redis::AsyncCommands;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::HotCacheConfig;
use crate::entities::GeoAggregate;
use crate::error::OracleError;
use crate::store::Datastore;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub promotions: u64,
    pub hit_rate: f64,
}

#[derive(Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
}

struct MemoryEntry {
    payload: String,
    expires_at: Instant,
}

enum HotBackend {
    Memory,
    Redis(redis::aio::ConnectionManager),
}

/// Hot key-value tier storing JSON payloads. All errors degrade to the
/// in-memory fallback; callers never see them.
pub struct HotTier {
    backend: HotBackend,
    fallback: Mutex<LruCache<String, MemoryEntry>>,
    ttl: Duration,
}

impl HotTier {
    pub async fn new(config: &HotCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_memory_entries.max(1))
            .unwrap_or(NonZeroUsize::new(1000).expect("nonzero"));
        let fallback = Mutex::new(LruCache::new(capacity));
        let ttl = Duration::from_secs(config.ttl_seconds.max(1));

        let backend = match (config.backend.as_str(), config.url.as_deref()) {
            ("redis", Some(url)) => match connect_redis(url).await {
                Ok(manager) => HotBackend::Redis(manager),
                Err(err) => {
                    warn!(%err, "hot cache unreachable, using in-memory fallback");
                    HotBackend::Memory
                }
            },
            _ => HotBackend::Memory,
        };
        Self {
            backend,
            fallback,
            ttl,
        }
    }

    pub async fn get_raw(&self, key: &str) -> Option<String> {
        if let HotBackend::Redis(manager) = &self.backend {
            let mut manager = manager.clone();
            match manager.get::<_, Option<String>>(key).await {
                Ok(found @ Some(_)) => return found,
                Ok(None) => return None,
                Err(err) => warn!(%err, key, "hot tier read failed, trying fallback"),
            }
        }
        let mut cache = self.fallback.lock().expect("hot cache poisoned");
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    pub async fn put_raw(&self, key: &str, payload: String, ttl: Duration) {
        if let HotBackend::Redis(manager) = &self.backend {
            let mut manager = manager.clone();
            match manager
                .set_ex::<_, _, ()>(key, payload.clone(), ttl.as_secs().max(1))
                .await
            {
                Ok(()) => return,
                Err(err) => warn!(%err, key, "hot tier write failed, using fallback"),
            }
        }
        let mut cache = self.fallback.lock().expect("hot cache poisoned");
        cache.put(
            key.to_string(),
            MemoryEntry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub async fn remove(&self, key: &str) {
        if let HotBackend::Redis(manager) = &self.backend {
            let mut manager = manager.clone();
            if let Err(err) = manager.del::<_, ()>(key).await {
                warn!(%err, key, "hot tier delete failed");
            }
        }
        self.fallback.lock().expect("hot cache poisoned").pop(key);
    }

    pub fn default_ttl(&self) -> Duration {
        self.ttl
    }
}

async fn connect_redis(url: &str) -> Result<redis::aio::ConnectionManager, redis::RedisError> {
    let client = redis::Client::open(url)?;
    client.get_connection_manager().await
}

/// The GEO-aggregate view over the tiers: hot hit, warm hit with promotion,
/// or miss (the orchestrator runs auto-discovery on miss and writes
/// through).
pub struct GeoCache {
    hot: HotTier,
    store: Datastore,
    stats: StatCounters,
}

fn geo_key(geo_id: &str) -> String {
    format!("geo:{geo_id}")
}

impl GeoCache {
    pub async fn new(config: &HotCacheConfig, store: Datastore) -> Self {
        Self {
            hot: HotTier::new(config).await,
            store,
            stats: StatCounters::default(),
        }
    }

    pub fn hot(&self) -> &HotTier {
        &self.hot
    }

    /// Hot, then warm with promotion, then `None` (caller discovers).
    pub async fn get(&self, geo_id: &str) -> Result<Option<GeoAggregate>, OracleError> {
        let key = geo_key(geo_id);
        if let Some(raw) = self.hot.get_raw(&key).await {
            match serde_json::from_str(&raw) {
                Ok(aggregate) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(geo_id, "hot cache hit");
                    return Ok(Some(aggregate));
                }
                Err(err) => {
                    warn!(geo_id, %err, "hot cache entry unreadable, dropping");
                    self.hot.remove(&key).await;
                }
            }
        }

        if let Some(aggregate) = self.store.get_complete_geo_data(geo_id).await? {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            self.stats.promotions.fetch_add(1, Ordering::Relaxed);
            debug!(geo_id, "warm tier hit, promoting");
            if let Ok(payload) = serde_json::to_string(&aggregate) {
                self.hot.put_raw(&key, payload, self.hot.default_ttl()).await;
            }
            return Ok(Some(aggregate));
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Write-through: the aggregate must already be durable (it is produced
    /// from the warm tier); this refreshes the hot entry.
    pub async fn update(&self, geo_id: &str, aggregate: &GeoAggregate) {
        if let Ok(payload) = serde_json::to_string(aggregate) {
            self.hot
                .put_raw(&geo_key(geo_id), payload, self.hot.default_ttl())
                .await;
        }
    }

    pub async fn invalidate(&self, geo_id: &str) {
        self.hot.remove(&geo_key(geo_id)).await;
    }

    pub async fn invalidate_batch(&self, geo_ids: &[String]) {
        for geo_id in geo_ids {
            self.invalidate(geo_id).await;
        }
    }

    pub fn get_stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let promotions = self.stats.promotions.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            promotions,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
