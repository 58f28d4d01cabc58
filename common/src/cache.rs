use crate::config::CONFIG;
use bytes::Bytes;
use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Deterministic cache key. Both the catalog service and the pre-warmer build
/// keys from the same signature values, so a warmed entry and a live request
/// hash to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_signature<S: Serialize>(signature: &S) -> Self {
        let json = serde_json::to_string(signature).expect("cache signature should serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Keyed byte cache with a global time-to-live. Entries are opaque serialized
/// payloads; typed access goes through `get_json`/`set_json`.
#[derive(Clone)]
pub struct ResultCache {
    cache: Cache<CacheKey, Bytes>,
}

impl ResultCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        debug!(max_entries, ?ttl, "result cache initialized");
        Self { cache }
    }

    pub fn from_config() -> Self {
        Self::new(
            CONFIG.cache.max_entries,
            Duration::from_secs(CONFIG.cache.ttl_secs),
        )
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        self.cache.get(key).await
    }

    pub async fn set(&self, key: CacheKey, value: Bytes) {
        self.cache.insert(key, value).await;
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = self.cache.get(key).await?;
        serde_json::from_slice(&bytes).ok()
    }

    pub async fn set_json<T: Serialize>(&self, key: CacheKey, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.cache.insert(key, Bytes::from(bytes)).await,
            Err(e) => debug!("cache serialization failed: `{e}`"),
        }
    }

}
