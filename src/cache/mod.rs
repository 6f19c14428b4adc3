/// Cache invalidation hook.
///
/// List views are served from a side cache owned by another service. After
/// any state-changing operation we tell it the views are stale. The cache
/// is invalidated, never relied upon: failures are logged and swallowed.
// region:    --- Imports
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
// endregion: --- Imports

// region:    --- Trait

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate_listings(&self);
}

// endregion: --- Trait

// region:    --- Implementations

/// POSTs to the cache service's purge endpoint with a short timeout.
pub struct HttpCacheInvalidator {
    client: reqwest::Client,
    purge_url: String,
}

impl HttpCacheInvalidator {
    pub fn new(purge_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("HTTP client construction failed");
        Self { client, purge_url }
    }
}

#[async_trait]
impl CacheInvalidator for HttpCacheInvalidator {
    async fn invalidate_listings(&self) {
        match self.client.post(&self.purge_url).send().await {
            Ok(_) => debug!("{:<12} --> listing cache invalidated", "Cache"),
            Err(e) => warn!(
                "{:<12} --> cache invalidation failed (stale views tolerated): {}",
                "Cache", e
            ),
        }
    }
}

/// For tests and deployments without a cache service.
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn invalidate_listings(&self) {}
}

// endregion: --- Implementations
