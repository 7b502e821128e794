//! Read-through link cache
//!
//! Links are hot on the redirect path and change rarely. Misses are cached as
//! well (`None`) so a flood of unknown codes does not reach the database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, trace};

use crate::config::LinkCacheConfig;
use crate::errors::{DeeplinkError, Result};
use crate::storage::models::Link;
use crate::storage::traits::LinkStore;

pub struct CachedLinkStore {
    inner: Arc<dyn LinkStore>,
    cache: Cache<String, Option<Link>>,
}

impl CachedLinkStore {
    pub fn new(inner: Arc<dyn LinkStore>, config: &LinkCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        debug!(
            "CachedLinkStore initialized: max_capacity={}, ttl={}s",
            config.cache_capacity, config.cache_ttl_secs
        );
        Self { inner, cache }
    }
}

#[async_trait]
impl LinkStore for CachedLinkStore {
    async fn get_link(&self, id: &str) -> Result<Option<Link>> {
        // 同一 key 的并发 miss 只会触发一次后端查询
        self.cache
            .try_get_with(id.to_string(), async {
                trace!("Link cache miss: {}", id);
                self.inner.get_link(id).await
            })
            .await
            .map_err(|e: Arc<DeeplinkError>| (*e).clone())
    }

    async fn upsert_link(&self, link: &Link) -> Result<()> {
        self.inner.upsert_link(link).await?;
        self.cache.invalidate(&link.id).await;
        Ok(())
    }
}
