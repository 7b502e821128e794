//! GeoIP provider selection
//!
//! `maxminddb_path` configured and readable → MaxMind, otherwise the external
//! HTTP API. Private and loopback addresses never leave the process.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::external_api::ExternalApiProvider;
use super::maxmind::MaxMindProvider;
use crate::config::ClassifierConfig;
use crate::utils::ip::is_private_or_local;

/// 粗粒度地理位置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeoInfo {
    /// ISO 3166-1 alpha-2 (e.g. "US")
    pub country: Option<String>,
    /// 一级行政区代码 (e.g. "CA")
    pub state: Option<String>,
    pub city: Option<String>,
}

#[async_trait]
pub trait GeoIpLookup: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Option<GeoInfo>;

    /// provider 名称（用于日志）
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct GeoIpProvider {
    inner: Arc<dyn GeoIpLookup>,
}

impl GeoIpProvider {
    pub fn new(config: &ClassifierConfig) -> Self {
        let inner: Arc<dyn GeoIpLookup> = match config.maxminddb_path.as_deref() {
            Some(path) => match MaxMindProvider::new(path) {
                Ok(provider) => {
                    info!("GeoIP: Using MaxMind database at {}", path);
                    Arc::new(provider)
                }
                Err(e) => {
                    warn!(
                        "GeoIP: Failed to load MaxMind database at {}: {}, falling back to external API",
                        path, e
                    );
                    Arc::new(ExternalApiProvider::new(&config.geoip_api_url))
                }
            },
            None => {
                debug!("GeoIP: No MaxMind database configured, using external API");
                Arc::new(ExternalApiProvider::new(&config.geoip_api_url))
            }
        };

        info!("GeoIP: Initialized with {} provider", inner.name());
        Self { inner }
    }

    pub fn from_lookup(inner: Arc<dyn GeoIpLookup>) -> Self {
        Self { inner }
    }

    pub async fn lookup(&self, ip: IpAddr) -> Option<GeoInfo> {
        if is_private_or_local(&ip) {
            return None;
        }
        self.inner.lookup(ip).await
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(AtomicUsize);

    #[async_trait]
    impl GeoIpLookup for Fixed {
        async fn lookup(&self, _ip: IpAddr) -> Option<GeoInfo> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(GeoInfo {
                country: Some("US".into()),
                state: Some("CA".into()),
                city: None,
            })
        }

        fn name(&self) -> &'static str {
            "Fixed"
        }
    }

    #[tokio::test]
    async fn test_private_addresses_skip_lookup() {
        let inner = Arc::new(Fixed(AtomicUsize::new(0)));
        let provider = GeoIpProvider::from_lookup(inner.clone());

        assert!(provider.lookup("10.1.2.3".parse().unwrap()).await.is_none());
        assert_eq!(inner.0.load(Ordering::SeqCst), 0);

        let geo = provider.lookup("203.0.113.7".parse().unwrap()).await.unwrap();
        assert_eq!(geo.state.as_deref(), Some("CA"));
        assert_eq!(provider.provider_name(), "Fixed");
    }

    #[test]
    fn test_missing_mmdb_falls_back_to_external() {
        let config = ClassifierConfig {
            maxminddb_path: Some("/nonexistent/GeoLite2-City.mmdb".into()),
            ..ClassifierConfig::default()
        };
        assert_eq!(GeoIpProvider::new(&config).provider_name(), "ExternalAPI");
    }
}
