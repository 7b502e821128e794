//! Geo/Device classifier
//!
//! `classify(user_agent, ip)` never fails: a geo lookup that errors or exceeds
//! `classifier.timeout_ms` yields an unknown region and sets `degraded`.

mod device;
pub mod geoip;

use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use tracing::{trace, warn};

use crate::config::ClassifierConfig;
use crate::errors::{DeeplinkError, Result};
use crate::storage::models::Platform;
use crate::utils::ip::parse_ip;

pub use device::{DeviceInfo, parse_device};
pub use geoip::{GeoInfo, GeoIpLookup, GeoIpProvider};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub platform: Platform,
    pub browser: String,
    pub os_version: Option<String>,
    pub is_bot: bool,
    /// 规范化后的客户端 IP，无法解析时为 None
    pub ip: Option<IpAddr>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    /// geo 查询超时或失败
    pub degraded: bool,
}

#[derive(Clone)]
pub struct Classifier {
    geo: Option<GeoIpProvider>,
    timeout: Duration,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let geo = config
            .enable_geo_lookup
            .then(|| GeoIpProvider::new(config));
        Self::with_provider(geo, Duration::from_millis(config.timeout_ms))
    }

    pub fn with_provider(geo: Option<GeoIpProvider>, timeout: Duration) -> Self {
        Self { geo, timeout }
    }

    /// 只做 UA 解析，不查地理位置
    pub fn device_only() -> Self {
        Self::with_provider(None, Duration::ZERO)
    }

    pub async fn classify(&self, user_agent: &str, ip: Option<&str>) -> Classification {
        let device = parse_device(user_agent);
        let ip = ip.and_then(parse_ip);

        let (geo, degraded) = match ip {
            Some(addr) => match self.locate(addr).await {
                Ok(geo) => (geo, false),
                Err(e) => {
                    warn!("Classifier degraded for {}: {}", addr, e);
                    (GeoInfo::default(), true)
                }
            },
            None => (GeoInfo::default(), false),
        };

        trace!(
            "classified ua={:?} platform={} region={:?}/{:?}",
            user_agent, device.platform, geo.country, geo.state
        );

        Classification {
            platform: device.platform,
            browser: device.browser,
            os_version: device.os_version,
            is_bot: device.is_bot,
            ip,
            country: geo.country,
            state: geo.state,
            city: geo.city,
            degraded,
        }
    }

    /// 未找到不算失败；只有超时才返回 ClassifierTimeout
    async fn locate(&self, ip: IpAddr) -> Result<GeoInfo> {
        let Some(geo) = &self.geo else {
            return Ok(GeoInfo::default());
        };

        match tokio::time::timeout(self.timeout, geo.lookup(ip)).await {
            Ok(found) => Ok(found.unwrap_or_default()),
            Err(_) => Err(DeeplinkError::classifier_timeout(format!(
                "{} lookup exceeded {:?}",
                geo.provider_name(),
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Slow;

    #[async_trait]
    impl GeoIpLookup for Slow {
        async fn lookup(&self, _ip: IpAddr) -> Option<GeoInfo> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Some(GeoInfo::default())
        }

        fn name(&self) -> &'static str {
            "Slow"
        }
    }

    struct Static;

    #[async_trait]
    impl GeoIpLookup for Static {
        async fn lookup(&self, _ip: IpAddr) -> Option<GeoInfo> {
            Some(GeoInfo {
                country: Some("US".into()),
                state: Some("NY".into()),
                city: Some("New York".into()),
            })
        }

        fn name(&self) -> &'static str {
            "Static"
        }
    }

    const UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";

    #[tokio::test]
    async fn test_timeout_degrades_to_unknown_region() {
        let classifier = Classifier::with_provider(
            Some(GeoIpProvider::from_lookup(Arc::new(Slow))),
            Duration::from_millis(20),
        );
        let c = classifier.classify(UA, Some("203.0.113.7")).await;
        assert!(c.degraded);
        assert!(c.country.is_none());
        assert_eq!(c.platform, Platform::Ios);
    }

    #[tokio::test]
    async fn test_region_populated() {
        let classifier = Classifier::with_provider(
            Some(GeoIpProvider::from_lookup(Arc::new(Static))),
            Duration::from_millis(50),
        );
        let c = classifier.classify(UA, Some("203.0.113.7:443")).await;
        assert!(!c.degraded);
        assert_eq!(c.state.as_deref(), Some("NY"));
        assert_eq!(c.ip, Some("203.0.113.7".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_missing_ip_is_not_degraded() {
        let c = Classifier::device_only().classify(UA, None).await;
        assert!(!c.degraded);
        assert!(c.ip.is_none());
    }
}
