//! 外部 GeoIP HTTP API（默认 ip-api.com）
//!
//! Moka 缓存 + singleflight：同一 IP 的并发查询只发一次 HTTP。
//! 分类器在外层另有硬超时，这里的 HTTP 超时只用于回收阻塞线程。

use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{trace, warn};
use ureq::Agent;

use super::provider::{GeoInfo, GeoIpLookup};

const GEOIP_CACHE_TTL_SECS: u64 = 15 * 60;
const GEOIP_CACHE_MAX_CAPACITY: u64 = 10_000;
const HTTP_TIMEOUT_SECS: u64 = 2;

static HTTP_AGENT: OnceLock<Agent> = OnceLock::new();

fn get_agent() -> &'static Agent {
    HTTP_AGENT.get_or_init(|| {
        Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(HTTP_TIMEOUT_SECS)))
            .build()
            .into()
    })
}

pub struct ExternalApiProvider {
    /// `{ip}` 为占位符
    api_url_template: String,
    /// Option 用于负缓存
    cache: Cache<IpAddr, Option<GeoInfo>>,
}

impl ExternalApiProvider {
    pub fn new(api_url_template: &str) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(GEOIP_CACHE_TTL_SECS))
            .max_capacity(GEOIP_CACHE_MAX_CAPACITY)
            .build();

        Self {
            api_url_template: api_url_template.to_string(),
            cache,
        }
    }

    /// 解析 ip-api.com 风格的响应，兼容常见的其他字段名
    fn parse_response(json: &serde_json::Value) -> Option<GeoInfo> {
        if json["status"].as_str() == Some("fail") {
            return None;
        }

        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| json[*k].as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let info = GeoInfo {
            country: pick(&["countryCode", "country_code", "country"]),
            state: pick(&["region", "region_code", "regionCode"]),
            city: pick(&["city"]),
        };
        Some(info)
    }

    fn fetch_sync(url: String) -> Option<GeoInfo> {
        let resp = match get_agent().get(&url).call() {
            Ok(r) => r,
            Err(e) => {
                warn!("GeoIP API request to \"{}\" failed: {}", url, e);
                return None;
            }
        };

        let json: serde_json::Value = match resp.into_body().read_json() {
            Ok(j) => j,
            Err(e) => {
                warn!("GeoIP API response from \"{}\" parse failed: {}", url, e);
                return None;
            }
        };

        let info = Self::parse_response(&json);
        trace!("External API lookup: {:?}", info);
        info
    }

    async fn fetch(&self, ip: IpAddr) -> Option<GeoInfo> {
        let url = self.api_url_template.replace("{ip}", &ip.to_string());

        // ureq 是同步客户端
        tokio::task::spawn_blocking(move || Self::fetch_sync(url))
            .await
            .unwrap_or_else(|e| {
                warn!("GeoIP spawn_blocking failed: {}", e);
                None
            })
    }
}

#[async_trait]
impl GeoIpLookup for ExternalApiProvider {
    async fn lookup(&self, ip: IpAddr) -> Option<GeoInfo> {
        self.cache
            .get_with(ip, async {
                trace!("GeoIP cache miss for {}, fetching from API", ip);
                self.fetch(ip).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ExternalAPI"
    }
}
