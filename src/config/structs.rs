use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 优先级：ENV > config.toml > 默认值
/// ENV 前缀：DL，分隔符：__
/// 示例：DL__ATTRIBUTION__WINDOW_SECS=86400
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub fraud: FraudConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub retry_queue: RetryQueueConfig,
    #[serde(default)]
    pub links: LinkCacheConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    pub fn load(path: &str) -> Self {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("DL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.trusted_proxies")
                    .with_list_parse_key("attribution.signal_keys")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// 可信代理（单 IP 或 CIDR）。为空时自动检测：私有/回环地址来的连接视为代理
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `memory://` 使用进程内存储（不持久化）
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// Geo/Device 分类器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_enable_geo_lookup")]
    pub enable_geo_lookup: bool,
    /// MaxMindDB 文件路径 (GeoLite2-City.mmdb)
    /// 如果配置且文件可读，使用本地解析；否则 fallback 到外部 API
    #[serde(default)]
    pub maxminddb_path: Option<String>,
    /// 外部 GeoIP API URL，使用 {ip} 作为占位符
    #[serde(default = "default_geoip_api_url")]
    pub geoip_api_url: String,
    /// 单次地理位置查询的硬超时，超时后按未知地区降级
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

/// 归因配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionConfig {
    /// 点击与打开之间允许的最大间隔
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// recordOpen 同步匹配的时间上限，超时交给后台 sweep
    #[serde(default = "default_match_timeout_ms")]
    pub match_timeout_ms: u64,
    /// 点击/打开事件同步写入的时间上限，超时转入重试队列
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub include_browser_family: bool,
    /// 参与指纹计算的可选客户端信号
    #[serde(default)]
    pub signal_keys: Vec<String>,
}

/// 点击洪泛检测
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    #[serde(default = "default_fraud_max_clicks")]
    pub max_clicks: usize,
    #[serde(default = "default_fraud_sub_window_secs")]
    pub sub_window_secs: u64,
}

/// 后台补偿匹配任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_sweep_batch_size")]
    pub batch_size: u64,
    /// 只处理早于 now - grace 的 open，给同步路径留出时间
    #[serde(default = "default_sweep_grace_secs")]
    pub grace_secs: u64,
}

/// 写失败重试队列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryQueueConfig {
    #[serde(default = "default_retry_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_retry_max_pending")]
    pub max_pending: usize,
}

/// Link 读缓存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCacheConfig {
    #[serde(default = "default_link_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_link_cache_capacity")]
    pub cache_capacity: u64,
}

// ============================================================
// Default value functions
// ============================================================

fn default_true() -> bool {
    true
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "deeplinker.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_enable_geo_lookup() -> bool {
    true
}

fn default_geoip_api_url() -> String {
    "http://ip-api.com/json/{ip}?fields=status,countryCode,region,city".to_string()
}

fn default_classifier_timeout_ms() -> u64 {
    50
}

fn default_window_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_match_timeout_ms() -> u64 {
    200
}

fn default_write_timeout_ms() -> u64 {
    50
}

fn default_fraud_max_clicks() -> usize {
    50
}

fn default_fraud_sub_window_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_sweep_batch_size() -> u64 {
    500
}

fn default_sweep_grace_secs() -> u64 {
    5
}

fn default_retry_flush_interval_secs() -> u64 {
    5
}

fn default_retry_max_pending() -> usize {
    100_000
}

fn default_link_cache_ttl_secs() -> u64 {
    60
}

fn default_link_cache_capacity() -> u64 {
    10_000
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enable_geo_lookup: default_enable_geo_lookup(),
            maxminddb_path: None,
            geoip_api_url: default_geoip_api_url(),
            timeout_ms: default_classifier_timeout_ms(),
        }
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            match_timeout_ms: default_match_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            include_browser_family: false,
            signal_keys: Vec::new(),
        }
    }
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            max_clicks: default_fraud_max_clicks(),
            sub_window_secs: default_fraud_sub_window_secs(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval_secs(),
            batch_size: default_sweep_batch_size(),
            grace_secs: default_sweep_grace_secs(),
        }
    }
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_retry_flush_interval_secs(),
            max_pending: default_retry_max_pending(),
        }
    }
}

impl Default for LinkCacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_link_cache_ttl_secs(),
            cache_capacity: default_link_cache_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StaticConfig::default();
        assert_eq!(config.attribution.window_secs, 604_800);
        assert_eq!(config.server.port, 8080);
        assert!(config.server.trusted_proxies.is_empty());
        assert!(!config.attribution.include_browser_family);
        assert!(config.sweep.enabled);
    }

    #[test]
    fn test_sample_config_round_trips_through_toml() {
        let sample = StaticConfig::generate_sample_config();
        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.fraud.max_clicks, FraudConfig::default().max_clicks);
        assert_eq!(parsed.database.database_url, "deeplinker.db");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: StaticConfig = toml::from_str(
            r#"
            [attribution]
            window_secs = 3600

            [fraud]
            max_clicks = 5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.attribution.window_secs, 3600);
        assert_eq!(parsed.attribution.match_timeout_ms, 200);
        assert_eq!(parsed.fraud.max_clicks, 5);
        assert_eq!(parsed.fraud.sub_window_secs, 60);
    }
}
