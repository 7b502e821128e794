//! URL 校验与拼接
//!
//! 链接里有两类 URL：网页/商店地址只允许 http(s)，App 地址允许自定义 scheme
//! （`myapp://`），但都拒绝可执行的危险协议。

use url::Url;

#[derive(Debug, PartialEq, Eq)]
pub enum UrlValidationError {
    EmptyUrl,
    InvalidProtocol(String),
    DangerousProtocol(String),
    InvalidFormat(String),
}

impl std::fmt::Display for UrlValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUrl => write!(f, "URL cannot be empty"),
            Self::InvalidProtocol(proto) => write!(
                f,
                "Invalid protocol: {}. Only http:// and https:// are allowed",
                proto
            ),
            Self::DangerousProtocol(proto) => write!(f, "Dangerous protocol blocked: {}", proto),
            Self::InvalidFormat(msg) => write!(f, "Invalid URL format: {}", msg),
        }
    }
}

impl std::error::Error for UrlValidationError {}

const DANGEROUS_PROTOCOLS: &[&str] = &[
    "javascript:",
    "data:",
    "file:",
    "vbscript:",
    "about:",
    "blob:",
];

fn parse_checked(url: &str) -> Result<Url, UrlValidationError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(UrlValidationError::EmptyUrl);
    }

    let lower = url.to_lowercase();
    if let Some(proto) = DANGEROUS_PROTOCOLS.iter().find(|p| lower.starts_with(*p)) {
        return Err(UrlValidationError::DangerousProtocol(proto.to_string()));
    }

    Url::parse(url).map_err(|e| UrlValidationError::InvalidFormat(e.to_string()))
}

/// 网页回退地址与应用商店地址
pub fn validate_web_url(url: &str) -> Result<(), UrlValidationError> {
    let parsed = parse_checked(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(UrlValidationError::InvalidProtocol(format!("{}:", other))),
    }
}

/// App scheme 或 universal link 基地址
pub fn validate_app_url(url: &str) -> Result<(), UrlValidationError> {
    parse_checked(url).map(|_| ())
}

/// `{app_url}{deep_path}`，避免出现双斜杠
pub fn join_deep_path(app_url: &str, deep_path: Option<&str>) -> String {
    match deep_path {
        Some(path) if !path.is_empty() => {
            if app_url.ends_with('/') && path.starts_with('/') {
                format!("{}{}", app_url, &path[1..])
            } else {
                format!("{}{}", app_url, path)
            }
        }
        _ => app_url.to_string(),
    }
}

/// 追加查询参数，保留原有参数
pub fn append_query_pairs(url: &str, pairs: &[(&str, &str)]) -> Result<String, UrlValidationError> {
    let mut parsed = parse_checked(url)?;
    {
        let mut query = parsed.query_pairs_mut();
        for (k, v) in pairs {
            query.append_pair(k, v);
        }
    }
    Ok(parsed.into())
}
