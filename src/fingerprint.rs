//! Device fingerprint derivation
//!
//! The key is `xxh64` (16 lowercase hex chars) over a versioned, field-tagged
//! canonical string. Every field is written as `tag:len:value;` so no value can
//! forge a field boundary. Field order is fixed and signals are sorted by key,
//! which makes the key independent of the order signals were supplied in.
//!
//! Both the click (browser) and the open (app SDK) side must hash the same set
//! of fields, so the browser family and client signals only participate when
//! configured to.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::net::IpAddr;

use xxhash_rust::xxh64::xxh64;

use crate::config::AttributionConfig;
use crate::storage::models::Platform;
use crate::utils::ip::network_prefix;

/// Bumped whenever the canonical layout changes
const FINGERPRINT_VERSION: &str = "v1";

/// Optional client signals (screen size, timezone, installed-app hints...)
pub type ClientSignals = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub platform: Platform,
    pub os_version: Option<&'a str>,
    pub ip: Option<IpAddr>,
    pub browser: Option<&'a str>,
    pub signals: Option<&'a ClientSignals>,
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintDeriver {
    include_browser_family: bool,
    signal_keys: BTreeSet<String>,
}

impl FingerprintDeriver {
    pub fn new(config: &AttributionConfig) -> Self {
        Self {
            include_browser_family: config.include_browser_family,
            signal_keys: config
                .signal_keys
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn signal_keys(&self) -> impl Iterator<Item = &str> {
        self.signal_keys.iter().map(String::as_str)
    }

    pub fn derive(&self, input: &FingerprintInput<'_>) -> String {
        format!("{:016x}", xxh64(self.canonical(input).as_bytes(), 0))
    }

    pub fn canonical(&self, input: &FingerprintInput<'_>) -> String {
        let mut out = String::with_capacity(96);
        push_field(&mut out, "ver", FINGERPRINT_VERSION);
        push_field(&mut out, "platform", input.platform.as_ref());
        push_field(
            &mut out,
            "os",
            &input
                .os_version
                .map(os_major_minor)
                .unwrap_or_else(|| "none".to_string()),
        );
        push_field(
            &mut out,
            "ip",
            &input
                .ip
                .map(|ip| network_prefix(&ip))
                .unwrap_or_else(|| "none".to_string()),
        );

        if self.include_browser_family {
            let family = input
                .browser
                .map(|b| b.trim().to_lowercase())
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| "none".to_string());
            push_field(&mut out, "browser", &family);
        }

        if let Some(signals) = input.signals {
            // BTreeMap 迭代即按 key 排序
            for (key, value) in signals.iter().filter(|(k, _)| self.signal_keys.contains(*k)) {
                if let Some(value) = canonical_signal(value) {
                    push_field(&mut out, &format!("sig.{}", key), &value);
                }
            }
        }

        out
    }
}

fn push_field(out: &mut String, tag: &str, value: &str) {
    let _ = write!(out, "{}:{}:{};", tag, value.len(), value);
}

/// "17.4.1" → "17.4", "14" → "14.0"
pub fn os_major_minor(version: &str) -> String {
    let mut parts = version
        .trim()
        .split(|c: char| c == '.' || c == '_')
        .map(|p| p.trim_start_matches('0'))
        .map(|p| if p.is_empty() { "0" } else { p });

    let major = parts.next().unwrap_or("0");
    let minor = parts.next().unwrap_or("0");
    if major.chars().all(|c| c.is_ascii_digit()) && minor.chars().all(|c| c.is_ascii_digit()) {
        format!("{}.{}", major, minor)
    } else {
        version.trim().to_lowercase()
    }
}

/// Scalars as text; lists (JSON arrays or comma-separated strings) sorted and
/// de-duplicated. `null`, empty values and objects are ignored.
fn canonical_signal(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    let scalar = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    };

    let items: BTreeSet<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar).collect(),
        Value::String(s) if s.contains(',') => {
            s.split(',').map(|p| p.trim().to_string()).collect()
        }
        other => scalar(other).into_iter().collect(),
    };

    let joined = items
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deriver(keys: &[&str], browser: bool) -> FingerprintDeriver {
        FingerprintDeriver::new(&AttributionConfig {
            include_browser_family: browser,
            signal_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..AttributionConfig::default()
        })
    }

    fn input<'a>(ip: &str, signals: Option<&'a ClientSignals>) -> FingerprintInput<'a> {
        FingerprintInput {
            platform: Platform::Ios,
            os_version: Some("17.4.1"),
            ip: ip.parse().ok(),
            browser: Some("Safari"),
            signals,
        }
    }

    #[test]
    fn test_fixed_length_hex() {
        let fp = deriver(&[], false).derive(&input("203.0.113.9", None));
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_signal_order_independent() {
        let d = deriver(&["timezone", "screen", "apps"], false);
        let a: ClientSignals = serde_json::from_value(json!({
            "timezone": "Europe/Berlin",
            "screen": "1170x2532",
            "apps": ["maps", "mail", "maps"]
        }))
        .unwrap();
        let b: ClientSignals = serde_json::from_value(json!({
            "apps": "mail,maps",
            "screen": "1170x2532",
            "timezone": "Europe/Berlin"
        }))
        .unwrap();
        assert_eq!(
            d.derive(&input("203.0.113.9", Some(&a))),
            d.derive(&input("203.0.113.9", Some(&b)))
        );
    }

    #[test]
    fn test_subnet_tolerance() {
        let d = deriver(&[], false);
        assert_eq!(
            d.derive(&input("203.0.113.9", None)),
            d.derive(&input("203.0.113.200", None))
        );
        assert_ne!(
            d.derive(&input("203.0.113.9", None)),
            d.derive(&input("203.0.114.9", None))
        );
        assert_eq!(
            d.derive(&input("2001:db8:1::1", None)),
            d.derive(&input("2001:db8:1:ffff::2", None))
        );
    }

    #[test]
    fn test_missing_signals_still_valid() {
        let d = deriver(&["screen"], false);
        let empty = ClientSignals::new();
        let fp = d.derive(&input("not-an-ip", Some(&empty)));
        assert_eq!(fp, d.derive(&input("garbage", None)));
        assert!(d.canonical(&input("garbage", None)).contains("ip:4:none;"));
    }

    #[test]
    fn test_unconfigured_signals_ignored() {
        let d = deriver(&[], false);
        let signals: ClientSignals =
            serde_json::from_value(json!({"screen": "1170x2532"})).unwrap();
        assert_eq!(
            d.derive(&input("203.0.113.9", Some(&signals))),
            d.derive(&input("203.0.113.9", None))
        );
    }

    #[test]
    fn test_browser_family_only_when_enabled() {
        let mut with_chrome = input("203.0.113.9", None);
        with_chrome.browser = Some("Chrome");
        let plain = input("203.0.113.9", None);

        let off = deriver(&[], false);
        assert_eq!(off.derive(&with_chrome), off.derive(&plain));

        let on = deriver(&[], true);
        assert_ne!(on.derive(&with_chrome), on.derive(&plain));
    }

    #[test]
    fn test_os_major_minor() {
        assert_eq!(os_major_minor("17.4.1"), "17.4");
        assert_eq!(os_major_minor("17_4"), "17.4");
        assert_eq!(os_major_minor("14"), "14.0");
        assert_eq!(os_major_minor("Tiramisu"), "tiramisu");
    }

    #[test]
    fn test_click_and_open_sides_agree() {
        // 点击侧从 UA 解析得到 "17.4"，SDK 上报 "17.4.1"
        let d = deriver(&[], false);
        let click = FingerprintInput {
            os_version: Some("17.4"),
            ..input("198.51.100.23", None)
        };
        let open = FingerprintInput {
            browser: None,
            ..input("198.51.100.77", None)
        };
        assert_eq!(d.derive(&click), d.derive(&open));
    }
}
