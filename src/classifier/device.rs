//! User-Agent → platform / browser / OS

use serde::Serialize;
use woothee::parser::Parser;

use crate::storage::models::Platform;

const UNKNOWN: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub platform: Platform,
    /// Browser family, `"unknown"` when woothee cannot tell
    pub browser: String,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub is_bot: bool,
}

pub fn parse_device(user_agent: &str) -> DeviceInfo {
    let parsed = Parser::new().parse(user_agent).unwrap_or_default();

    let known = |s: &str| (!s.is_empty() && s != UNKNOWN).then(|| s.to_string());

    let os = known(parsed.os);
    let platform = detect_platform(os.as_deref(), user_agent);
    let os_version =
        known(&*parsed.os_version).or_else(|| os_version_from_ua(platform, user_agent));

    DeviceInfo {
        platform,
        browser: known(parsed.name).unwrap_or_else(|| "unknown".to_string()),
        os,
        os_version,
        is_bot: parsed.category == "crawler",
    }
}

fn detect_platform(os: Option<&str>, user_agent: &str) -> Platform {
    match os {
        Some("iPhone" | "iPad" | "iPod" | "iOS") => return Platform::Ios,
        Some("Android") => return Platform::Android,
        _ => {}
    }
    // woothee 不认识的内嵌 WebView / 应用内浏览器
    if ["iPhone", "iPad", "iPod"].iter().any(|m| user_agent.contains(m)) {
        Platform::Ios
    } else if user_agent.contains("Android") {
        Platform::Android
    } else {
        Platform::Web
    }
}

/// `CPU iPhone OS 17_4 like Mac OS X` / `Android 14;`
fn os_version_from_ua(platform: Platform, user_agent: &str) -> Option<String> {
    let (marker, sep) = match platform {
        Platform::Ios => (" OS ", '_'),
        Platform::Android => ("Android ", '.'),
        Platform::Web => return None,
    };
    let start = user_agent.find(marker)? + marker.len();
    let version: String = user_agent[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == sep)
        .map(|c| if c == '_' { '.' } else { c })
        .collect();
    (!version.is_empty()).then_some(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const ANDROID_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";
    const DESKTOP_FIREFOX: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_iphone() {
        let info = parse_device(IPHONE_SAFARI);
        assert_eq!(info.platform, Platform::Ios);
        assert_eq!(info.browser, "Safari");
        assert!(info.os_version.as_deref().unwrap().starts_with("17.4"));
        assert!(!info.is_bot);
    }

    #[test]
    fn test_android() {
        let info = parse_device(ANDROID_CHROME);
        assert_eq!(info.platform, Platform::Android);
        assert_eq!(info.browser, "Chrome");
        assert!(info.os_version.as_deref().unwrap().starts_with("14"));
    }

    #[test]
    fn test_desktop_is_web() {
        let info = parse_device(DESKTOP_FIREFOX);
        assert_eq!(info.platform, Platform::Web);
        assert_eq!(info.browser, "Firefox");
    }

    #[test]
    fn test_in_app_webview_fallback() {
        let info = parse_device("SomeApp/3.2 (iPhone; CPU iPhone OS 16_1 like Mac OS X)");
        assert_eq!(info.platform, Platform::Ios);
        assert_eq!(info.os_version.as_deref(), Some("16.1"));
    }

    #[test]
    fn test_crawler() {
        assert!(parse_device(GOOGLEBOT).is_bot);
        assert_eq!(parse_device("").platform, Platform::Web);
    }
}
