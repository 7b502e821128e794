//! Resolution state machine
//!
//! ```text
//! Initial → PlatformDetected ─┬─ ServeWeb ───────────→ WebFallback
//!                             ├─ DeepLinkConfirmed ───→ DeepLinkDelivered
//!                             └─ DeepLinkUnconfirmed ─→ AppInstallPrompt
//! ```
//!
//! Transitions only move forward; each click ends in exactly one terminal state.

use tracing::warn;

use crate::errors::{DeeplinkError, Result};
use crate::storage::models::{Link, Platform, ResolutionOutcome};
use crate::utils::url_validator::{append_query_pairs, join_deep_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Initial,
    PlatformDetected(Platform),
    WebFallback,
    AppInstallPrompt,
    DeepLinkDelivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionEvent {
    DetectPlatform(Platform),
    /// 服务网页目标（web 平台，或移动端缺少 App/商店配置）
    ServeWeb,
    /// 客户端确认可以直接打开 App
    DeepLinkConfirmed,
    DeepLinkUnconfirmed,
}

impl ResolutionState {
    pub fn advance(self, event: ResolutionEvent) -> Result<ResolutionState> {
        use ResolutionEvent::*;
        use ResolutionState::*;

        match (self, event) {
            (Initial, DetectPlatform(p)) => Ok(PlatformDetected(p)),
            (PlatformDetected(_), ServeWeb) => Ok(WebFallback),
            (PlatformDetected(p), DeepLinkConfirmed) if p.is_mobile() => Ok(DeepLinkDelivered),
            (PlatformDetected(p), DeepLinkUnconfirmed) if p.is_mobile() => Ok(AppInstallPrompt),
            (state, event) => Err(DeeplinkError::invalid_transition(format!(
                "{:?} cannot handle {:?}",
                state, event
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn outcome(&self) -> Option<ResolutionOutcome> {
        match self {
            ResolutionState::WebFallback => Some(ResolutionOutcome::WebFallback),
            ResolutionState::AppInstallPrompt => Some(ResolutionOutcome::AppInstallPrompt),
            ResolutionState::DeepLinkDelivered => Some(ResolutionOutcome::DeepLinkDelivered),
            _ => None,
        }
    }
}

/// Where the click goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Redirect(String),
    /// 无网页目标的 App-only 链接
    Html(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: ResolutionOutcome,
    pub target: Target,
}

/// Per-click inputs to the state machine
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub platform: Platform,
    /// `dl_ack=1` or `X-Deeplink-Capable: 1`
    pub deep_link_capable: bool,
    pub click_id: &'a str,
    pub fingerprint: &'a str,
}

pub fn resolve(link: &Link, ctx: &ResolveContext<'_>) -> Result<Resolution> {
    let state = ResolutionState::Initial.advance(ResolutionEvent::DetectPlatform(ctx.platform))?;

    let (state, target) = match ctx.platform {
        Platform::Ios | Platform::Android => mobile(link, ctx, state)?,
        Platform::Web => (state.advance(ResolutionEvent::ServeWeb)?, web_target(link)),
    };

    let outcome = state
        .outcome()
        .ok_or_else(|| DeeplinkError::invalid_transition(format!("{:?} is not terminal", state)))?;
    Ok(Resolution { outcome, target })
}

fn mobile(
    link: &Link,
    ctx: &ResolveContext<'_>,
    state: ResolutionState,
) -> Result<(ResolutionState, Target)> {
    if ctx.deep_link_capable
        && let Some(app_url) = link.app_url(ctx.platform)
    {
        let target = join_deep_path(app_url, link.deep_path.as_deref());
        return Ok((
            state.advance(ResolutionEvent::DeepLinkConfirmed)?,
            Target::Redirect(target),
        ));
    }

    if let Some(store_url) = link.store_url(ctx.platform) {
        let target = store_target(store_url, ctx, link.deep_path.as_deref());
        return Ok((
            state.advance(ResolutionEvent::DeepLinkUnconfirmed)?,
            Target::Redirect(target),
        ));
    }

    // 未配置该平台：降级到网页
    Ok((state.advance(ResolutionEvent::ServeWeb)?, web_target(link)))
}

/// Store URL carrying the click id, fingerprint and intended deep path so the
/// app can pick them up on first launch. Google Play only forwards the
/// `referrer` parameter to the installed app, so Android gets them wrapped.
fn store_target(store_url: &str, ctx: &ResolveContext<'_>, deep_path: Option<&str>) -> String {
    let mut pairs = vec![("dl_click", ctx.click_id), ("dl_fp", ctx.fingerprint)];
    if let Some(path) = deep_path {
        pairs.push(("dl_path", path));
    }

    let result = match ctx.platform {
        Platform::Android => {
            let referrer = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter())
                .finish();
            append_query_pairs(store_url, &[("referrer", referrer.as_str())])
        }
        _ => append_query_pairs(store_url, &pairs),
    };

    result.unwrap_or_else(|e| {
        warn!("Store URL {} rejected ({}), redirecting without parameters", store_url, e);
        store_url.to_string()
    })
}

fn web_target(link: &Link) -> Target {
    match link.web_url.as_deref() {
        Some(url) => Target::Redirect(url.to_string()),
        None => Target::Html(fallback_page(link)),
    }
}

fn fallback_page(link: &Link) -> String {
    let mut items = String::new();
    for (label, url) in [
        ("App Store", link.ios_store_url.as_deref()),
        ("Google Play", link.android_store_url.as_deref()),
    ] {
        if let Some(url) = url {
            items.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>",
                escape_html(url),
                label
            ));
        }
    }

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>Open on your phone</title></head><body>\
         <h1>This link opens in our mobile app</h1>\
         <p>Open it on an iOS or Android device, or get the app:</p><ul>{}</ul>\
         </body></html>",
        items
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_link() -> Link {
        Link {
            web_url: Some("https://example.com/promo".into()),
            ios_store_url: Some("https://apps.apple.com/app/id123".into()),
            android_store_url: Some("https://play.google.com/store/apps/details?id=com.example".into()),
            ios_app_url: Some("myapp://".into()),
            android_app_url: Some("https://app.example.com/".into()),
            deep_path: Some("/product/42".into()),
            ..Link::new("promo")
        }
    }

    fn ctx(platform: Platform, capable: bool) -> ResolveContext<'static> {
        ResolveContext {
            platform,
            deep_link_capable: capable,
            click_id: "click-1",
            fingerprint: "00ff00ff00ff00ff",
        }
    }

    #[test]
    fn test_forward_transitions() {
        let s = ResolutionState::Initial
            .advance(ResolutionEvent::DetectPlatform(Platform::Ios))
            .unwrap();
        assert!(!s.is_terminal());
        let s = s.advance(ResolutionEvent::DeepLinkUnconfirmed).unwrap();
        assert_eq!(s.outcome(), Some(ResolutionOutcome::AppInstallPrompt));
    }

    #[test]
    fn test_rejects_reverse_and_skipping_transitions() {
        let terminal = ResolutionState::WebFallback;
        assert!(terminal.advance(ResolutionEvent::DetectPlatform(Platform::Web)).is_err());
        assert!(terminal.advance(ResolutionEvent::ServeWeb).is_err());
        assert!(
            ResolutionState::Initial
                .advance(ResolutionEvent::DeepLinkConfirmed)
                .is_err()
        );
        let web = ResolutionState::PlatformDetected(Platform::Web);
        assert!(matches!(
            web.advance(ResolutionEvent::DeepLinkConfirmed),
            Err(DeeplinkError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_web_click_falls_back_to_web() {
        let r = resolve(&full_link(), &ctx(Platform::Web, true)).unwrap();
        assert_eq!(r.outcome, ResolutionOutcome::WebFallback);
        assert_eq!(r.target, Target::Redirect("https://example.com/promo".into()));
    }

    #[test]
    fn test_ios_without_signal_prompts_install() {
        let r = resolve(&full_link(), &ctx(Platform::Ios, false)).unwrap();
        assert_eq!(r.outcome, ResolutionOutcome::AppInstallPrompt);
        assert_eq!(
            r.target,
            Target::Redirect(
                "https://apps.apple.com/app/id123?dl_click=click-1&dl_fp=00ff00ff00ff00ff&dl_path=%2Fproduct%2F42"
                    .into()
            )
        );
    }

    #[test]
    fn test_android_wraps_referrer() {
        let r = resolve(&full_link(), &ctx(Platform::Android, false)).unwrap();
        let Target::Redirect(url) = r.target else {
            panic!("expected redirect");
        };
        assert!(url.starts_with("https://play.google.com/store/apps/details?id=com.example&referrer="));
        assert!(url.contains("dl_click%3Dclick-1%26dl_fp%3D00ff00ff00ff00ff"));
    }

    #[test]
    fn test_capable_client_gets_deep_link() {
        let r = resolve(&full_link(), &ctx(Platform::Android, true)).unwrap();
        assert_eq!(r.outcome, ResolutionOutcome::DeepLinkDelivered);
        assert_eq!(
            r.target,
            Target::Redirect("https://app.example.com/product/42".into())
        );
    }

    #[test]
    fn test_unconfigured_platform_degrades_to_web() {
        let link = Link {
            web_url: Some("https://example.com".into()),
            ..Link::new("web-only")
        };
        let r = resolve(&link, &ctx(Platform::Ios, true)).unwrap();
        assert_eq!(r.outcome, ResolutionOutcome::WebFallback);
    }

    #[test]
    fn test_app_only_link_on_desktop_renders_page() {
        let link = Link {
            web_url: None,
            ..full_link()
        };
        let r = resolve(&link, &ctx(Platform::Web, false)).unwrap();
        assert_eq!(r.outcome, ResolutionOutcome::WebFallback);
        let Target::Html(body) = r.target else {
            panic!("expected html");
        };
        assert!(body.contains("https://apps.apple.com/app/id123"));
        assert!(body.contains("Google Play"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a\"<b>&'"), "a&quot;&lt;b&gt;&amp;&#39;");
    }
}
