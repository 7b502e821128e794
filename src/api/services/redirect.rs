use std::borrow::Cow;

use actix_web::http::StatusCode;
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Responder, web};
use tracing::{debug, error, trace};

use crate::api::middleware::RequestId;
use crate::attribution::{AttributionEngine, ClickRequest, RedirectDecision};
use crate::config::get_config;
use crate::errors::DeeplinkError;
use crate::fingerprint::ClientSignals;
use crate::resolution::Target;
use crate::utils::ip::extract_client_ip;
use crate::utils::is_valid_link_code;

/// 客户端确认可直接打开 App 的标记
const DEEP_LINK_ACK_PARAM: &str = "dl_ack";
const DEEP_LINK_CAPABLE_HEADER: &str = "x-deeplink-capable";

pub struct RedirectService;

impl RedirectService {
    pub async fn handle_redirect(
        req: HttpRequest,
        path: web::Path<String>,
        engine: web::Data<AttributionEngine>,
    ) -> impl Responder {
        let code = path.into_inner();

        if !is_valid_link_code(&code) {
            // 非法短码，直接 404（不查存储）
            trace!("Invalid link code rejected: {}", code);
            return Self::not_found_response();
        }

        let click = Self::click_request(&req, code, &engine);
        let link_code = click.link_code.clone();
        match engine.record_click(click).await {
            Ok(decision) => Self::finish_redirect(decision),
            Err(DeeplinkError::NotFound(_)) => {
                debug!("Redirect link not found: {}", link_code);
                Self::not_found_response()
            }
            Err(e @ DeeplinkError::Validation(_)) => e.error_response(),
            Err(e) => {
                error!("Click on {} failed: {}", link_code, e);
                e.error_response()
            }
        }
    }

    fn click_request(
        req: &HttpRequest,
        link_code: String,
        engine: &AttributionEngine,
    ) -> ClickRequest {
        let config = get_config();
        let query = req.uri().query().unwrap_or_default();

        let user_agent = req
            .headers()
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(String::from);

        let request_id = req
            .extensions()
            .get::<RequestId>()
            .filter(|r| r.client_supplied)
            .map(|r| r.id.clone());

        let header_ack = req
            .headers()
            .get(DEEP_LINK_CAPABLE_HEADER)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|v| v.trim() == "1");
        let query_ack =
            Self::extract_query_param(query, DEEP_LINK_ACK_PARAM).is_some_and(|v| v == "1");

        let mut signals = ClientSignals::new();
        for key in engine.deriver().signal_keys() {
            if let Some(value) = Self::extract_query_param(query, key) {
                signals.insert(key.to_string(), serde_json::Value::String(value.into_owned()));
            }
        }

        ClickRequest {
            link_code,
            user_agent,
            client_ip: extract_client_ip(req, &config.server.trusted_proxies),
            deep_link_capable: header_ack || query_ack,
            request_id,
            signals,
        }
    }

    /// 从 query string 提取指定参数值
    #[inline]
    fn extract_query_param<'a>(query: &'a str, key: &str) -> Option<Cow<'a, str>> {
        for part in query.split('&') {
            if let Some(value) = part.strip_prefix(key).and_then(|s| s.strip_prefix('=')) {
                // urlencoding::decode 返回 Cow，未编码时零分配
                return urlencoding::decode(value).ok();
            }
        }
        None
    }

    fn finish_redirect(decision: RedirectDecision) -> HttpResponse {
        let mut builder = HttpResponse::build(
            StatusCode::from_u16(decision.status).unwrap_or(StatusCode::FOUND),
        );
        builder
            .insert_header(("Cache-Control", "no-store"))
            .insert_header(("X-Deeplink-State", decision.state.as_ref()));

        match decision.target {
            Target::Redirect(location) => builder.insert_header(("Location", location)).finish(),
            Target::Html(body) => builder
                .insert_header(("Content-Type", "text/html; charset=utf-8"))
                .body(body),
        }
    }

    #[inline]
    fn not_found_response() -> HttpResponse {
        HttpResponse::build(StatusCode::NOT_FOUND)
            .insert_header(("Content-Type", "text/html; charset=utf-8"))
            .insert_header(("Cache-Control", "public, max-age=60"))
            .body("Not Found")
    }
}

/// Redirect 路由配置
pub fn redirect_routes() -> actix_web::Scope {
    web::scope("")
        .route("/{code}", web::get().to(RedirectService::handle_redirect))
        .route("/{code}", web::head().to(RedirectService::handle_redirect))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_query_param() {
        let q = "dl_ack=1&screen=1170x2532&tz=Europe%2FBerlin";
        assert_eq!(
            RedirectService::extract_query_param(q, "tz").as_deref(),
            Some("Europe/Berlin")
        );
        assert_eq!(
            RedirectService::extract_query_param(q, "dl_ack").as_deref(),
            Some("1")
        );
        assert!(RedirectService::extract_query_param(q, "missing").is_none());
    }
}
