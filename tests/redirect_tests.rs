//! HTTP surface tests
//!
//! Click redirect, SDK open report and health endpoints through the full
//! actix-web app (routes + request-id middleware).

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use serde_json::{Value, json};

use deeplinker::api;
use deeplinker::api::middleware::RequestIdMiddleware;
use deeplinker::api::services::AppStartTime;
use deeplinker::attribution::AttributionEngine;
use deeplinker::classifier::Classifier;
use deeplinker::config::StaticConfig;
use deeplinker::storage::{Link, LinkStore, MemoryEventStore, MemoryLinkStore, Stores};

const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
const DESKTOP: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0";

// =============================================================================
// Test Setup
// =============================================================================

async fn engine() -> (AttributionEngine, Arc<MemoryEventStore>) {
    let events = Arc::new(MemoryEventStore::new());
    let links = Arc::new(MemoryLinkStore::new());
    links
        .upsert_link(&Link {
            web_url: Some("https://example.com/promo".into()),
            ios_store_url: Some("https://apps.apple.com/app/id1".into()),
            ios_app_url: Some("myapp://".into()),
            deep_path: Some("/product/42".into()),
            campaign: Some("spring".into()),
            ..Link::new("promo")
        })
        .await
        .unwrap();
    links
        .upsert_link(&Link {
            ios_store_url: Some("https://apps.apple.com/app/id1".into()),
            android_store_url: Some("https://play.google.com/store/apps/details?id=com.example".into()),
            ..Link::new("apponly")
        })
        .await
        .unwrap();

    let stores = Stores {
        events: events.clone(),
        links,
    };
    let engine = AttributionEngine::with_classifier(
        &StaticConfig::default(),
        stores,
        Classifier::device_only(),
    );
    (engine, events)
}

macro_rules! app {
    ($engine:expr) => {
        test::init_service(
            App::new()
                .wrap(RequestIdMiddleware)
                .app_data(web::Data::new($engine))
                .app_data(web::Data::new(AppStartTime::now()))
                .configure(api::configure),
        )
        .await
    };
}

// =============================================================================
// Click redirect
// =============================================================================

#[actix_web::test]
async fn test_mobile_click_redirects_to_store() {
    let (engine, events) = engine().await;
    let app = app!(engine);

    let req = TestRequest::get()
        .uri("/promo")
        .insert_header(("User-Agent", IPHONE))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers().get("Location").unwrap().to_str().unwrap();
    assert!(location.starts_with("https://apps.apple.com/app/id1?dl_click="));
    assert_eq!(resp.headers().get("Cache-Control").unwrap(), "no-store");
    assert_eq!(
        resp.headers().get("X-Deeplink-State").unwrap(),
        "app_install_prompt"
    );
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(events.click_count(), 1);
}

#[actix_web::test]
async fn test_acknowledged_click_opens_app() {
    let (engine, _) = engine().await;
    let app = app!(engine);

    let req = TestRequest::get()
        .uri("/promo?dl_ack=1")
        .insert_header(("User-Agent", IPHONE))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get("Location").unwrap(),
        "myapp://product/42"
    );

    let req = TestRequest::get()
        .uri("/promo")
        .insert_header(("User-Agent", IPHONE))
        .insert_header(("X-Deeplink-Capable", "1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.headers().get("X-Deeplink-State").unwrap(),
        "deep_link_delivered"
    );
}

#[actix_web::test]
async fn test_desktop_click_on_app_only_link_gets_html() {
    let (engine, _) = engine().await;
    let app = app!(engine);

    let req = TestRequest::get()
        .uri("/apponly")
        .insert_header(("User-Agent", DESKTOP))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("X-Deeplink-State").unwrap(),
        "web_fallback"
    );
    let body = test::read_body(resp).await;
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("https://apps.apple.com/app/id1"));
    assert!(body.contains("Google Play"));
}

#[actix_web::test]
async fn test_retried_click_with_request_id_is_recorded_once() {
    let (engine, events) = engine().await;
    let app = app!(engine);

    let mut locations = Vec::new();
    for _ in 0..2 {
        let req = TestRequest::get()
            .uri("/promo")
            .insert_header(("User-Agent", IPHONE))
            .insert_header(("X-Request-Id", "click-retry-1"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.headers().get("x-request-id").unwrap(), "click-retry-1");
        locations.push(resp.headers().get("Location").unwrap().clone());
    }

    assert_eq!(locations[0], locations[1]);
    assert_eq!(events.click_count(), 1);
}

#[actix_web::test]
async fn test_unknown_code_is_404_without_event() {
    let (engine, events) = engine().await;
    let app = app!(engine);

    let req = TestRequest::get()
        .uri("/missing")
        .insert_header(("User-Agent", IPHONE))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(events.click_count(), 0);
}

#[actix_web::test]
async fn test_missing_user_agent_is_400() {
    let (engine, events) = engine().await;
    let app = app!(engine);

    let resp = test::call_service(&app, TestRequest::get().uri("/promo").to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("User-Agent"));
    assert_eq!(events.click_count(), 0);
}

// =============================================================================
// Open report
// =============================================================================

#[actix_web::test]
async fn test_click_then_open_over_http() {
    let (engine, _) = engine().await;
    let app = app!(engine);

    let req = TestRequest::get()
        .uri("/promo")
        .insert_header(("User-Agent", IPHONE))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let req = TestRequest::post()
        .uri("/v1/open")
        .set_json(json!({
            "eventId": "install-1",
            "deviceId": "idfv-1",
            "OSVersion": "17.4",
            "success": true,
            "platform": "ios",
            "clientSignals": {}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("Cache-Control").unwrap(), "no-store");

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "matched");
    assert_eq!(body["confidence"], "exact");
    assert_eq!(body["deepPath"], "/product/42");
    assert_eq!(body["linkId"], "promo");
    assert_eq!(body["campaign"], "spring");
    assert!(body["clickEventId"].is_string());
}

#[actix_web::test]
async fn test_open_without_platform_is_400() {
    let (engine, events) = engine().await;
    let app = app!(engine);

    let req = TestRequest::post()
        .uri("/v1/open")
        .set_json(json!({ "deviceId": "idfv-1", "success": true }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(events.open_count(), 0);
}

// =============================================================================
// Health
// =============================================================================

#[actix_web::test]
async fn test_health() {
    let (engine, _) = engine().await;
    let app = app!(engine);

    let resp = test::call_service(&app, TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["pendingWrites"], 0);
    assert!(body["uptime"].is_u64());
}
