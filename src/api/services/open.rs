use actix_web::{HttpRequest, HttpResponse, ResponseError, Responder, web};
use tracing::{debug, warn};

use crate::attribution::{AttributionEngine, OpenRequest};
use crate::config::get_config;
use crate::utils::ip::extract_client_ip;

pub struct OpenService;

impl OpenService {
    /// `POST /v1/open`：SDK 上报 App 打开/安装
    pub async fn record_open(
        req: HttpRequest,
        body: web::Json<OpenRequest>,
        engine: web::Data<AttributionEngine>,
    ) -> impl Responder {
        let mut open = body.into_inner();
        open.user_agent = req
            .headers()
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(String::from);
        open.client_ip = extract_client_ip(&req, &get_config().server.trusted_proxies);

        match engine.record_open(open).await {
            Ok(result) => {
                debug!("Open {} -> {:?}", result.open_event_id, result.status);
                HttpResponse::Ok()
                    .insert_header(("Cache-Control", "no-store"))
                    .json(result)
            }
            Err(e) => {
                warn!("Open report rejected: {}", e);
                e.error_response()
            }
        }
    }
}

/// SDK 路由配置
pub fn open_routes() -> actix_web::Scope {
    web::scope("/v1")
        .app_data(web::JsonConfig::default().limit(64 * 1024))
        .route("/open", web::post().to(OpenService::record_open))
}
