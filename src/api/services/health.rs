use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use tracing::trace;

use crate::attribution::AttributionEngine;

// 应用启动时间结构体
#[derive(Clone, Debug)]
pub struct AppStartTime {
    pub start_datetime: chrono::DateTime<chrono::Utc>,
}

impl AppStartTime {
    pub fn now() -> Self {
        Self {
            start_datetime: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    /// 运行秒数
    pub uptime: u64,
    pub pending_writes: usize,
}

pub struct HealthService;

impl HealthService {
    pub async fn health_check(
        engine: web::Data<AttributionEngine>,
        app_start_time: web::Data<AppStartTime>,
    ) -> impl Responder {
        trace!("Received health check request");

        let uptime = (chrono::Utc::now() - app_start_time.start_datetime)
            .num_seconds()
            .max(0) as u64;
        let pending_writes = engine.pending().len();

        // 有积压写入说明存储曾经或正在不可用
        let status = if pending_writes == 0 { "ok" } else { "degraded" };

        HttpResponse::Ok()
            .insert_header(("Cache-Control", "no-store"))
            .json(HealthResponse {
                status,
                backend: engine.stores().events.backend_name(),
                uptime,
                pending_writes,
            })
    }
}

/// Health 路由配置
pub fn health_routes() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::get().to(HealthService::health_check))
        .route("", web::head().to(HealthService::health_check))
}
