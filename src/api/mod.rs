//! HTTP surface
//!
//! - `GET|HEAD /{code}`: click resolution
//! - `POST /v1/open`: app open / install report
//! - `GET /health`

pub mod middleware;
pub mod services;

use actix_web::web;

use crate::api::services::{health_routes, open_routes, redirect_routes};

/// 注册全部路由；redirect 的 `/{code}` 通配必须最后注册
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_routes())
        .service(open_routes())
        .service(redirect_routes());
}
