//! Server mode
//!
//! Configures and starts the HTTP server with all routes, then waits for
//! either the server to exit or a shutdown signal.

use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api;
use crate::api::middleware::RequestIdMiddleware;
use crate::api::services::AppStartTime;
use crate::config::StaticConfig;
use crate::system::lifetime;

/// Run the HTTP server
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server(config: &StaticConfig) -> Result<()> {
    let app_start_time = AppStartTime::now();

    let startup = lifetime::startup::prepare_server_startup(config)
        .await
        .inspect_err(|e| tracing::error!("Server startup failed: {:#}", e))?;

    let engine = web::Data::new(startup.engine.clone());
    let cpu_count = config.server.cpu_count.clamp(1, 32);
    warn!("Using {} CPU cores for the server", cpu_count);

    if config.server.trusted_proxies.is_empty() {
        warn!(
            "Client IP: auto-detect mode. Connections from private IPs will use X-Forwarded-For. \
             Configure server.trusted_proxies explicitly to disable."
        );
    } else {
        info!(
            "Client IP: trusted proxies configured: {:?}",
            config.server.trusted_proxies
        );
    }

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestIdMiddleware)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("Connection", "keep-alive"))
                    .add(("Keep-Alive", "timeout=30, max=1000")),
            )
            .app_data(engine.clone())
            .app_data(web::Data::new(app_start_time.clone()))
            .configure(api::configure)
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .client_request_timeout(std::time::Duration::from_millis(5000))
    .client_disconnect_timeout(std::time::Duration::from_millis(1000))
    .workers(cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    warn!("Starting server at http://{}", bind_address);
    let server = server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .disable_signals()
        .run();
    let handle = server.handle();

    // Wait for server or shutdown signal
    tokio::select! {
        res = server => {
            res.context("HTTP server exited with error")?;
            lifetime::shutdown::perform_shutdown_tasks(&startup.shutdown_tx, startup.pending()).await;
        }
        _ = lifetime::shutdown::listen_for_shutdown() => {
            lifetime::shutdown::graceful_stop(
                handle.stop(true),
                &startup.shutdown_tx,
                startup.pending(),
            )
            .await;
            warn!("Graceful shutdown: all tasks completed");
        }
    }

    for task in &startup.background {
        task.abort();
    }
    Ok(())
}
