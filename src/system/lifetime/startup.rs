use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::attribution::{AttributionEngine, AttributionSweep, PendingWrites};
use crate::config::StaticConfig;
use crate::storage::{StorageFactory, Stores};

/// 服务运行期间共享的组件和后台任务句柄
pub struct StartupContext {
    pub engine: AttributionEngine,
    pub stores: Stores,
    /// 置为 true 时后台 sweep 退出
    pub shutdown_tx: watch::Sender<bool>,
    pub background: Vec<JoinHandle<()>>,
}

impl StartupContext {
    pub fn pending(&self) -> &PendingWrites {
        self.engine.pending()
    }
}

/// 安装 rustls 默认加密实现（ureq / sqlx 的 TLS 连接依赖它）
pub fn install_crypto_provider() -> Result<()> {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return Ok(());
    }
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install rustls crypto provider: {:?}", e))
}

/// 连接存储并组装归因引擎
pub async fn prepare_engine(config: &StaticConfig) -> Result<(AttributionEngine, Stores)> {
    install_crypto_provider()?;

    let stores = StorageFactory::create(config)
        .await
        .context("Failed to create storage backend")?;
    let engine = AttributionEngine::new(config, stores.clone());
    Ok((engine, stores))
}

/// 准备服务器启动的上下文
/// 包括存储、归因引擎、重试队列和 sweep 后台任务
pub async fn prepare_server_startup(config: &StaticConfig) -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let (engine, stores) = prepare_engine(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    // 写失败重试队列
    let pending = engine.pending().clone();
    background.push(tokio::spawn(async move {
        pending.start_background_task().await;
    }));
    debug!(
        "PendingWrites initialized: flush every {}s, max {} events",
        config.retry_queue.flush_interval_secs, config.retry_queue.max_pending
    );

    if config.sweep.enabled {
        let sweep = AttributionSweep::new(
            stores.events.clone(),
            engine.matcher().clone(),
            &config.sweep,
        )
        .with_pending(engine.pending().clone());
        background.push(tokio::spawn(async move {
            sweep.run(shutdown_rx).await;
        }));
    } else {
        warn!("Attribution sweep is disabled; deferred opens will stay pending");
    }

    info!(
        "Attribution window {}s, fraud threshold {} clicks / {}s",
        config.attribution.window_secs, config.fraud.max_clicks, config.fraud.sub_window_secs
    );
    debug!(
        "Pre-startup processing completed in {} ms",
        start_time.elapsed().as_millis()
    );

    Ok(StartupContext {
        engine,
        stores,
        shutdown_tx,
        background,
    })
}
