use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::attribution::PendingWrites;

/// 关闭超时时间（秒）
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 单个任务超时时间（秒）
const TASK_TIMEOUT_SECS: u64 = 10;

/// 等待 Ctrl+C 信号
pub async fn listen_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping server...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }
}

/// 先停止 HTTP 服务（等待进行中的请求结束），再停 sweep 并刷新重试队列
pub async fn graceful_stop<F>(
    stop_server: F,
    shutdown_tx: &watch::Sender<bool>,
    pending: &PendingWrites,
) where
    F: Future<Output = ()>,
{
    stop_server.await;

    let shutdown_result = timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        perform_shutdown_tasks(shutdown_tx, pending),
    )
    .await;

    match shutdown_result {
        Ok(()) => info!("All shutdown tasks completed successfully"),
        Err(_) => error!(
            "Shutdown tasks timed out after {} seconds, {} events lost",
            SHUTDOWN_TIMEOUT_SECS,
            pending.len()
        ),
    }
}

/// 执行所有关闭任务（在超时内调用）
pub async fn perform_shutdown_tasks(shutdown_tx: &watch::Sender<bool>, pending: &PendingWrites) {
    // 停止 sweep；接收端已退出时发送失败可以忽略
    let _ = shutdown_tx.send(true);

    if pending.is_empty() {
        info!("Retry queue is empty, nothing to flush");
        return;
    }

    match timeout(Duration::from_secs(TASK_TIMEOUT_SECS), pending.flush()).await {
        Ok(report) if report.restored == 0 => {
            info!("Retry queue flushed: {} events written", report.written);
        }
        Ok(report) => {
            error!(
                target: "deeplinker::alert",
                "Event store still unavailable at shutdown, {} events lost",
                report.restored
            );
        }
        Err(_) => {
            error!(
                "Retry queue flush timed out after {} seconds",
                TASK_TIMEOUT_SECS
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::config::RetryQueueConfig;
    use crate::storage::memory::MemoryEventStore;
    use crate::storage::models::{ClickEvent, Platform, ResolutionOutcome};

    fn click(id: &str) -> ClickEvent {
        ClickEvent {
            id: id.into(),
            dedup_key: id.into(),
            link_id: "promo".into(),
            platform: Platform::Ios,
            browser: "Safari".into(),
            user_agent: "ua".into(),
            ip_address: None,
            country: None,
            state: None,
            city: None,
            fingerprint: "fp".into(),
            outcome: ResolutionOutcome::AppInstallPrompt,
            deep_path: None,
            classifier_degraded: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_events_queued_while_draining_are_flushed() {
        let events = Arc::new(MemoryEventStore::new());
        let pending = PendingWrites::new(events.clone(), &RetryQueueConfig::default());
        let (tx, rx) = watch::channel(false);

        // 服务停止期间仍在处理的请求写入了队列
        let in_flight = async {
            pending.enqueue_click(click("late"));
        };
        graceful_stop(in_flight, &tx, &pending).await;

        assert!(*rx.borrow());
        assert!(pending.is_empty());
        assert_eq!(events.click_count(), 1);
    }
}
