//! 写失败重试队列
//!
//! 事件存储不可用时，点击/打开事件先进入内存缓冲，由后台任务定期重放。
//! 重放依赖存储端按 dedup_key 幂等，重复写入视为成功。
//! 进程退出前由 shutdown 调用 [`PendingWrites::flush`] 做最后一次重放。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, trace, warn};

use crate::config::RetryQueueConfig;
use crate::errors::Result;
use crate::storage::models::{ClickEvent, InsertOutcome, OpenEvent};
use crate::storage::traits::EventStore;

#[derive(Debug, Clone, PartialEq)]
pub enum PendingEvent {
    Click(ClickEvent),
    Open(OpenEvent),
}

impl PendingEvent {
    fn key(&self) -> String {
        match self {
            PendingEvent::Click(c) => format!("click:{}", c.dedup_key),
            PendingEvent::Open(o) => format!("open:{}", o.dedup_key),
        }
    }

    /// 点击先于打开写入，保证 sweep 能看到对应点击
    fn order(&self) -> (u8, chrono::DateTime<chrono::Utc>) {
        match self {
            PendingEvent::Click(c) => (0, c.created_at),
            PendingEvent::Open(o) => (1, o.created_at),
        }
    }

    async fn write(&self, store: &dyn EventStore) -> Result<InsertOutcome> {
        match self {
            PendingEvent::Click(c) => store.insert_click(c).await,
            PendingEvent::Open(o) => store.insert_open(o).await,
        }
    }
}

/// Outcome of one replay pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub restored: usize,
    pub discarded: usize,
}

struct PendingBuffer {
    data: DashMap<String, PendingEvent>,
    /// 刷盘锁，防止并发重放
    flush_lock: Mutex<()>,
    dropped: AtomicU64,
}

impl PendingBuffer {
    fn new() -> Self {
        Self {
            data: DashMap::new(),
            flush_lock: Mutex::new(()),
            dropped: AtomicU64::new(0),
        }
    }

    /// 逐个 remove snapshot 中的 key，不影响窗口期新增
    fn drain(&self) -> Vec<PendingEvent> {
        let keys: Vec<String> = self.data.iter().map(|r| r.key().clone()).collect();
        let mut events = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, event)) = self.data.remove(&key) {
                events.push(event);
            }
        }
        events
    }

    /// 放回缓冲区；窗口期内同 key 的新条目优先
    fn restore(&self, events: Vec<PendingEvent>) {
        for event in events {
            self.data.entry(event.key()).or_insert(event);
        }
    }
}

/// Write-behind queue for events the store could not accept
#[derive(Clone)]
pub struct PendingWrites {
    buffer: Arc<PendingBuffer>,
    store: Arc<dyn EventStore>,
    flush_interval: Duration,
    max_pending: usize,
}

impl PendingWrites {
    pub fn new(store: Arc<dyn EventStore>, config: &RetryQueueConfig) -> Self {
        Self {
            buffer: Arc::new(PendingBuffer::new()),
            store,
            flush_interval: Duration::from_secs(config.flush_interval_secs.max(1)),
            max_pending: config.max_pending,
        }
    }

    pub fn enqueue_click(&self, event: ClickEvent) -> bool {
        self.enqueue(PendingEvent::Click(event))
    }

    pub fn enqueue_open(&self, event: OpenEvent) -> bool {
        self.enqueue(PendingEvent::Open(event))
    }

    /// Returns `false` when the queue is full and the event was dropped
    fn enqueue(&self, event: PendingEvent) -> bool {
        let key = event.key();
        if !self.buffer.data.contains_key(&key) && self.buffer.data.len() >= self.max_pending {
            let dropped = self.buffer.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            error!(
                target: "deeplinker::alert",
                "Retry queue full ({} pending), dropping {} (dropped so far: {})",
                self.max_pending, key, dropped
            );
            return false;
        }

        self.buffer.data.insert(key.clone(), event);
        warn!(
            target: "deeplinker::alert",
            "Event store unavailable, {} queued for retry ({} pending)",
            key,
            self.buffer.data.len()
        );
        true
    }

    pub fn len(&self) -> usize {
        self.buffer.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.data.is_empty()
    }

    /// 队列里还有未落库的点击（含正在重放的批次）
    ///
    /// 此时匹配可能看不到对应点击，调用方应推迟提交最终归因。
    pub fn has_queued_clicks(&self) -> bool {
        self.buffer.flush_lock.try_lock().is_err()
            || self
                .buffer
                .data
                .iter()
                .any(|entry| matches!(entry.value(), PendingEvent::Click(_)))
    }

    pub fn dropped(&self) -> u64 {
        self.buffer.dropped.load(Ordering::Relaxed)
    }

    /// 启动后台重放任务
    pub async fn start_background_task(&self) {
        loop {
            sleep(self.flush_interval).await;

            if self.is_empty() {
                continue;
            }
            if let Ok(_guard) = self.buffer.flush_lock.try_lock() {
                trace!("PendingWrites: starting scheduled replay");
                Self::flush_buffer(&self.buffer, self.store.as_ref()).await;
            } else {
                trace!("PendingWrites: replay already in progress, skipping");
            }
        }
    }

    /// 手动重放（阻塞直到完成）
    pub async fn flush(&self) -> FlushReport {
        debug!("PendingWrites: manual flush triggered");
        let _guard = self.buffer.flush_lock.lock().await;
        Self::flush_buffer(&self.buffer, self.store.as_ref()).await
    }

    async fn flush_buffer(buffer: &PendingBuffer, store: &dyn EventStore) -> FlushReport {
        let mut events = buffer.drain();
        let mut report = FlushReport::default();
        if events.is_empty() {
            return report;
        }
        events.sort_by_key(PendingEvent::order);

        let mut failed = Vec::new();
        let mut iter = events.into_iter();
        while let Some(event) = iter.next() {
            match event.write(store).await {
                Ok(_) => report.written += 1,
                Err(e) if e.is_store_unavailable() => {
                    // 存储仍不可用，剩余事件原样放回
                    warn!("PendingWrites: replay failed: {}", e);
                    failed.push(event);
                    failed.extend(iter);
                    break;
                }
                Err(e) => {
                    error!(
                        target: "deeplinker::alert",
                        "PendingWrites: discarding {} after non-retryable error: {}",
                        event.key(),
                        e
                    );
                    report.discarded += 1;
                }
            }
        }

        report.restored = failed.len();
        if !failed.is_empty() {
            buffer.restore(failed);
        }

        debug!(
            "PendingWrites: replayed {} events, {} restored, {} discarded",
            report.written, report.restored, report.discarded
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeeplinkError;
    use crate::storage::memory::MemoryEventStore;
    use crate::storage::models::{
        AttributionLink, FraudFlag, LinkInsert, Platform, ResolutionOutcome, TimeRange,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;

    /// 可切换在线/离线的存储
    struct FlakyStore {
        inner: MemoryEventStore,
        offline: AtomicBool,
    }

    impl FlakyStore {
        fn new(offline: bool) -> Self {
            Self {
                inner: MemoryEventStore::new(),
                offline: AtomicBool::new(offline),
            }
        }

        fn check(&self) -> Result<()> {
            if self.offline.load(Ordering::SeqCst) {
                Err(DeeplinkError::store_unavailable("offline"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl EventStore for FlakyStore {
        async fn insert_click(&self, event: &ClickEvent) -> Result<InsertOutcome> {
            self.check()?;
            self.inner.insert_click(event).await
        }
        async fn insert_open(&self, event: &OpenEvent) -> Result<InsertOutcome> {
            self.check()?;
            self.inner.insert_open(event).await
        }
        async fn get_click(&self, id: &str) -> Result<Option<ClickEvent>> {
            self.inner.get_click(id).await
        }
        async fn get_open(&self, id: &str) -> Result<Option<OpenEvent>> {
            self.inner.get_open(id).await
        }
        async fn query_by_fingerprint(
            &self,
            fingerprint: &str,
            range: TimeRange,
        ) -> Result<Vec<ClickEvent>> {
            self.inner.query_by_fingerprint(fingerprint, range).await
        }
        async fn claimed_clicks(&self, ids: &[String]) -> Result<HashSet<String>> {
            self.inner.claimed_clicks(ids).await
        }
        async fn insert_attribution_if_absent(&self, link: &AttributionLink) -> Result<LinkInsert> {
            self.inner.insert_attribution_if_absent(link).await
        }
        async fn get_attribution(&self, id: &str) -> Result<Option<AttributionLink>> {
            self.inner.get_attribution(id).await
        }
        async fn unattributed_opens(&self, range: TimeRange, limit: u64) -> Result<Vec<OpenEvent>> {
            self.inner.unattributed_opens(range, limit).await
        }
        async fn record_fraud_flag(&self, flag: &FraudFlag) -> Result<bool> {
            self.inner.record_fraud_flag(flag).await
        }
        async fn fraud_flags(&self, fingerprint: &str) -> Result<Vec<FraudFlag>> {
            self.inner.fraud_flags(fingerprint).await
        }
        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    fn click(dedup: &str) -> ClickEvent {
        ClickEvent {
            id: format!("id-{}", dedup),
            dedup_key: dedup.to_string(),
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

    fn config(max_pending: usize) -> RetryQueueConfig {
        RetryQueueConfig {
            flush_interval_secs: 60,
            max_pending,
        }
    }

    #[tokio::test]
    async fn test_replay_after_recovery() {
        let store = Arc::new(FlakyStore::new(true));
        let queue = PendingWrites::new(store.clone(), &config(10));

        assert!(queue.enqueue_click(click("a")));
        assert!(queue.enqueue_click(click("b")));
        // 同一 dedup_key 只保留一份
        assert!(queue.enqueue_click(click("a")));
        assert_eq!(queue.len(), 2);

        let report = queue.flush().await;
        assert_eq!(report.restored, 2);
        assert_eq!(queue.len(), 2);

        store.offline.store(false, Ordering::SeqCst);
        let report = queue.flush().await;
        assert_eq!(report.written, 2);
        assert!(queue.is_empty());
        assert_eq!(store.inner.click_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_replay_counts_as_written() {
        let store = Arc::new(FlakyStore::new(false));
        store.inner.insert_click(&click("a")).await.unwrap();

        let queue = PendingWrites::new(store.clone(), &config(10));
        queue.enqueue_click(click("a"));
        let report = queue.flush().await;
        assert_eq!(report.written, 1);
        assert_eq!(store.inner.click_count(), 1);
    }

    #[tokio::test]
    async fn test_overflow_drops_and_counts() {
        let store = Arc::new(FlakyStore::new(true));
        let queue = PendingWrites::new(store, &config(1));

        assert!(queue.enqueue_click(click("a")));
        assert!(!queue.enqueue_click(click("b")));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped(), 1);
    }

    #[tokio::test]
    async fn test_has_queued_clicks() {
        let store = Arc::new(FlakyStore::new(false));
        let queue = PendingWrites::new(store, &config(10));
        assert!(!queue.has_queued_clicks());

        queue.enqueue_click(click("a"));
        assert!(queue.has_queued_clicks());

        queue.flush().await;
        assert!(!queue.has_queued_clicks());
    }
}
