//! 后台补偿匹配
//!
//! 处理同步路径超时、失败或从重试队列补写的 open。每个 CAS 都是独立原子操作，
//! 中途取消不会留下半条归因记录。

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::attribution::matcher::FingerprintMatcher;
use crate::attribution::pending::PendingWrites;
use crate::config::SweepConfig;
use crate::errors::Result;
use crate::storage::models::TimeRange;
use crate::storage::traits::EventStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// CAS 持续冲突，留给下一轮
    pub deferred: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct AttributionSweep {
    events: Arc<dyn EventStore>,
    matcher: FingerprintMatcher,
    interval: std::time::Duration,
    batch_size: u64,
    grace: Duration,
    /// 下一批的起点（微秒时间戳），0 表示从最早的 open 开始
    cursor: Arc<AtomicI64>,
    pending: Option<PendingWrites>,
}

impl AttributionSweep {
    pub fn new(events: Arc<dyn EventStore>, matcher: FingerprintMatcher, config: &SweepConfig) -> Self {
        Self {
            events,
            matcher,
            interval: std::time::Duration::from_secs(config.interval_secs.max(1)),
            batch_size: config.batch_size.max(1),
            grace: Duration::seconds(config.grace_secs as i64),
            cursor: Arc::new(AtomicI64::new(0)),
            pending: None,
        }
    }

    /// 重试队列中仍有点击时跳过本轮，等点击落库后再匹配
    pub fn with_pending(mut self, pending: PendingWrites) -> Self {
        self.pending = Some(pending);
        self
    }

    /// One batch of unattributed opens
    pub async fn run_once(&self) -> Result<SweepReport> {
        self.sweep(None).await
    }

    /// Loops until `shutdown` turns `true` (or its sender is dropped)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Attribution sweep started (interval {:?}, batch {})",
            self.interval, self.batch_size
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            match self.sweep(Some(&shutdown)).await {
                Ok(report) if report.scanned > 0 => info!("Sweep finished: {:?}", report),
                Ok(_) => trace!("Sweep: nothing to do"),
                Err(e) => warn!("Sweep batch failed: {}", e),
            }
        }
        info!("Attribution sweep stopped");
    }

    async fn sweep(&self, shutdown: Option<&watch::Receiver<bool>>) -> Result<SweepReport> {
        if self.pending.as_ref().is_some_and(PendingWrites::has_queued_clicks) {
            debug!("Sweep skipped: clicks still waiting in the retry queue");
            return Ok(SweepReport::default());
        }

        let end = Utc::now() - self.grace;
        let start = DateTime::<Utc>::from_timestamp_micros(self.cursor.load(Ordering::Relaxed))
            .filter(|start| *start < end)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let opens = self
            .events
            .unattributed_opens(TimeRange::new(start, end), self.batch_size)
            .await?;

        // 整批都取满时下一轮从其后继续，避免反复失败的 open 占住批次；
        // 取不满说明已到末尾，回到最早处
        let next = match opens.last() {
            Some(last) if opens.len() as u64 >= self.batch_size => {
                last.created_at.timestamp_micros() + 1
            }
            _ => 0,
        };
        self.cursor.store(next, Ordering::Relaxed);

        let mut report = SweepReport::default();
        for open in opens {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                debug!("Sweep interrupted by shutdown after {} opens", report.scanned);
                break;
            }
            report.scanned += 1;

            match self.matcher.match_open(&open).await {
                Ok(Some(link)) if link.is_matched() => report.matched += 1,
                Ok(Some(_)) => report.unmatched += 1,
                Ok(None) => report.deferred += 1,
                Err(e) => {
                    warn!("Sweep: matching open {} failed: {}", open.id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributionConfig, FraudConfig};
    use crate::storage::Stores;
    use crate::storage::memory::{MemoryEventStore, MemoryLinkStore};
    use crate::storage::models::{ClickEvent, OpenEvent, Platform, ResolutionOutcome};

    fn click(at: DateTime<Utc>) -> ClickEvent {
        ClickEvent {
            id: "c1".into(),
            dedup_key: "c1".into(),
            link_id: "promo".into(),
            platform: Platform::Android,
            browser: "Chrome".into(),
            user_agent: "ua".into(),
            ip_address: None,
            country: None,
            state: None,
            city: None,
            fingerprint: "fp".into(),
            outcome: ResolutionOutcome::AppInstallPrompt,
            deep_path: None,
            classifier_degraded: false,
            created_at: at,
        }
    }

    fn open(id: &str, at: DateTime<Utc>) -> OpenEvent {
        OpenEvent {
            id: id.into(),
            dedup_key: id.into(),
            device_id: None,
            platform: Platform::Android,
            os_version: None,
            browser: "unknown".into(),
            user_agent: String::new(),
            ip_address: None,
            country: None,
            state: None,
            city: None,
            fingerprint: "fp".into(),
            deep_path: None,
            success: true,
            classifier_degraded: false,
            created_at: at,
        }
    }

    fn sweep(events: Arc<MemoryEventStore>) -> AttributionSweep {
        let stores = Stores {
            events: events.clone(),
            links: Arc::new(MemoryLinkStore::new()),
        };
        let matcher = FingerprintMatcher::new(
            &stores,
            &AttributionConfig::default(),
            &FraudConfig::default(),
        );
        AttributionSweep::new(events, matcher, &SweepConfig::default())
    }

    #[tokio::test]
    async fn test_sweep_matches_then_is_noop() {
        let events = Arc::new(MemoryEventStore::new());
        let now = Utc::now();
        events.insert_click(&click(now - Duration::hours(1))).await.unwrap();
        events.insert_open(&open("o1", now - Duration::minutes(1))).await.unwrap();
        events.insert_open(&open("o2", now - Duration::seconds(30))).await.unwrap();
        // grace 期内的 open 不处理
        events.insert_open(&open("fresh", now)).await.unwrap();

        let sweep = sweep(events.clone());
        let report = sweep.run_once().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched, 1);

        let again = sweep.run_once().await.unwrap();
        assert_eq!(again, SweepReport::default());
        assert_eq!(events.attribution_count(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let events = Arc::new(MemoryEventStore::new());
        let sweep = sweep(events);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { sweep.run(rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("sweep did not stop")
            .unwrap();
    }
}
