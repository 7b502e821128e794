//! Click-flood guard
//!
//! A fingerprint that produced more than `max_clicks` clicks inside any
//! `sub_window` span is treated as a bot or click farm. Its clicks stay in the
//! store for audit but are never credited.

use chrono::{DateTime, Duration, Utc};

use crate::config::FraudConfig;
use crate::storage::models::{ClickEvent, FraudFlag, TimeRange};

#[derive(Debug, Clone, Copy)]
pub struct FraudGuard {
    max_clicks: usize,
    sub_window: Duration,
}

impl FraudGuard {
    pub fn new(config: &FraudConfig) -> Self {
        Self {
            max_clicks: config.max_clicks,
            sub_window: Duration::seconds(config.sub_window_secs as i64),
        }
    }

    /// Every burst exceeding the threshold, oldest first.
    ///
    /// `clicks` must be sorted by `created_at` ascending (as returned by the
    /// event store). Each flag spans a whole burst: it keeps extending while
    /// the sliding window stays above the threshold.
    pub fn detect(&self, fingerprint: &str, clicks: &[ClickEvent]) -> Vec<FraudFlag> {
        let times: Vec<DateTime<Utc>> = clicks.iter().map(|c| c.created_at).collect();
        self.detect_times(fingerprint, &times)
    }

    fn detect_times(&self, fingerprint: &str, times: &[DateTime<Utc>]) -> Vec<FraudFlag> {
        let mut flags = Vec::new();
        if times.len() <= self.max_clicks {
            return flags;
        }

        let mut burst: Option<(usize, usize)> = None;
        let mut start = 0;
        for end in 0..times.len() {
            while times[end] - times[start] >= self.sub_window {
                start += 1;
            }
            let over = end - start + 1 > self.max_clicks;
            match (over, burst) {
                (true, None) => burst = Some((start, end)),
                (true, Some((first, _))) => burst = Some((first, end)),
                (false, Some(span)) => {
                    flags.push(self.flag(fingerprint, times, span));
                    burst = None;
                }
                (false, None) => {}
            }
        }

        if let Some(span) = burst {
            flags.push(self.flag(fingerprint, times, span));
        }
        flags
    }

    fn flag(
        &self,
        fingerprint: &str,
        times: &[DateTime<Utc>],
        (first, last): (usize, usize),
    ) -> FraudFlag {
        FraudFlag {
            fingerprint: fingerprint.to_string(),
            first_click_at: times[first],
            last_click_at: times[last],
            click_count: (last - first + 1) as u64,
            flagged_at: Utc::now(),
        }
    }

    /// Whether any persisted flag touches `range`
    pub fn flagged_within(flags: &[FraudFlag], range: &TimeRange) -> bool {
        flags.iter().any(|f| f.overlaps(range))
    }
}
