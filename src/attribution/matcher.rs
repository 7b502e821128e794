//! Fingerprint matcher
//!
//! Given an open, finds the best unclaimed click for the same fingerprint
//! inside the attribution window and commits the pairing with the store's
//! compare-and-set insert. No lock is held across store queries; a lost race
//! surfaces as `ClickAlreadyClaimed` and selection simply re-runs.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, trace, warn};

use crate::attribution::fraud::FraudGuard;
use crate::config::{AttributionConfig, FraudConfig};
use crate::errors::Result;
use crate::storage::Stores;
use crate::storage::models::{
    AttributionLink, ClickEvent, LinkInsert, MatchConfidence, OpenEvent, ResolutionOutcome,
    TimeRange, region_of,
};
use crate::storage::traits::{EventStore, LinkStore};

/// CAS 重试上限，超过后交给 sweep
const MAX_CLAIM_ATTEMPTS: usize = 16;
const MIN_PROBABILISTIC_SCORE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Exact(String),
    Probabilistic(String, f64),
    Unmatched,
    FraudExcluded,
}

impl MatchOutcome {
    pub fn click_id(&self) -> Option<&str> {
        match self {
            MatchOutcome::Exact(id) | MatchOutcome::Probabilistic(id, _) => Some(id),
            _ => None,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            MatchOutcome::Exact(_) => 1.0,
            MatchOutcome::Probabilistic(_, score) => *score,
            _ => 0.0,
        }
    }

    pub fn confidence(&self) -> MatchConfidence {
        match self {
            MatchOutcome::Exact(_) => MatchConfidence::Exact,
            MatchOutcome::Probabilistic(..) => MatchConfidence::Probabilistic,
            _ => MatchConfidence::NoMatch,
        }
    }
}

/// Pick the best of `candidates` for `open`.
///
/// Candidates must already be eligible (same fingerprint, inside the window,
/// unclaimed). Ties are broken by coarse region, then the most recent click,
/// then the smaller click id.
pub fn select_match(open: &OpenEvent, candidates: &[ClickEvent]) -> MatchOutcome {
    match candidates {
        [] => return MatchOutcome::Unmatched,
        [only] => return MatchOutcome::Exact(only.id.clone()),
        _ => {}
    }

    let mut pool: Vec<&ClickEvent> = Vec::new();
    let mut narrowed = false;
    if let Some(region) = region_of(&open.country, &open.state) {
        pool = candidates
            .iter()
            .filter(|c| region_of(&c.country, &c.state).as_ref() == Some(&region))
            .collect();
        narrowed = !pool.is_empty();
    }
    if pool.is_empty() {
        pool = candidates.iter().collect();
    }

    let best = pool.iter().copied().max_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            // 时间相同时 id 较小者胜出
            .then_with(|| b.id.cmp(&a.id))
    });

    match best {
        Some(click) => {
            let base = if narrowed { 0.9 } else { 0.6 };
            let score = (base / pool.len() as f64).max(MIN_PROBABILISTIC_SCORE);
            MatchOutcome::Probabilistic(click.id.clone(), score)
        }
        None => MatchOutcome::Unmatched,
    }
}

#[derive(Clone)]
pub struct FingerprintMatcher {
    events: Arc<dyn EventStore>,
    links: Arc<dyn LinkStore>,
    window: Duration,
    guard: FraudGuard,
}

impl FingerprintMatcher {
    pub fn new(stores: &Stores, attribution: &AttributionConfig, fraud: &FraudConfig) -> Self {
        Self {
            events: stores.events.clone(),
            links: stores.links.clone(),
            window: Duration::seconds(attribution.window_secs as i64),
            guard: FraudGuard::new(fraud),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Attribute `open`, writing exactly one AttributionLink for it.
    ///
    /// Returns the link now stored for the open (possibly one written by a
    /// concurrent caller), or `None` when every claim attempt lost a race and
    /// the open should be retried later.
    pub async fn match_open(&self, open: &OpenEvent) -> Result<Option<AttributionLink>> {
        if let Some(existing) = self.events.get_attribution(&open.id).await? {
            trace!("Open {} already attributed", open.id);
            return Ok(Some(existing));
        }

        let window = TimeRange::new(open.created_at - self.window, open.created_at);
        let lookback = TimeRange::new(open.created_at - self.window * 2, open.created_at);
        let clicks = self
            .events
            .query_by_fingerprint(&open.fingerprint, lookback)
            .await?;

        if self.is_fraudulent(&open.fingerprint, &clicks, &window).await? {
            info!(
                "Open {} unmatched: fingerprint {} flagged for click flooding",
                open.id, open.fingerprint
            );
            let link = self
                .build_link(open, &MatchOutcome::FraudExcluded, None, false)
                .await;
            return self.commit_final(link).await;
        }

        let eligible = |c: &&ClickEvent| {
            c.outcome != ResolutionOutcome::WebFallback && c.created_at < open.created_at
        };
        let in_window: Vec<&ClickEvent> = clicks
            .iter()
            .filter(eligible)
            .filter(|c| window.contains(c.created_at))
            .collect();
        let window_expired = in_window.is_empty()
            && clicks
                .iter()
                .filter(eligible)
                .any(|c| c.created_at < window.start);

        let ids: Vec<String> = in_window.iter().map(|c| c.id.clone()).collect();
        let claimed = if ids.is_empty() {
            Default::default()
        } else {
            self.events.claimed_clicks(&ids).await?
        };
        let mut candidates: Vec<ClickEvent> = in_window
            .into_iter()
            .filter(|c| !claimed.contains(&c.id))
            .cloned()
            .collect();

        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            let outcome = select_match(open, &candidates);
            let click = outcome
                .click_id()
                .and_then(|id| candidates.iter().find(|c| c.id == id));
            let link = self.build_link(open, &outcome, click, window_expired).await;

            match self.events.insert_attribution_if_absent(&link).await? {
                LinkInsert::Inserted => {
                    debug!(
                        "Open {} attributed: click={:?} confidence={} score={:.2}",
                        open.id, link.click_event_id, link.match_confidence, link.confidence_score
                    );
                    return Ok(Some(link));
                }
                LinkInsert::OpenAlreadyLinked => {
                    return self.events.get_attribution(&open.id).await;
                }
                LinkInsert::ClickAlreadyClaimed => {
                    debug!(
                        "Click {:?} claimed concurrently (attempt {}), reselecting for open {}",
                        link.click_event_id, attempt, open.id
                    );
                    candidates.retain(|c| Some(&c.id) != link.click_event_id.as_ref());
                }
            }
        }

        warn!(
            "Open {} still contended after {} attempts, deferring",
            open.id, MAX_CLAIM_ATTEMPTS
        );
        Ok(None)
    }

    async fn is_fraudulent(
        &self,
        fingerprint: &str,
        clicks: &[ClickEvent],
        window: &TimeRange,
    ) -> Result<bool> {
        let mut excluded = false;
        for flag in self.guard.detect(fingerprint, clicks) {
            if self.events.record_fraud_flag(&flag).await? {
                warn!(
                    target: "deeplinker::alert",
                    "Fingerprint {} flagged: {} clicks between {} and {}",
                    fingerprint, flag.click_count, flag.first_click_at, flag.last_click_at
                );
            }
            excluded |= flag.overlaps(window);
        }
        if excluded {
            return Ok(true);
        }

        let flags = self.events.fraud_flags(fingerprint).await?;
        Ok(FraudGuard::flagged_within(&flags, window))
    }

    async fn build_link(
        &self,
        open: &OpenEvent,
        outcome: &MatchOutcome,
        click: Option<&ClickEvent>,
        window_expired: bool,
    ) -> AttributionLink {
        let mut link = AttributionLink {
            click_event_id: outcome.click_id().map(str::to_string),
            match_confidence: outcome.confidence(),
            confidence_score: outcome.score(),
            ..AttributionLink::unmatched(
                &open.id,
                window_expired && *outcome == MatchOutcome::Unmatched,
                *outcome == MatchOutcome::FraudExcluded,
            )
        };

        let Some(click) = click else {
            return link;
        };
        link.link_id = Some(click.link_id.clone());
        // 活动信息只是附加字段，查不到也照常归因
        match self.links.get_link(&click.link_id).await {
            Ok(Some(l)) => {
                link.campaign = l.campaign;
                link.source = l.source;
            }
            Ok(None) => trace!("Link {} no longer exists", click.link_id),
            Err(e) => warn!("Link lookup for {} failed: {}", click.link_id, e),
        }
        link
    }

    /// 欺诈排除的 unmatched 链接：竞争失败时返回已有记录
    async fn commit_final(&self, link: AttributionLink) -> Result<Option<AttributionLink>> {
        match self.events.insert_attribution_if_absent(&link).await? {
            LinkInsert::Inserted => Ok(Some(link)),
            _ => self.events.get_attribution(&link.open_event_id).await,
        }
    }
}
