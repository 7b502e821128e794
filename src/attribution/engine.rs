//! Attribution engine
//!
//! Orchestrates the two ingestion paths:
//!
//! - `record_click`: classify, fingerprint, resolve, persist. Never waits on
//!   matching; a write slower than `write_timeout_ms` goes to the retry queue.
//! - `record_open`: classify, fingerprint, persist, then match with a hard
//!   time limit. Anything that goes wrong after the open is accepted is
//!   reported as `pending` and left to the sweep.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attribution::matcher::FingerprintMatcher;
use crate::attribution::pending::PendingWrites;
use crate::classifier::Classifier;
use crate::config::StaticConfig;
use crate::errors::{DeeplinkError, Result};
use crate::fingerprint::{ClientSignals, FingerprintDeriver, FingerprintInput};
use crate::resolution::{ResolveContext, Target, resolve};
use crate::storage::Stores;
use crate::storage::models::{
    AttributionLink, ClickEvent, InsertOutcome, MatchConfidence, OpenEvent, Platform,
    ResolutionOutcome,
};
use crate::utils::is_valid_link_code;

#[derive(Debug, Clone, Default)]
pub struct ClickRequest {
    pub link_code: String,
    pub user_agent: Option<String>,
    pub client_ip: Option<String>,
    pub deep_link_capable: bool,
    /// `X-Request-Id`，用作点击去重键
    pub request_id: Option<String>,
    pub signals: ClientSignals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedirectDecision {
    pub click_id: String,
    pub state: ResolutionOutcome,
    pub target: Target,
    pub status: u16,
}

/// Body of `POST /v1/open`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    /// 客户端生成的去重键，重复上报返回同一结果
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default, rename = "OSVersion", alias = "osVersion")]
    pub os_version: Option<String>,
    #[serde(default)]
    pub deep_path: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub client_signals: Option<ClientSignals>,
    #[serde(skip)]
    pub user_agent: Option<String>,
    #[serde(skip)]
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributionStatus {
    Matched,
    Unmatched,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionResult {
    pub open_event_id: String,
    pub status: AttributionStatus,
    pub click_event_id: Option<String>,
    pub link_id: Option<String>,
    pub campaign: Option<String>,
    pub source: Option<String>,
    pub deep_path: Option<String>,
    pub confidence: MatchConfidence,
    pub confidence_score: f64,
}

impl AttributionResult {
    fn pending(open: &OpenEvent) -> Self {
        Self {
            open_event_id: open.id.clone(),
            status: AttributionStatus::Pending,
            click_event_id: None,
            link_id: None,
            campaign: None,
            source: None,
            deep_path: open.deep_path.clone(),
            confidence: MatchConfidence::NoMatch,
            confidence_score: 0.0,
        }
    }
}

#[derive(Clone)]
pub struct AttributionEngine {
    stores: Stores,
    classifier: Classifier,
    deriver: FingerprintDeriver,
    matcher: FingerprintMatcher,
    pending: PendingWrites,
    match_timeout: Duration,
    write_timeout: Duration,
}

impl AttributionEngine {
    pub fn new(config: &StaticConfig, stores: Stores) -> Self {
        Self::with_classifier(config, stores, Classifier::new(&config.classifier))
    }

    pub fn with_classifier(config: &StaticConfig, stores: Stores, classifier: Classifier) -> Self {
        let matcher = FingerprintMatcher::new(&stores, &config.attribution, &config.fraud);
        let pending = PendingWrites::new(stores.events.clone(), &config.retry_queue);
        Self {
            deriver: FingerprintDeriver::new(&config.attribution),
            match_timeout: Duration::from_millis(config.attribution.match_timeout_ms),
            write_timeout: Duration::from_millis(config.attribution.write_timeout_ms),
            stores,
            classifier,
            matcher,
            pending,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn matcher(&self) -> &FingerprintMatcher {
        &self.matcher
    }

    pub fn pending(&self) -> &PendingWrites {
        &self.pending
    }

    pub fn deriver(&self) -> &FingerprintDeriver {
        &self.deriver
    }

    pub async fn record_click(&self, req: ClickRequest) -> Result<RedirectDecision> {
        let user_agent = req
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .ok_or_else(|| DeeplinkError::validation("User-Agent header is required"))?;

        if !is_valid_link_code(&req.link_code) {
            return Err(DeeplinkError::not_found(format!(
                "Link not found: {}",
                req.link_code
            )));
        }
        let link = self
            .stores
            .links
            .get_link(&req.link_code)
            .await?
            .ok_or_else(|| DeeplinkError::not_found(format!("Link not found: {}", req.link_code)))?;

        let class = self
            .classifier
            .classify(user_agent, req.client_ip.as_deref())
            .await;
        let fingerprint = self.deriver.derive(&FingerprintInput {
            platform: class.platform,
            os_version: class.os_version.as_deref(),
            ip: class.ip,
            browser: Some(&class.browser),
            signals: Some(&req.signals),
        });

        let mut click_id = Uuid::new_v4().to_string();
        let dedup_key = req
            .request_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| click_id.clone());

        let mut resolution = resolve(
            &link,
            &ResolveContext {
                platform: class.platform,
                deep_link_capable: req.deep_link_capable,
                click_id: &click_id,
                fingerprint: &fingerprint,
            },
        )?;

        let event = ClickEvent {
            id: click_id.clone(),
            dedup_key,
            link_id: link.id.clone(),
            platform: class.platform,
            browser: class.browser.clone(),
            user_agent: user_agent.to_string(),
            ip_address: class.ip.map(|ip| ip.to_string()),
            country: class.country.clone(),
            state: class.state.clone(),
            city: class.city.clone(),
            fingerprint: fingerprint.clone(),
            outcome: resolution.outcome,
            deep_path: link.deep_path.clone(),
            classifier_degraded: class.degraded,
            created_at: Utc::now(),
        };

        let written =
            tokio::time::timeout(self.write_timeout, self.stores.events.insert_click(&event))
                .await
                .unwrap_or_else(|_| {
                    warn!(
                        "Writing click {} exceeded {:?}, queued for retry",
                        event.id, self.write_timeout
                    );
                    Err(DeeplinkError::store_unavailable("insert_click timed out"))
                });

        match written {
            Ok(InsertOutcome::Inserted(_)) => {}
            Ok(InsertOutcome::Duplicate(existing)) => {
                // 重试的请求：沿用首次写入的点击 id
                debug!("Click {} is a retry of {}", event.dedup_key, existing);
                click_id = existing;
                resolution = resolve(
                    &link,
                    &ResolveContext {
                        platform: class.platform,
                        deep_link_capable: req.deep_link_capable,
                        click_id: &click_id,
                        fingerprint: &fingerprint,
                    },
                )?;
            }
            Err(e) if e.is_store_unavailable() => {
                self.pending.enqueue_click(event);
            }
            Err(e) => return Err(e),
        }

        if class.is_bot {
            debug!("Click {} on {} from crawler UA", click_id, link.id);
        }
        info!(
            "Click {} on {}: platform={} outcome={}",
            click_id, link.id, class.platform, resolution.outcome
        );

        let status = match resolution.target {
            Target::Redirect(_) => 302,
            Target::Html(_) => 200,
        };
        Ok(RedirectDecision {
            click_id,
            state: resolution.outcome,
            target: resolution.target,
            status,
        })
    }

    pub async fn record_open(&self, req: OpenRequest) -> Result<AttributionResult> {
        let platform = req
            .platform
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DeeplinkError::validation("platform is required"))?;
        let platform = Platform::from_str(platform)
            .map_err(|_| DeeplinkError::validation(format!("Unknown platform: {}", platform)))?;

        let user_agent = req.user_agent.as_deref().unwrap_or_default();
        let class = self
            .classifier
            .classify(user_agent, req.client_ip.as_deref())
            .await;
        let os_version = req
            .os_version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or(class.os_version.clone());
        let signals = req.client_signals.unwrap_or_default();

        let fingerprint = self.deriver.derive(&FingerprintInput {
            platform,
            os_version: os_version.as_deref(),
            ip: class.ip,
            browser: (!user_agent.is_empty()).then_some(class.browser.as_str()),
            signals: Some(&signals),
        });

        let open_id = Uuid::new_v4().to_string();
        let mut open = OpenEvent {
            id: open_id.clone(),
            dedup_key: req
                .event_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| open_id.clone()),
            device_id: req.device_id,
            platform,
            os_version,
            browser: class.browser,
            user_agent: user_agent.to_string(),
            ip_address: class.ip.map(|ip| ip.to_string()),
            country: class.country,
            state: class.state,
            city: class.city,
            fingerprint,
            deep_path: req.deep_path,
            success: req.success,
            classifier_degraded: class.degraded,
            created_at: Utc::now(),
        };

        let written =
            tokio::time::timeout(self.write_timeout, self.stores.events.insert_open(&open))
                .await
                .unwrap_or_else(|_| {
                    warn!(
                        "Writing open {} exceeded {:?}, queued for retry",
                        open.id, self.write_timeout
                    );
                    Err(DeeplinkError::store_unavailable("insert_open timed out"))
                });

        match written {
            Ok(InsertOutcome::Inserted(_)) => {}
            Ok(InsertOutcome::Duplicate(existing)) => {
                debug!("Open {} is a retry of {}", open.dedup_key, existing);
                open = match self.stores.events.get_open(&existing).await {
                    Ok(Some(stored)) => stored,
                    Ok(None) | Err(_) => OpenEvent {
                        id: existing,
                        ..open
                    },
                };
            }
            Err(e) if e.is_store_unavailable() => {
                // 写入排队后由 sweep 完成匹配
                let result = AttributionResult::pending(&open);
                self.pending.enqueue_open(open);
                return Ok(result);
            }
            Err(e) => return Err(e),
        }

        if self.pending.has_queued_clicks() {
            debug!("Open {} waits for queued clicks, deferring to sweep", open.id);
            return Ok(AttributionResult::pending(&open));
        }

        let link = match tokio::time::timeout(self.match_timeout, self.matcher.match_open(&open))
            .await
        {
            Ok(Ok(Some(link))) => link,
            Ok(Ok(None)) => return Ok(AttributionResult::pending(&open)),
            Ok(Err(e)) => {
                warn!("Matching open {} failed, deferring to sweep: {}", open.id, e);
                return Ok(AttributionResult::pending(&open));
            }
            Err(_) => {
                warn!(
                    "Matching open {} exceeded {:?}, deferring to sweep",
                    open.id, self.match_timeout
                );
                return Ok(AttributionResult::pending(&open));
            }
        };

        Ok(self.result_for(&open, link).await)
    }

    /// Attribution for an open already ingested, e.g. after a sweep
    pub async fn attribution_of(&self, open_event_id: &str) -> Result<Option<AttributionResult>> {
        let Some(open) = self.stores.events.get_open(open_event_id).await? else {
            return Ok(None);
        };
        Ok(Some(match self.stores.events.get_attribution(open_event_id).await? {
            Some(link) => self.result_for(&open, link).await,
            None => AttributionResult::pending(&open),
        }))
    }

    async fn result_for(&self, open: &OpenEvent, link: AttributionLink) -> AttributionResult {
        let mut deep_path = open.deep_path.clone();
        if let Some(click_id) = &link.click_event_id {
            match self.stores.events.get_click(click_id).await {
                Ok(Some(click)) if click.deep_path.is_some() => deep_path = click.deep_path,
                Ok(_) => {}
                Err(e) => warn!("Failed to load click {}: {}", click_id, e),
            }
        }

        let status = if link.is_matched() {
            AttributionStatus::Matched
        } else {
            AttributionStatus::Unmatched
        };
        info!(
            "Open {} {:?}: click={:?} confidence={}",
            open.id, status, link.click_event_id, link.match_confidence
        );

        AttributionResult {
            open_event_id: open.id.clone(),
            status,
            click_event_id: link.click_event_id,
            link_id: link.link_id,
            campaign: link.campaign,
            source: link.source,
            deep_path,
            confidence: link.match_confidence,
            confidence_score: link.confidence_score,
        }
    }
}
