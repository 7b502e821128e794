//! In-process storage backend
//!
//! Used for `memory://` deployments and throughout the test suite. All
//! compare-and-set semantics come from `DashMap` entry locks, which are held
//! per shard and never across an await point.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::errors::Result;
use crate::storage::models::{
    AttributionLink, ClickEvent, FraudFlag, InsertOutcome, Link, LinkInsert, OpenEvent, TimeRange,
};
use crate::storage::traits::{EventStore, LinkStore};

#[derive(Default)]
pub struct MemoryEventStore {
    clicks: DashMap<String, ClickEvent>,
    click_dedup: DashMap<String, String>,
    /// fingerprint -> click ids
    clicks_by_fingerprint: DashMap<String, Vec<String>>,
    opens: DashMap<String, OpenEvent>,
    open_dedup: DashMap<String, String>,
    /// open_event_id -> link
    attributions: DashMap<String, AttributionLink>,
    /// click_event_id -> open_event_id
    claims: DashMap<String, String>,
    fraud: DashMap<String, Vec<FraudFlag>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn click_count(&self) -> usize {
        self.clicks.len()
    }

    pub fn open_count(&self) -> usize {
        self.opens.len()
    }

    pub fn attribution_count(&self) -> usize {
        self.attributions.len()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_click(&self, event: &ClickEvent) -> Result<InsertOutcome> {
        match self.click_dedup.entry(event.dedup_key.clone()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Duplicate(existing.get().clone())),
            Entry::Vacant(slot) => {
                self.clicks.insert(event.id.clone(), event.clone());
                self.clicks_by_fingerprint
                    .entry(event.fingerprint.clone())
                    .or_default()
                    .push(event.id.clone());
                slot.insert(event.id.clone());
                trace!("MemoryEventStore: click {} stored", event.id);
                Ok(InsertOutcome::Inserted(event.id.clone()))
            }
        }
    }

    async fn insert_open(&self, event: &OpenEvent) -> Result<InsertOutcome> {
        match self.open_dedup.entry(event.dedup_key.clone()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Duplicate(existing.get().clone())),
            Entry::Vacant(slot) => {
                self.opens.insert(event.id.clone(), event.clone());
                slot.insert(event.id.clone());
                trace!("MemoryEventStore: open {} stored", event.id);
                Ok(InsertOutcome::Inserted(event.id.clone()))
            }
        }
    }

    async fn get_click(&self, id: &str) -> Result<Option<ClickEvent>> {
        Ok(self.clicks.get(id).map(|r| r.value().clone()))
    }

    async fn get_open(&self, id: &str) -> Result<Option<OpenEvent>> {
        Ok(self.opens.get(id).map(|r| r.value().clone()))
    }

    async fn query_by_fingerprint(
        &self,
        fingerprint: &str,
        range: TimeRange,
    ) -> Result<Vec<ClickEvent>> {
        let ids: Vec<String> = match self.clicks_by_fingerprint.get(fingerprint) {
            Some(ids) => ids.value().clone(),
            None => return Ok(Vec::new()),
        };

        let mut clicks: Vec<ClickEvent> = ids
            .iter()
            .filter_map(|id| self.clicks.get(id).map(|r| r.value().clone()))
            .filter(|c| range.contains(c.created_at))
            .collect();
        clicks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(clicks)
    }

    async fn claimed_clicks(&self, click_ids: &[String]) -> Result<HashSet<String>> {
        Ok(click_ids
            .iter()
            .filter(|id| self.claims.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_attribution_if_absent(&self, link: &AttributionLink) -> Result<LinkInsert> {
        // 锁顺序固定：attributions -> claims
        match self.attributions.entry(link.open_event_id.clone()) {
            Entry::Occupied(_) => Ok(LinkInsert::OpenAlreadyLinked),
            Entry::Vacant(slot) => {
                if let Some(click_id) = &link.click_event_id {
                    match self.claims.entry(click_id.clone()) {
                        Entry::Occupied(_) => return Ok(LinkInsert::ClickAlreadyClaimed),
                        Entry::Vacant(claim) => {
                            claim.insert(link.open_event_id.clone());
                        }
                    }
                }
                slot.insert(link.clone());
                Ok(LinkInsert::Inserted)
            }
        }
    }

    async fn get_attribution(&self, open_event_id: &str) -> Result<Option<AttributionLink>> {
        Ok(self
            .attributions
            .get(open_event_id)
            .map(|r| r.value().clone()))
    }

    async fn unattributed_opens(&self, range: TimeRange, limit: u64) -> Result<Vec<OpenEvent>> {
        let mut pending: Vec<OpenEvent> = self
            .opens
            .iter()
            .filter(|r| range.contains(r.value().created_at))
            .filter(|r| !self.attributions.contains_key(r.key()))
            .map(|r| r.value().clone())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn record_fraud_flag(&self, flag: &FraudFlag) -> Result<bool> {
        let mut flags = self.fraud.entry(flag.fingerprint.clone()).or_default();
        if flags
            .iter()
            .any(|f| f.first_click_at == flag.first_click_at)
        {
            return Ok(false);
        }
        flags.push(flag.clone());
        Ok(true)
    }

    async fn fraud_flags(&self, fingerprint: &str) -> Result<Vec<FraudFlag>> {
        Ok(self
            .fraud
            .get(fingerprint)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Default)]
pub struct MemoryLinkStore {
    links: DashMap<String, Link>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn get_link(&self, id: &str) -> Result<Option<Link>> {
        Ok(self.links.get(id).map(|r| r.value().clone()))
    }

    async fn upsert_link(&self, link: &Link) -> Result<()> {
        self.links.insert(link.id.clone(), link.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{MatchConfidence, Platform, ResolutionOutcome};
    use chrono::{Duration, Utc};

    fn click(id: &str, fp: &str, ago_secs: i64) -> ClickEvent {
        ClickEvent {
            id: id.to_string(),
            dedup_key: format!("dedup-{}", id),
            link_id: "promo".to_string(),
            platform: Platform::Ios,
            browser: "Safari".to_string(),
            user_agent: "ua".to_string(),
            ip_address: None,
            country: None,
            state: None,
            city: None,
            fingerprint: fp.to_string(),
            outcome: ResolutionOutcome::AppInstallPrompt,
            deep_path: None,
            classifier_degraded: false,
            created_at: Utc::now() - Duration::seconds(ago_secs),
        }
    }

    fn matched(open_id: &str, click_id: &str) -> AttributionLink {
        AttributionLink {
            click_event_id: Some(click_id.to_string()),
            match_confidence: MatchConfidence::Exact,
            confidence_score: 1.0,
            ..AttributionLink::unmatched(open_id, false, false)
        }
    }

    #[tokio::test]
    async fn test_insert_click_is_idempotent_on_dedup_key() {
        let store = MemoryEventStore::new();
        let first = click("c1", "fp", 10);
        let mut retry = first.clone();
        retry.id = "c1-retry".to_string();

        assert_eq!(
            store.insert_click(&first).await.unwrap(),
            InsertOutcome::Inserted("c1".to_string())
        );
        assert_eq!(
            store.insert_click(&retry).await.unwrap(),
            InsertOutcome::Duplicate("c1".to_string())
        );
        assert_eq!(store.click_count(), 1);
    }

    #[tokio::test]
    async fn test_query_by_fingerprint_filters_range() {
        let store = MemoryEventStore::new();
        store.insert_click(&click("old", "fp", 100)).await.unwrap();
        store.insert_click(&click("new", "fp", 10)).await.unwrap();
        store.insert_click(&click("other", "fp2", 10)).await.unwrap();

        let now = Utc::now();
        let found = store
            .query_by_fingerprint("fp", TimeRange::new(now - Duration::seconds(50), now))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "new");
    }

    #[tokio::test]
    async fn test_attribution_cas() {
        let store = MemoryEventStore::new();
        assert_eq!(
            store
                .insert_attribution_if_absent(&matched("o1", "c1"))
                .await
                .unwrap(),
            LinkInsert::Inserted
        );
        assert_eq!(
            store
                .insert_attribution_if_absent(&AttributionLink::unmatched("o1", false, false))
                .await
                .unwrap(),
            LinkInsert::OpenAlreadyLinked
        );
        assert_eq!(
            store
                .insert_attribution_if_absent(&matched("o2", "c1"))
                .await
                .unwrap(),
            LinkInsert::ClickAlreadyClaimed
        );
        // o2 的失败尝试不能留下半条记录
        assert!(store.get_attribution("o2").await.unwrap().is_none());

        let claimed = store
            .claimed_clicks(&["c1".to_string(), "c2".to_string()])
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert!(claimed.contains("c1"));
    }

    #[tokio::test]
    async fn test_fraud_flag_dedup() {
        let store = MemoryEventStore::new();
        let now = Utc::now();
        let flag = FraudFlag {
            fingerprint: "fp".into(),
            first_click_at: now,
            last_click_at: now,
            click_count: 3,
            flagged_at: now,
        };
        assert!(store.record_fraud_flag(&flag).await.unwrap());
        assert!(!store.record_fraud_flag(&flag).await.unwrap());
        assert_eq!(store.fraud_flags("fp").await.unwrap().len(), 1);
    }
}
