use std::collections::HashSet;

use async_trait::async_trait;

use crate::errors::Result;
use crate::storage::models::{
    AttributionLink, ClickEvent, FraudFlag, InsertOutcome, Link, LinkInsert, OpenEvent, TimeRange,
};

/// Append-only event store
///
/// Events are never updated or deleted through this interface. The only
/// serialization point is [`EventStore::insert_attribution_if_absent`].
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Idempotent on `event.dedup_key`
    async fn insert_click(&self, event: &ClickEvent) -> Result<InsertOutcome>;

    /// Idempotent on `event.dedup_key`
    async fn insert_open(&self, event: &OpenEvent) -> Result<InsertOutcome>;

    async fn get_click(&self, id: &str) -> Result<Option<ClickEvent>>;

    async fn get_open(&self, id: &str) -> Result<Option<OpenEvent>>;

    /// All clicks with `fingerprint` and `created_at ∈ range`, attributed or not,
    /// ordered by `created_at` ascending
    async fn query_by_fingerprint(
        &self,
        fingerprint: &str,
        range: TimeRange,
    ) -> Result<Vec<ClickEvent>>;

    /// Subset of `click_ids` already referenced by an AttributionLink
    async fn claimed_clicks(&self, click_ids: &[String]) -> Result<HashSet<String>>;

    /// Compare-and-set insert keyed by `open_event_id` (and by `click_event_id` when set)
    async fn insert_attribution_if_absent(&self, link: &AttributionLink) -> Result<LinkInsert>;

    async fn get_attribution(&self, open_event_id: &str) -> Result<Option<AttributionLink>>;

    /// Opens created in `range` that have no AttributionLink yet, oldest first
    async fn unattributed_opens(&self, range: TimeRange, limit: u64) -> Result<Vec<OpenEvent>>;

    /// Returns `false` if the same flag (fingerprint, first_click_at) already exists
    async fn record_fraud_flag(&self, flag: &FraudFlag) -> Result<bool>;

    async fn fraud_flags(&self, fingerprint: &str) -> Result<Vec<FraudFlag>>;

    fn backend_name(&self) -> &'static str;
}

/// Link lookup capability (links are managed outside the engine)
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn get_link(&self, id: &str) -> Result<Option<Link>>;

    async fn upsert_link(&self, link: &Link) -> Result<()>;
}
