//! Persisted records
//!
//! Field names and enumerations here are part of the analytics contract:
//! serialized as camelCase with `platform ∈ {web, ios, android}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Client platform
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Web,
    Ios,
    Android,
}

impl Platform {
    pub fn is_mobile(&self) -> bool {
        matches!(self, Platform::Ios | Platform::Android)
    }
}

/// Terminal state reached by the resolution state machine for one click
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionOutcome {
    WebFallback,
    AppInstallPrompt,
    DeepLinkDelivered,
}

/// How an attribution link was established
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchConfidence {
    Exact,
    Probabilistic,
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    NoMatch,
}

/// Smart link definition, looked up by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    /// `None` for app-only links
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub ios_store_url: Option<String>,
    #[serde(default)]
    pub android_store_url: Option<String>,
    /// App scheme or universal-link base, e.g. `myapp://` or `https://app.example.com/`
    #[serde(default)]
    pub ios_app_url: Option<String>,
    #[serde(default)]
    pub android_app_url: Option<String>,
    #[serde(default)]
    pub deep_path: Option<String>,
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Link {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            web_url: None,
            ios_store_url: None,
            android_store_url: None,
            ios_app_url: None,
            android_app_url: None,
            deep_path: None,
            campaign: None,
            source: None,
            created_at: Utc::now(),
        }
    }

    pub fn store_url(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Ios => self.ios_store_url.as_deref(),
            Platform::Android => self.android_store_url.as_deref(),
            Platform::Web => None,
        }
    }

    pub fn app_url(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Ios => self.ios_app_url.as_deref(),
            Platform::Android => self.android_app_url.as_deref(),
            Platform::Web => None,
        }
    }
}

/// One per inbound click request. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    pub id: String,
    pub dedup_key: String,
    pub link_id: String,
    pub platform: Platform,
    pub browser: String,
    pub user_agent: String,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub fingerprint: String,
    pub outcome: ResolutionOutcome,
    pub deep_path: Option<String>,
    pub classifier_degraded: bool,
    pub created_at: DateTime<Utc>,
}

/// One per app-open / install report. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenEvent {
    pub id: String,
    pub dedup_key: String,
    pub device_id: Option<String>,
    pub platform: Platform,
    pub os_version: Option<String>,
    pub browser: String,
    pub user_agent: String,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub fingerprint: String,
    pub deep_path: Option<String>,
    pub success: bool,
    pub classifier_degraded: bool,
    pub created_at: DateTime<Utc>,
}

/// Coarse geo region used for tie-breaking; `None` when unknown
pub fn region_of(country: &Option<String>, state: &Option<String>) -> Option<(String, String)> {
    let country = country.as_ref()?;
    Some((country.clone(), state.clone().unwrap_or_default()))
}

/// Derived record linking an open to the click that caused it (or to nothing).
/// Created once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionLink {
    pub open_event_id: String,
    pub click_event_id: Option<String>,
    pub match_confidence: MatchConfidence,
    pub confidence_score: f64,
    pub matched_at: DateTime<Utc>,
    pub window_expired: bool,
    pub fraud_excluded: bool,
    pub link_id: Option<String>,
    pub campaign: Option<String>,
    pub source: Option<String>,
}

impl AttributionLink {
    pub fn unmatched(open_event_id: &str, window_expired: bool, fraud_excluded: bool) -> Self {
        Self {
            open_event_id: open_event_id.to_string(),
            click_event_id: None,
            match_confidence: MatchConfidence::NoMatch,
            confidence_score: 0.0,
            matched_at: Utc::now(),
            window_expired,
            fraud_excluded,
            link_id: None,
            campaign: None,
            source: None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.click_event_id.is_some()
    }
}

/// Audit record for a click-flooding fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudFlag {
    pub fingerprint: String,
    pub first_click_at: DateTime<Utc>,
    pub last_click_at: DateTime<Utc>,
    pub click_count: u64,
    pub flagged_at: DateTime<Utc>,
}

impl FraudFlag {
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        self.first_click_at < range.end && self.last_click_at >= range.start
    }
}

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Result of an idempotent event insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(String),
    /// Dedup key already present; carries the id of the stored event
    Duplicate(String),
}

impl InsertOutcome {
    pub fn id(&self) -> &str {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::Duplicate(id) => id,
        }
    }
}

/// Result of the compare-and-set attribution insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkInsert {
    Inserted,
    /// An AttributionLink for this open already exists
    OpenAlreadyLinked,
    /// Another open already claimed this click
    ClickAlreadyClaimed,
}

impl LinkInsert {
    pub fn inserted(&self) -> bool {
        matches!(self, LinkInsert::Inserted)
    }
}
