//! Attribution link entity
//!
//! `open_event_id` is the primary key: at most one row per open.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "attribution_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub open_event_id: String,
    pub click_event_id: Option<String>,
    /// exact | probabilistic | none
    pub match_confidence: String,
    pub confidence_score: f64,
    pub window_expired: bool,
    pub fraud_excluded: bool,
    pub link_id: Option<String>,
    pub campaign: Option<String>,
    pub source: Option<String>,
    pub matched_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
