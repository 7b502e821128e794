//! App open / install event entity (immutable once written)

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "open_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub dedup_key: String,
    pub device_id: Option<String>,
    pub platform: String,
    pub os_version: Option<String>,
    pub browser: String,
    #[sea_orm(column_type = "Text")]
    pub user_agent: String,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub fingerprint: String,
    pub deep_path: Option<String>,
    pub success: bool,
    pub classifier_degraded: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
