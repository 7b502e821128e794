//! Smart link definition

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub web_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub ios_store_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub android_store_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub ios_app_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub android_app_url: Option<String>,
    pub deep_path: Option<String>,
    pub campaign: Option<String>,
    pub source: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
