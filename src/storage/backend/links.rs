//! LinkStore implementation for SeaOrmStore

use async_trait::async_trait;
use sea_orm::EntityTrait;
use sea_orm::sea_query::OnConflict;
use tracing::info;

use super::SeaOrmStore;
use super::converters::{link_to_active_model, model_to_link};
use super::retry::with_retry;
use crate::errors::{DeeplinkError, Result};
use crate::storage::models::Link;
use crate::storage::traits::LinkStore;

use migration::entities::link;

#[async_trait]
impl LinkStore for SeaOrmStore {
    async fn get_link(&self, id: &str) -> Result<Option<Link>> {
        let db = &self.db;
        let model = with_retry(&format!("get_link({})", id), self.retry, || async {
            link::Entity::find_by_id(id.to_string()).one(db).await
        })
        .await
        .map_err(|e| DeeplinkError::store_unavailable(format!("查询链接失败: {}", e)))?;

        Ok(model.map(model_to_link))
    }

    async fn upsert_link(&self, value: &Link) -> Result<()> {
        let db = &self.db;
        let model = link_to_active_model(value);

        with_retry(&format!("upsert_link({})", value.id), self.retry, || async {
            link::Entity::insert(model.clone())
                .on_conflict(
                    OnConflict::column(link::Column::Id)
                        .update_columns([
                            link::Column::WebUrl,
                            link::Column::IosStoreUrl,
                            link::Column::AndroidStoreUrl,
                            link::Column::IosAppUrl,
                            link::Column::AndroidAppUrl,
                            link::Column::DeepPath,
                            link::Column::Campaign,
                            link::Column::Source,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
        })
        .await
        .map_err(|e| DeeplinkError::store_unavailable(format!("保存链接失败: {}", e)))?;

        info!("Link upserted: {}", value.id);
        Ok(())
    }
}
