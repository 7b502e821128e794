//! EventStore implementation for SeaOrmStore

use std::collections::HashSet;

use async_trait::async_trait;
use sea_orm::sea_query::Query;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::{debug, error};

use super::SeaOrmStore;
use super::converters::{
    attribution_to_active_model, click_to_active_model, fraud_flag_to_active_model,
    model_to_attribution, model_to_click, model_to_fraud_flag, model_to_open,
    open_to_active_model,
};
use super::retry::{is_unique_violation, with_retry};
use crate::errors::{DeeplinkError, Result};
use crate::storage::models::{
    AttributionLink, ClickEvent, FraudFlag, InsertOutcome, LinkInsert, OpenEvent, TimeRange,
};
use crate::storage::traits::EventStore;

use migration::entities::{attribution_link, click_event, fraud_flag, open_event};

/// IN 列表分批大小，避开 SQLite 的绑定参数上限
const IN_CHUNK: usize = 500;

fn unavailable(op: &str, err: sea_orm::DbErr) -> DeeplinkError {
    error!("{} failed after retries: {}", op, err);
    DeeplinkError::store_unavailable(format!("{}: {}", op, err))
}

#[async_trait]
impl EventStore for SeaOrmStore {
    async fn insert_click(&self, event: &ClickEvent) -> Result<InsertOutcome> {
        let db = &self.db;
        let model = click_to_active_model(event);

        let result = with_retry("insert_click", self.retry, || async {
            click_event::Entity::insert(model.clone())
                .exec_without_returning(db)
                .await
        })
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted(event.id.clone())),
            Err(e) if is_unique_violation(&e) => {
                let existing = click_event::Entity::find()
                    .filter(click_event::Column::DedupKey.eq(event.dedup_key.as_str()))
                    .one(db)
                    .await
                    .map_err(|e| unavailable("insert_click", e))?;
                match existing {
                    Some(m) => {
                        debug!("click dedup_key {} already stored as {}", event.dedup_key, m.id);
                        Ok(InsertOutcome::Duplicate(m.id))
                    }
                    // 主键冲突（同一 id 重放）
                    None => Ok(InsertOutcome::Duplicate(event.id.clone())),
                }
            }
            Err(e) => Err(unavailable("insert_click", e)),
        }
    }

    async fn insert_open(&self, event: &OpenEvent) -> Result<InsertOutcome> {
        let db = &self.db;
        let model = open_to_active_model(event);

        let result = with_retry("insert_open", self.retry, || async {
            open_event::Entity::insert(model.clone())
                .exec_without_returning(db)
                .await
        })
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted(event.id.clone())),
            Err(e) if is_unique_violation(&e) => {
                let existing = open_event::Entity::find()
                    .filter(open_event::Column::DedupKey.eq(event.dedup_key.as_str()))
                    .one(db)
                    .await
                    .map_err(|e| unavailable("insert_open", e))?;
                Ok(InsertOutcome::Duplicate(
                    existing.map(|m| m.id).unwrap_or_else(|| event.id.clone()),
                ))
            }
            Err(e) => Err(unavailable("insert_open", e)),
        }
    }

    async fn get_click(&self, id: &str) -> Result<Option<ClickEvent>> {
        let db = &self.db;
        let model = with_retry("get_click", self.retry, || async {
            click_event::Entity::find_by_id(id.to_string()).one(db).await
        })
        .await
        .map_err(|e| unavailable("get_click", e))?;
        model.map(model_to_click).transpose()
    }

    async fn get_open(&self, id: &str) -> Result<Option<OpenEvent>> {
        let db = &self.db;
        let model = with_retry("get_open", self.retry, || async {
            open_event::Entity::find_by_id(id.to_string()).one(db).await
        })
        .await
        .map_err(|e| unavailable("get_open", e))?;
        model.map(model_to_open).transpose()
    }

    async fn query_by_fingerprint(
        &self,
        fingerprint: &str,
        range: TimeRange,
    ) -> Result<Vec<ClickEvent>> {
        let db = &self.db;
        let models = with_retry("query_by_fingerprint", self.retry, || async {
            click_event::Entity::find()
                .filter(click_event::Column::Fingerprint.eq(fingerprint))
                .filter(click_event::Column::CreatedAt.gte(range.start))
                .filter(click_event::Column::CreatedAt.lt(range.end))
                .order_by_asc(click_event::Column::CreatedAt)
                .order_by_asc(click_event::Column::Id)
                .all(db)
                .await
        })
        .await
        .map_err(|e| unavailable("query_by_fingerprint", e))?;

        models.into_iter().map(model_to_click).collect()
    }

    async fn claimed_clicks(&self, click_ids: &[String]) -> Result<HashSet<String>> {
        let db = &self.db;
        let mut claimed = HashSet::new();

        for chunk in click_ids.chunks(IN_CHUNK) {
            let ids: Vec<Option<String>> = with_retry("claimed_clicks", self.retry, || async {
                attribution_link::Entity::find()
                    .select_only()
                    .column(attribution_link::Column::ClickEventId)
                    .filter(attribution_link::Column::ClickEventId.is_in(chunk.iter().cloned()))
                    .into_tuple::<Option<String>>()
                    .all(db)
                    .await
            })
            .await
            .map_err(|e| unavailable("claimed_clicks", e))?;
            claimed.extend(ids.into_iter().flatten());
        }

        Ok(claimed)
    }

    async fn insert_attribution_if_absent(&self, link: &AttributionLink) -> Result<LinkInsert> {
        let db = &self.db;
        let model = attribution_to_active_model(link);

        let result = with_retry("insert_attribution", self.retry, || async {
            attribution_link::Entity::insert(model.clone())
                .exec_without_returning(db)
                .await
        })
        .await;

        match result {
            Ok(_) => Ok(LinkInsert::Inserted),
            Err(e) if is_unique_violation(&e) => {
                // 区分是哪个约束冲突：open 已有记录优先
                let existing = attribution_link::Entity::find_by_id(link.open_event_id.clone())
                    .one(db)
                    .await
                    .map_err(|e| unavailable("insert_attribution", e))?;
                if existing.is_some() {
                    Ok(LinkInsert::OpenAlreadyLinked)
                } else {
                    Ok(LinkInsert::ClickAlreadyClaimed)
                }
            }
            Err(e) => Err(unavailable("insert_attribution", e)),
        }
    }

    async fn get_attribution(&self, open_event_id: &str) -> Result<Option<AttributionLink>> {
        let db = &self.db;
        let model = with_retry("get_attribution", self.retry, || async {
            attribution_link::Entity::find_by_id(open_event_id.to_string())
                .one(db)
                .await
        })
        .await
        .map_err(|e| unavailable("get_attribution", e))?;
        model.map(model_to_attribution).transpose()
    }

    async fn unattributed_opens(&self, range: TimeRange, limit: u64) -> Result<Vec<OpenEvent>> {
        let db = &self.db;
        let models = with_retry("unattributed_opens", self.retry, || async {
            let attributed = Query::select()
                .column(attribution_link::Column::OpenEventId)
                .from(attribution_link::Entity)
                .to_owned();

            open_event::Entity::find()
                .filter(open_event::Column::CreatedAt.gte(range.start))
                .filter(open_event::Column::CreatedAt.lt(range.end))
                .filter(open_event::Column::Id.not_in_subquery(attributed))
                .order_by_asc(open_event::Column::CreatedAt)
                .limit(limit)
                .all(db)
                .await
        })
        .await
        .map_err(|e| unavailable("unattributed_opens", e))?;

        models.into_iter().map(model_to_open).collect()
    }

    async fn record_fraud_flag(&self, flag: &FraudFlag) -> Result<bool> {
        let db = &self.db;
        let model = fraud_flag_to_active_model(flag);

        let result = with_retry("record_fraud_flag", self.retry, || async {
            fraud_flag::Entity::insert(model.clone())
                .exec_without_returning(db)
                .await
        })
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(unavailable("record_fraud_flag", e)),
        }
    }

    async fn fraud_flags(&self, fingerprint: &str) -> Result<Vec<FraudFlag>> {
        let db = &self.db;
        let models = with_retry("fraud_flags", self.retry, || async {
            fraud_flag::Entity::find()
                .filter(fraud_flag::Column::Fingerprint.eq(fingerprint))
                .order_by_asc(fraud_flag::Column::FirstClickAt)
                .all(db)
                .await
        })
        .await
        .map_err(|e| unavailable("fraud_flags", e))?;

        Ok(models.into_iter().map(model_to_fraud_flag).collect())
    }

    fn backend_name(&self) -> &'static str {
        self.backend_name
    }
}
