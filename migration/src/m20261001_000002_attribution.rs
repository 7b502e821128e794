//! 归因表迁移
//!
//! - attribution_links：open_event_id 为主键，保证每个 OpenEvent 至多一条归因；
//!   click_event_id 唯一索引保证每次点击只被归因一次（NULL 不参与唯一约束）
//! - fraud_flags：点击洪泛审计记录

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AttributionLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttributionLinks::OpenEventId)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::ClickEventId)
                            .string_len(36)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::MatchConfidence)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::ConfidenceScore)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::WindowExpired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::FraudExcluded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::LinkId)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::Campaign)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::Source)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttributionLinks::MatchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_attribution_links_click_event_id")
                    .table(AttributionLinks::Table)
                    .col(AttributionLinks::ClickEventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FraudFlags::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FraudFlags::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FraudFlags::Fingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudFlags::FirstClickAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudFlags::LastClickAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudFlags::ClickCount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudFlags::FlaggedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_fraud_flags_fp_first")
                    .table(FraudFlags::Table)
                    .col(FraudFlags::Fingerprint)
                    .col(FraudFlags::FirstClickAt)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_fraud_flags_fp_first").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FraudFlags::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("uq_attribution_links_click_event_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(AttributionLinks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AttributionLinks {
    #[sea_orm(iden = "attribution_links")]
    Table,
    OpenEventId,
    ClickEventId,
    MatchConfidence,
    ConfidenceScore,
    WindowExpired,
    FraudExcluded,
    LinkId,
    Campaign,
    Source,
    MatchedAt,
}

#[derive(DeriveIden)]
enum FraudFlags {
    #[sea_orm(iden = "fraud_flags")]
    Table,
    Id,
    Fingerprint,
    FirstClickAt,
    LastClickAt,
    ClickCount,
    FlaggedAt,
}
