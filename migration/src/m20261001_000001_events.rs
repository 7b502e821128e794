//! Link 与事件表迁移
//!
//! 创建 links、click_events、open_events 三张表：
//! - links：智能链接定义（按 id 查找）
//! - click_events：每次点击一条，写入后不可变
//! - open_events：每次 App 打开/安装上报一条，写入后不可变

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Links::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Links::Id)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Links::WebUrl).text().null())
                    .col(ColumnDef::new(Links::IosStoreUrl).text().null())
                    .col(ColumnDef::new(Links::AndroidStoreUrl).text().null())
                    .col(ColumnDef::new(Links::IosAppUrl).text().null())
                    .col(ColumnDef::new(Links::AndroidAppUrl).text().null())
                    .col(ColumnDef::new(Links::DeepPath).string_len(1024).null())
                    .col(ColumnDef::new(Links::Campaign).string_len(255).null())
                    .col(ColumnDef::new(Links::Source).string_len(255).null())
                    .col(
                        ColumnDef::new(Links::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClickEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvents::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::DedupKey)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ClickEvents::LinkId).string_len(128).not_null())
                    .col(ColumnDef::new(ClickEvents::Platform).string_len(16).not_null())
                    .col(ColumnDef::new(ClickEvents::Browser).string_len(64).not_null())
                    .col(ColumnDef::new(ClickEvents::UserAgent).text().not_null())
                    .col(ColumnDef::new(ClickEvents::IpAddress).string_len(45).null())
                    .col(ColumnDef::new(ClickEvents::Country).string_len(2).null())
                    .col(ColumnDef::new(ClickEvents::State).string_len(16).null())
                    .col(ColumnDef::new(ClickEvents::City).string_len(100).null())
                    .col(
                        ColumnDef::new(ClickEvents::Fingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::Outcome).string_len(32).not_null())
                    .col(ColumnDef::new(ClickEvents::DeepPath).string_len(1024).null())
                    .col(
                        ColumnDef::new(ClickEvents::ClassifierDegraded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 指纹 + 时间复合索引（匹配器的窗口扫描）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_fp_time")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::Fingerprint)
                    .col(ClickEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_link_id")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::LinkId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OpenEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OpenEvents::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OpenEvents::DedupKey)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OpenEvents::DeviceId).string_len(128).null())
                    .col(ColumnDef::new(OpenEvents::Platform).string_len(16).not_null())
                    .col(ColumnDef::new(OpenEvents::OsVersion).string_len(32).null())
                    .col(ColumnDef::new(OpenEvents::Browser).string_len(64).not_null())
                    .col(ColumnDef::new(OpenEvents::UserAgent).text().not_null())
                    .col(ColumnDef::new(OpenEvents::IpAddress).string_len(45).null())
                    .col(ColumnDef::new(OpenEvents::Country).string_len(2).null())
                    .col(ColumnDef::new(OpenEvents::State).string_len(16).null())
                    .col(ColumnDef::new(OpenEvents::City).string_len(100).null())
                    .col(
                        ColumnDef::new(OpenEvents::Fingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(OpenEvents::DeepPath).string_len(1024).null())
                    .col(ColumnDef::new(OpenEvents::Success).boolean().not_null())
                    .col(
                        ColumnDef::new(OpenEvents::ClassifierDegraded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OpenEvents::CreatedAt)
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
                    .name("idx_open_events_created_at")
                    .table(OpenEvents::Table)
                    .col(OpenEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_open_events_created_at").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OpenEvents::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_click_events_link_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_click_events_fp_time").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClickEvents::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Links::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Links {
    #[sea_orm(iden = "links")]
    Table,
    Id,
    WebUrl,
    IosStoreUrl,
    AndroidStoreUrl,
    IosAppUrl,
    AndroidAppUrl,
    DeepPath,
    Campaign,
    Source,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ClickEvents {
    #[sea_orm(iden = "click_events")]
    Table,
    Id,
    DedupKey,
    LinkId,
    Platform,
    Browser,
    UserAgent,
    IpAddress,
    Country,
    State,
    City,
    Fingerprint,
    Outcome,
    DeepPath,
    ClassifierDegraded,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OpenEvents {
    #[sea_orm(iden = "open_events")]
    Table,
    Id,
    DedupKey,
    DeviceId,
    Platform,
    OsVersion,
    Browser,
    UserAgent,
    IpAddress,
    Country,
    State,
    City,
    Fingerprint,
    DeepPath,
    Success,
    ClassifierDegraded,
    CreatedAt,
}
