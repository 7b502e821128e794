//! SeaORM storage backend
//!
//! SQLite, MySQL/MariaDB and PostgreSQL. The uniqueness guarantees the
//! attribution engine relies on are enforced by table constraints:
//! `dedup_key` unique on both event tables, `attribution_links.open_event_id`
//! as primary key and a unique index on `attribution_links.click_event_id`.

mod connection;
mod converters;
mod events;
mod links;
pub mod retry;

use sea_orm::DatabaseConnection;
use tracing::warn;

use crate::config::DatabaseConfig;
use crate::errors::{DeeplinkError, Result};

pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use retry::RetryPolicy;

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<&'static str> {
    if database_url.starts_with("sqlite://")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite")
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql")
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(DeeplinkError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// 裸文件路径补成 sqlite URL
fn normalize_sqlite_url(database_url: &str) -> String {
    if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else if database_url == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite://{}?mode=rwc", database_url)
    }
}

/// SeaORM-based event + link store
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
    backend_name: &'static str,
    retry: RetryPolicy,
}

impl SeaOrmStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.database_url.trim();
        if url.is_empty() {
            return Err(DeeplinkError::database_config("database_url 未设置"));
        }

        let backend_name = infer_backend_from_url(url)?;
        let db = if backend_name == "sqlite" {
            connect_sqlite(&normalize_sqlite_url(url)).await?
        } else {
            connect_generic(url, backend_name, config.pool_size, config.timeout).await?
        };

        run_migrations(&db).await?;

        warn!("{} Storage initialized.", backend_name.to_uppercase());
        Ok(Self {
            db,
            backend_name,
            retry: RetryPolicy::from(config),
        })
    }

    /// 复用已有连接（迁移需由调用方负责）
    pub fn from_connection(
        db: DatabaseConnection,
        backend_name: &'static str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            backend_name,
            retry,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_backend_from_url() {
        assert_eq!(infer_backend_from_url("deeplinker.db").unwrap(), "sqlite");
        assert_eq!(
            infer_backend_from_url("sqlite://data/events.db?mode=rwc").unwrap(),
            "sqlite"
        );
        assert_eq!(
            infer_backend_from_url("mariadb://u:p@localhost/dl").unwrap(),
            "mysql"
        );
        assert_eq!(
            infer_backend_from_url("postgresql://localhost/dl").unwrap(),
            "postgres"
        );
        assert!(infer_backend_from_url("redis://localhost").is_err());
    }

    #[test]
    fn test_normalize_sqlite_url() {
        assert_eq!(
            normalize_sqlite_url("deeplinker.db"),
            "sqlite://deeplinker.db?mode=rwc"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite://x.db?mode=rwc"),
            "sqlite://x.db?mode=rwc"
        );
        assert_eq!(normalize_sqlite_url(":memory:"), "sqlite::memory:");
    }
}
