//! 瞬时数据库错误的重试与错误分类
//!
//! 事件写入在返回 StoreUnavailable 之前先在这里做有限次数的退避重试；
//! 唯一约束冲突不是瞬时错误，交给调用方按去重/CAS 语义处理。

use std::future::Future;
use std::time::Duration;

use sea_orm::{DbErr, SqlErr};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl From<&DatabaseConfig> for RetryPolicy {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

/// 唯一约束冲突（dedup_key、open_event_id、click_event_id）
pub fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    // 驱动未给出错误码时回退到消息匹配
    let msg = err.to_string().to_lowercase();
    msg.contains("unique constraint")
        || msg.contains("duplicate key")
        || msg.contains("duplicate entry")
}

/// 连接类错误、死锁、锁等待超时可重试
pub fn is_transient(err: &DbErr) -> bool {
    use sea_orm::error::RuntimeErr;

    let runtime = match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => return true,
        DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime,
        _ => return false,
    };

    match runtime {
        RuntimeErr::SqlxError(sqlx_err) => {
            use std::ops::Deref;
            if let Some(code) = sqlx_err
                .deref()
                .as_database_error()
                .and_then(|db_err| db_err.code())
            {
                // MySQL 1213/1205, PostgreSQL 40001/40P01, SQLite BUSY/LOCKED
                return matches!(code.as_ref(), "1213" | "1205" | "40001" | "40P01" | "5" | "6");
            }
            is_transient_message(&sqlx_err.to_string())
        }
        RuntimeErr::Internal(msg) => is_transient_message(msg),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn is_transient_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("deadlock")
        || msg.contains("lock wait timeout")
        || msg.contains("database is locked")
        || msg.contains("serialization failure")
}

/// 指数退避 + 0-25% 抖动
fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    use rand::RngExt;
    let exp = policy
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = exp.min(policy.max_delay_ms);
    let jitter = rand::rng().random_range(0..=capped / 4);
    Duration::from_millis(capped.saturating_add(jitter))
}

pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) if is_transient(&e) && attempt < policy.max_retries => {
                attempt += 1;
                let delay = backoff_delay(attempt, &policy);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation_name,
                    attempt,
                    policy.max_retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::error::{ConnAcquireErr, RuntimeErr};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 5,
            max_delay_ms: 20,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)));
        assert!(is_transient(&DbErr::Query(RuntimeErr::Internal(
            "database is locked".to_string()
        ))));
        assert!(!is_transient(&DbErr::RecordNotFound("x".to_string())));
    }

    #[test]
    fn test_unique_violation_message_fallback() {
        let err = DbErr::Exec(RuntimeErr::Internal(
            "UNIQUE constraint failed: click_events.dedup_key".to_string(),
        ));
        assert!(is_unique_violation(&err));
        assert!(!is_transient(&err));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        };
        let first = backoff_delay(1, &policy).as_millis() as u64;
        assert!((100..=125).contains(&first));
        let late = backoff_delay(10, &policy).as_millis() as u64;
        assert!((2000..=2500).contains(&late));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry("insert_click", fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unique_violation_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DbErr> = with_retry("insert_open", fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(DbErr::Exec(RuntimeErr::Internal(
                    "UNIQUE constraint failed: open_events.dedup_key".to_string(),
                )))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DbErr> = with_retry("get_link", fast_policy(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbErr::Conn(RuntimeErr::Internal("reset".to_string()))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
