//! PostgreSQL 连接池
//!
//! 连接参数全部来自 `DatabaseConfig`，启动时先确认数据库可达再构建权限服务。

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::{Duration, Instant};

/// 由配置得到连接池参数（不建立连接）
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
}

/// 创建连接池
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let pool = pool_options(config)
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to authority database");
            DbError::Connect(e)
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Authority database pool ready"
    );

    Ok(pool)
}

/// 执行一次往返查询并记录耗时
pub async fn health_check(pool: &PgPool) -> HealthStatus {
    let started = Instant::now();
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => {
            let latency = started.elapsed();
            metrics::histogram!("authority_db_health_check_seconds").record(latency.as_secs_f64());
            HealthStatus::Healthy { latency }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Authority database unreachable");
            HealthStatus::Unhealthy(e.to_string())
        }
    }
}

/// 上报连接池使用情况
pub fn record_pool_metrics(pool: &PgPool) {
    let idle = pool.num_idle() as f64;
    let size = f64::from(pool.size());
    metrics::gauge!("authority_db_connections", "state" => "idle").set(idle);
    metrics::gauge!("authority_db_connections", "state" => "active").set(size - idle);
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("cannot connect to authority database: {0}")]
    Connect(#[source] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy { latency: Duration },
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy { .. })
    }
}
