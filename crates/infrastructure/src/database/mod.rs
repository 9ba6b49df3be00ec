//! 数据库存储

pub mod migrations;
pub mod sqlite;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use scheduler_core::config::DatabaseConfig;
use scheduler_core::{SchedulerError, SchedulerResult};

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// 创建SQLite连接池并执行建表
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let pool = Self::connect(&config.url, config.max_connections).await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    async fn connect(url: &str, max_connections: u32) -> SchedulerResult<SqlitePool> {
        let connect_options = SqliteConnectOptions::from_str(url)
            .map_err(|e| SchedulerError::config_error(format!("解析数据库URL失败: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // 内存数据库每个连接相互独立，只能使用单连接且不能回收
        let in_memory = url.contains(":memory:");
        let mut options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections })
            .acquire_timeout(Duration::from_secs(30));
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }

        info!("创建SQLite数据库连接池: {}", url);
        let pool = options.connect_with(connect_options).await?;
        Ok(pool)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
