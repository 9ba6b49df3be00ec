pub mod sqlite_job_repository;
pub mod sqlite_schedule_repository;
pub mod sqlite_worker_repository;

pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_schedule_repository::SqliteScheduleRepository;
pub use sqlite_worker_repository::SqliteWorkerRepository;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection};

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{Metadata, PageRequest};

pub(crate) fn dt_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn ms_to_dt(ms: i64) -> SchedulerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| SchedulerError::database_error(format!("无效的时间戳: {ms}")))
}

pub(crate) fn to_u32(value: i64, column: &str) -> SchedulerResult<u32> {
    u32::try_from(value)
        .map_err(|_| SchedulerError::database_error(format!("列 {column} 的值超出范围: {value}")))
}

/// 追加 `id > marker ORDER BY id LIMIT n` 分页子句
pub(crate) fn push_page(builder: &mut sqlx::QueryBuilder<'_, Sqlite>, page: &PageRequest, id_column: &str) {
    if let Some(marker) = &page.marker {
        builder
            .push(format!(" AND {id_column} > "))
            .push_bind(marker.clone());
    }
    builder.push(format!(" ORDER BY {id_column} ASC"));
    if let Some(limit) = page.limit {
        builder.push(" LIMIT ").push_bind(limit as i64);
    }
}

/// 读取某个实体的全部元数据，`table` 与 `owner_column` 来自内部常量
pub(crate) async fn load_metadata(
    conn: &mut SqliteConnection,
    table: &str,
    owner_column: &str,
    owner_id: &str,
) -> SchedulerResult<Metadata> {
    let rows: Vec<(String, String)> = sqlx::query_as(&format!(
        "SELECT key, value FROM {table} WHERE {owner_column} = $1 ORDER BY key"
    ))
    .bind(owner_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().collect())
}

pub(crate) async fn insert_metadata(
    conn: &mut SqliteConnection,
    table: &str,
    owner_column: &str,
    owner_id: &str,
    metadata: &Metadata,
) -> SchedulerResult<()> {
    let statement = format!(
        "INSERT INTO {table} ({owner_column}, key, value) VALUES ($1, $2, $3) \
         ON CONFLICT({owner_column}, key) DO UPDATE SET value = excluded.value"
    );
    for (key, value) in metadata {
        sqlx::query(&statement)
            .bind(owner_id)
            .bind(key)
            .bind(value)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
