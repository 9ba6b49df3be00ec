use sqlx::SqlitePool;
use tracing::debug;

use scheduler_core::SchedulerResult;

/// 时间字段统一以UTC毫秒时间戳存储
const SCHEMA: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS workers (
        id TEXT PRIMARY KEY,
        host TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schedules (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        action TEXT NOT NULL,
        minute INTEGER NOT NULL,
        hour INTEGER NOT NULL,
        day_of_week INTEGER,
        next_run INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schedule_metadata (
        schedule_id TEXT NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (schedule_id, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        schedule_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        action TEXT NOT NULL,
        worker_id TEXT,
        status TEXT NOT NULL,
        timeout INTEGER NOT NULL,
        hard_timeout INTEGER NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_lease ON jobs (action, status, created_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_schedule ON jobs (schedule_id)",
    r#"
    CREATE TABLE IF NOT EXISTS job_metadata (
        job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (job_id, key)
    )
    "#,
];

pub async fn run(pool: &SqlitePool) -> SchedulerResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("数据库表结构已就绪");
    Ok(())
}
