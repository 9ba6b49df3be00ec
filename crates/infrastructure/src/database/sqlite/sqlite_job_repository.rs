use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{
    Job, JobFilter, JobRepository, JobStatus, Metadata, PageRequest, StatusChange,
};

use super::{dt_to_ms, insert_metadata, load_metadata, ms_to_dt, push_page, to_u32};

const METADATA_TABLE: &str = "job_metadata";
const OWNER_COLUMN: &str = "job_id";
const SELECT_COLUMNS: &str = "SELECT id, schedule_id, tenant_id, action, worker_id, status, timeout, \
     hard_timeout, retry_count, error_message, created_at, updated_at FROM jobs";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Job> {
        let status: String = row.try_get("status")?;
        Ok(Job {
            id: row.try_get("id")?,
            schedule_id: row.try_get("schedule_id")?,
            tenant_id: row.try_get("tenant_id")?,
            action: row.try_get("action")?,
            worker_id: row.try_get("worker_id")?,
            status: status.parse()?,
            timeout: ms_to_dt(row.try_get("timeout")?)?,
            hard_timeout: ms_to_dt(row.try_get("hard_timeout")?)?,
            retry_count: to_u32(row.try_get("retry_count")?, "retry_count")?,
            error_message: row.try_get("error_message")?,
            metadata: Metadata::new(),
            created_at: ms_to_dt(row.try_get("created_at")?)?,
            updated_at: ms_to_dt(row.try_get("updated_at")?)?,
        })
    }

    async fn fetch(&self, id: &str) -> SchedulerResult<Option<Job>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut job = Self::row_to_job(&row)?;
        let mut conn = self.pool.acquire().await?;
        job.metadata = load_metadata(&mut conn, METADATA_TABLE, OWNER_COLUMN, &job.id).await?;
        Ok(Some(job))
    }

    async fn exists(&self, id: &str) -> SchedulerResult<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.id, schedule_id = %job.schedule_id))]
    async fn create(&self, job: &Job) -> SchedulerResult<Job> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, schedule_id, tenant_id, action, worker_id, status, timeout,
                              hard_timeout, retry_count, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&job.id)
        .bind(&job.schedule_id)
        .bind(&job.tenant_id)
        .bind(&job.action)
        .bind(&job.worker_id)
        .bind(job.status.as_str())
        .bind(dt_to_ms(job.timeout))
        .bind(dt_to_ms(job.hard_timeout))
        .bind(i64::from(job.retry_count))
        .bind(&job.error_message)
        .bind(dt_to_ms(job.created_at))
        .bind(dt_to_ms(job.updated_at))
        .execute(&mut *tx)
        .await?;
        insert_metadata(&mut tx, METADATA_TABLE, OWNER_COLUMN, &job.id, &job.metadata).await?;
        tx.commit().await?;
        Ok(job.clone())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<Job>> {
        self.fetch(id).await
    }

    async fn list(&self, filter: &JobFilter, page: &PageRequest) -> SchedulerResult<Vec<Job>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");
        if let Some(schedule_id) = &filter.schedule_id {
            builder.push(" AND schedule_id = ").push_bind(schedule_id.clone());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(worker_id) = &filter.worker_id {
            builder.push(" AND worker_id = ").push_bind(worker_id.clone());
        }
        if let Some(action) = &filter.action {
            builder.push(" AND action = ").push_bind(action.clone());
        }
        push_page(&mut builder, page, "id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut job = Self::row_to_job(row)?;
            let mut conn = self.pool.acquire().await?;
            job.metadata =
                load_metadata(&mut conn, METADATA_TABLE, OWNER_COLUMN, &job.id).await?;
            jobs.push(job);
        }
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM job_metadata WHERE job_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::job_not_found(id));
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, now, lease_until))]
    async fn lease_next(
        &self,
        worker_id: &str,
        action: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> SchedulerResult<Option<Job>> {
        // 选取与写入在同一条语句中完成，SQLite的写锁保证同一作业只会被授予一次
        let leased: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET worker_id = $1,
                status = 'PROCESSING',
                timeout = $2,
                updated_at = $3,
                retry_count = CASE WHEN status = 'PROCESSING' THEN retry_count + 1 ELSE retry_count END
            WHERE id = (
                SELECT id FROM jobs
                WHERE action = $4
                  AND (status = 'QUEUED'
                       OR (status IN ('PROCESSING', 'ERROR') AND timeout <= $3))
                ORDER BY created_at ASC, id ASC
                LIMIT 1
            )
            RETURNING id
            "#,
        )
        .bind(worker_id)
        .bind(dt_to_ms(lease_until))
        .bind(dt_to_ms(now))
        .bind(action)
        .fetch_optional(&self.pool)
        .await?;

        match leased {
            Some((job_id,)) => {
                debug!("Worker {} 租约作业 {}", worker_id, job_id);
                self.fetch(&job_id).await
            }
            None => Ok(None),
        }
    }

    async fn update_status_if(
        &self,
        id: &str,
        expected: JobStatus,
        change: &StatusChange,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1,
                timeout = COALESCE($2, timeout),
                error_message = COALESCE($3, error_message),
                retry_count = retry_count + $4,
                updated_at = $5
            WHERE id = $6 AND status = $7
              AND ($8 IS NULL OR worker_id = $8)
            "#,
        )
        .bind(change.status.as_str())
        .bind(change.timeout.map(dt_to_ms))
        .bind(&change.error_message)
        .bind(if change.increment_retry { 1_i64 } else { 0_i64 })
        .bind(dt_to_ms(change.updated_at))
        .bind(id)
        .bind(expected.as_str())
        .bind(&change.holder)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if !self.exists(id).await? {
                return Err(SchedulerError::job_not_found(id));
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn touch(&self, id: &str, now: DateTime<Utc>) -> SchedulerResult<Job> {
        let result = sqlx::query("UPDATE jobs SET updated_at = $1 WHERE id = $2")
            .bind(dt_to_ms(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::job_not_found(id));
        }
        self.fetch(id)
            .await?
            .ok_or_else(|| SchedulerError::job_not_found(id))
    }

    async fn merge_metadata(&self, id: &str, entries: &Metadata) -> SchedulerResult<Metadata> {
        if !self.exists(id).await? {
            return Err(SchedulerError::job_not_found(id));
        }
        let mut tx = self.pool.begin().await?;
        insert_metadata(&mut tx, METADATA_TABLE, OWNER_COLUMN, id, entries).await?;
        let metadata = load_metadata(&mut tx, METADATA_TABLE, OWNER_COLUMN, id).await?;
        tx.commit().await?;
        Ok(metadata)
    }

    #[instrument(skip(self, statuses, message, now))]
    async fn cancel_for_schedule(
        &self,
        schedule_id: &str,
        statuses: &[JobStatus],
        message: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<u64> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE jobs SET status = ");
        builder
            .push_bind(JobStatus::Cancelled.as_str())
            .push(", error_message = ")
            .push_bind(message.to_string())
            .push(", updated_at = ")
            .push_bind(dt_to_ms(now))
            .push(" WHERE schedule_id = ")
            .push_bind(schedule_id.to_string())
            .push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
