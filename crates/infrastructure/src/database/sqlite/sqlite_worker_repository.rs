use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{PageRequest, Worker, WorkerRepository};

use super::{dt_to_ms, ms_to_dt, push_page};

pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Worker> {
        Ok(Worker {
            id: row.try_get("id")?,
            host: row.try_get("host")?,
            created_at: ms_to_dt(row.try_get("created_at")?)?,
        })
    }
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    #[instrument(skip(self, worker), fields(worker_id = %worker.id, host = %worker.host))]
    async fn create(&self, worker: &Worker) -> SchedulerResult<Worker> {
        sqlx::query("INSERT INTO workers (id, host, created_at) VALUES ($1, $2, $3)")
            .bind(&worker.id)
            .bind(&worker.host)
            .bind(dt_to_ms(worker.created_at))
            .execute(&self.pool)
            .await?;
        debug!("注册Worker: {}", worker.id);
        Ok(worker.clone())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<Worker>> {
        let row = sqlx::query("SELECT id, host, created_at FROM workers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_worker).transpose()
    }

    async fn list(&self, page: &PageRequest) -> SchedulerResult<Vec<Worker>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, host, created_at FROM workers WHERE 1 = 1");
        push_page(&mut builder, page, "id");
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_worker).collect()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM workers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::worker_not_found(id));
        }
        Ok(())
    }
}
