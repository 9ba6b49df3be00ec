use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{
    Metadata, PageRequest, Schedule, ScheduleFilter, ScheduleRepository, INSTANCE_ID_KEY,
};

use super::{
    dt_to_ms, insert_metadata, is_unique_violation, load_metadata, ms_to_dt, push_page, to_u32,
};

const METADATA_TABLE: &str = "schedule_metadata";
const OWNER_COLUMN: &str = "schedule_id";
const SELECT_COLUMNS: &str =
    "SELECT id, tenant_id, action, minute, hour, day_of_week, next_run, created_at, updated_at FROM schedules";

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Schedule> {
        let day_of_week: Option<i64> = row.try_get("day_of_week")?;
        Ok(Schedule {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            action: row.try_get("action")?,
            minute: to_u32(row.try_get("minute")?, "minute")?,
            hour: to_u32(row.try_get("hour")?, "hour")?,
            day_of_week: day_of_week
                .map(|d| to_u32(d, "day_of_week"))
                .transpose()?,
            metadata: Metadata::new(),
            next_run: ms_to_dt(row.try_get("next_run")?)?,
            created_at: ms_to_dt(row.try_get("created_at")?)?,
            updated_at: ms_to_dt(row.try_get("updated_at")?)?,
        })
    }

    async fn with_metadata(&self, mut schedule: Schedule) -> SchedulerResult<Schedule> {
        let mut conn = self.pool.acquire().await?;
        schedule.metadata = load_metadata(&mut conn, METADATA_TABLE, OWNER_COLUMN, &schedule.id).await?;
        Ok(schedule)
    }

    async fn ensure_exists(&self, schedule_id: &str) -> SchedulerResult<()> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM schedules WHERE id = $1")
            .bind(schedule_id)
            .fetch_optional(&self.pool)
            .await?;
        exists
            .map(|_| ())
            .ok_or_else(|| SchedulerError::schedule_not_found(schedule_id))
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id, action = %schedule.action))]
    async fn create(&self, schedule: &Schedule) -> SchedulerResult<Schedule> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO schedules (id, tenant_id, action, minute, hour, day_of_week, next_run, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&schedule.id)
        .bind(&schedule.tenant_id)
        .bind(&schedule.action)
        .bind(i64::from(schedule.minute))
        .bind(i64::from(schedule.hour))
        .bind(schedule.day_of_week.map(i64::from))
        .bind(dt_to_ms(schedule.next_run))
        .bind(dt_to_ms(schedule.created_at))
        .bind(dt_to_ms(schedule.updated_at))
        .execute(&mut *tx)
        .await?;
        insert_metadata(&mut tx, METADATA_TABLE, OWNER_COLUMN, &schedule.id, &schedule.metadata)
            .await?;
        tx.commit().await?;
        debug!("创建调度计划: {}", schedule.id);
        Ok(schedule.clone())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<Schedule>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.with_metadata(Self::row_to_schedule(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        filter: &ScheduleFilter,
        page: &PageRequest,
    ) -> SchedulerResult<Vec<Schedule>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");
        if let Some(tenant_id) = &filter.tenant_id {
            builder.push(" AND tenant_id = ").push_bind(tenant_id.clone());
        }
        if let Some(action) = &filter.action {
            builder.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(instance_id) = &filter.instance_id {
            builder
                .push(" AND EXISTS (SELECT 1 FROM schedule_metadata m WHERE m.schedule_id = schedules.id AND m.key = ")
                .push_bind(INSTANCE_ID_KEY)
                .push(" AND m.value = ")
                .push_bind(instance_id.clone())
                .push(")");
        }
        match (filter.next_run_after, filter.next_run_before) {
            (Some(after), Some(before)) => {
                builder
                    .push(" AND next_run >= ")
                    .push_bind(dt_to_ms(after))
                    .push(" AND next_run <= ")
                    .push_bind(dt_to_ms(before));
            }
            (Some(after), None) => {
                builder.push(" AND next_run >= ").push_bind(dt_to_ms(after));
            }
            (None, Some(before)) => {
                builder.push(" AND next_run < ").push_bind(dt_to_ms(before));
            }
            (None, None) => {}
        }
        push_page(&mut builder, page, "id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut schedules = Vec::with_capacity(rows.len());
        for row in &rows {
            schedules.push(self.with_metadata(Self::row_to_schedule(row)?).await?);
        }
        Ok(schedules)
    }

    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id))]
    async fn update(&self, schedule: &Schedule) -> SchedulerResult<Schedule> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET tenant_id = $1, action = $2, minute = $3, hour = $4, day_of_week = $5,
                next_run = $6, updated_at = $7
            WHERE id = $8
            "#,
        )
        .bind(&schedule.tenant_id)
        .bind(&schedule.action)
        .bind(i64::from(schedule.minute))
        .bind(i64::from(schedule.hour))
        .bind(schedule.day_of_week.map(i64::from))
        .bind(dt_to_ms(schedule.next_run))
        .bind(dt_to_ms(schedule.updated_at))
        .bind(&schedule.id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::schedule_not_found(&schedule.id));
        }
        sqlx::query("DELETE FROM schedule_metadata WHERE schedule_id = $1")
            .bind(&schedule.id)
            .execute(&mut *tx)
            .await?;
        insert_metadata(&mut tx, METADATA_TABLE, OWNER_COLUMN, &schedule.id, &schedule.metadata)
            .await?;
        tx.commit().await?;
        Ok(schedule.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM schedule_metadata WHERE schedule_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::schedule_not_found(id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create_metadata(
        &self,
        schedule_id: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<()> {
        self.ensure_exists(schedule_id).await?;
        let result = sqlx::query(
            "INSERT INTO schedule_metadata (schedule_id, key, value) VALUES ($1, $2, $3)",
        )
        .bind(schedule_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(SchedulerError::duplicate(schedule_id, key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_metadata(&self, schedule_id: &str) -> SchedulerResult<Metadata> {
        self.ensure_exists(schedule_id).await?;
        let mut conn = self.pool.acquire().await?;
        load_metadata(&mut conn, METADATA_TABLE, OWNER_COLUMN, schedule_id).await
    }

    async fn get_metadata(&self, schedule_id: &str, key: &str) -> SchedulerResult<String> {
        self.ensure_exists(schedule_id).await?;
        let value: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM schedule_metadata WHERE schedule_id = $1 AND key = $2",
        )
        .bind(schedule_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        value
            .map(|(v,)| v)
            .ok_or_else(|| SchedulerError::metadata_not_found(schedule_id, key))
    }

    async fn update_metadata(
        &self,
        schedule_id: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<()> {
        self.ensure_exists(schedule_id).await?;
        let result = sqlx::query(
            "UPDATE schedule_metadata SET value = $1 WHERE schedule_id = $2 AND key = $3",
        )
        .bind(value)
        .bind(schedule_id)
        .bind(key)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::metadata_not_found(schedule_id, key));
        }
        Ok(())
    }

    async fn delete_metadata(&self, schedule_id: &str, key: &str) -> SchedulerResult<()> {
        self.ensure_exists(schedule_id).await?;
        let result =
            sqlx::query("DELETE FROM schedule_metadata WHERE schedule_id = $1 AND key = $2")
                .bind(schedule_id)
                .bind(key)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::metadata_not_found(schedule_id, key));
        }
        Ok(())
    }
}
