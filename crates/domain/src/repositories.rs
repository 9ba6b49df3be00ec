//! 仓储接口
//!
//! 实体存储是所有持久状态的唯一所有者。实现必须保证 `JobRepository::lease_next`
//! 与 `JobRepository::update_status_if` 各自是一次原子的条件写入。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use scheduler_core::SchedulerResult;

use crate::entities::{Job, JobStatus, Metadata, Schedule, StatusChange, Worker};
use crate::value_objects::{JobFilter, PageRequest, ScheduleFilter};

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn create(&self, worker: &Worker) -> SchedulerResult<Worker>;
    async fn get(&self, id: &str) -> SchedulerResult<Option<Worker>>;
    async fn list(&self, page: &PageRequest) -> SchedulerResult<Vec<Worker>>;
    /// 不存在时返回 `WorkerNotFound`
    async fn delete(&self, id: &str) -> SchedulerResult<()>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, schedule: &Schedule) -> SchedulerResult<Schedule>;
    async fn get(&self, id: &str) -> SchedulerResult<Option<Schedule>>;
    async fn list(
        &self,
        filter: &ScheduleFilter,
        page: &PageRequest,
    ) -> SchedulerResult<Vec<Schedule>>;
    /// 整体覆盖调度计划（包括元数据）
    async fn update(&self, schedule: &Schedule) -> SchedulerResult<Schedule>;
    async fn delete(&self, id: &str) -> SchedulerResult<()>;

    /// 键已存在时返回 `Duplicate`
    async fn create_metadata(
        &self,
        schedule_id: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<()>;
    async fn list_metadata(&self, schedule_id: &str) -> SchedulerResult<Metadata>;
    async fn get_metadata(&self, schedule_id: &str, key: &str) -> SchedulerResult<String>;
    /// 键不存在时返回 `MetadataNotFound`
    async fn update_metadata(
        &self,
        schedule_id: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<()>;
    async fn delete_metadata(&self, schedule_id: &str, key: &str) -> SchedulerResult<()>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> SchedulerResult<Job>;
    async fn get(&self, id: &str) -> SchedulerResult<Option<Job>>;
    async fn list(&self, filter: &JobFilter, page: &PageRequest) -> SchedulerResult<Vec<Job>>;
    async fn delete(&self, id: &str) -> SchedulerResult<()>;

    /// 原子地选取并租约一个作业
    ///
    /// 候选作业：`action` 匹配，且为 `QUEUED`，或为 `PROCESSING`/`ERROR` 且
    /// `timeout <= now`。按 `created_at`、`id` 排序取第一个，写入 `worker_id`、
    /// `PROCESSING` 与 `lease_until`。回收租约过期的 `PROCESSING` 作业时
    /// `retry_count` 加一。
    async fn lease_next(
        &self,
        worker_id: &str,
        action: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> SchedulerResult<Option<Job>>;

    /// 仅当作业当前状态为 `expected` 且仍由 `change.holder`（若指定）持有时应用 `change`
    ///
    /// 返回 `false` 表示状态或持有者已被并发修改；作业不存在时返回 `JobNotFound`。
    async fn update_status_if(
        &self,
        id: &str,
        expected: JobStatus,
        change: &StatusChange,
    ) -> SchedulerResult<bool>;

    /// 刷新 `updated_at`，不改变状态与超时
    async fn touch(&self, id: &str, now: DateTime<Utc>) -> SchedulerResult<Job>;

    /// 合并写入元数据并返回完整的元数据
    async fn merge_metadata(&self, id: &str, entries: &Metadata) -> SchedulerResult<Metadata>;

    /// 把某调度计划下处于 `statuses` 的作业置为 `CANCELLED`，返回受影响的数量
    async fn cancel_for_schedule(
        &self,
        schedule_id: &str,
        statuses: &[JobStatus],
        message: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<u64>;
}
