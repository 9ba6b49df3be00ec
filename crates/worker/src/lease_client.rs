//! Worker侧的租约客户端
//!
//! 只做调用与错误映射，不包含任何重试逻辑。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_dispatcher::{JobService, ScheduleService, WorkerService};
use scheduler_domain::{Job, JobStatus, Metadata, Schedule, Worker};

#[async_trait]
pub trait LeaseClient: Send + Sync {
    async fn register_worker(&self, host: &str) -> SchedulerResult<Worker>;

    async fn unregister_worker(&self, worker_id: &str) -> SchedulerResult<()>;

    /// 没有到期作业时返回 `None`
    async fn lease(&self, worker_id: &str, action: &str) -> SchedulerResult<Option<Job>>;

    async fn heartbeat(&self, job_id: &str) -> SchedulerResult<()>;

    /// 以持有者身份上报状态，租约已被他人回收时返回 `OutOfTime`
    async fn report(
        &self,
        worker_id: &str,
        job_id: &str,
        status: JobStatus,
        timeout: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> SchedulerResult<Job>;

    async fn get_metadata(&self, job_id: &str) -> SchedulerResult<Metadata>;

    async fn update_metadata(&self, job_id: &str, entries: &Metadata)
        -> SchedulerResult<Metadata>;

    /// 调度计划已删除时返回 `None`
    async fn get_schedule(&self, schedule_id: &str) -> SchedulerResult<Option<Schedule>>;
}

/// 与调度服务运行在同一进程内的租约客户端
pub struct LocalLeaseClient {
    workers: Arc<WorkerService>,
    schedules: Arc<ScheduleService>,
    jobs: Arc<JobService>,
}

impl LocalLeaseClient {
    pub fn new(
        workers: Arc<WorkerService>,
        schedules: Arc<ScheduleService>,
        jobs: Arc<JobService>,
    ) -> Self {
        Self {
            workers,
            schedules,
            jobs,
        }
    }
}

#[async_trait]
impl LeaseClient for LocalLeaseClient {
    async fn register_worker(&self, host: &str) -> SchedulerResult<Worker> {
        self.workers.create(host).await
    }

    async fn unregister_worker(&self, worker_id: &str) -> SchedulerResult<()> {
        self.workers.delete(worker_id).await
    }

    async fn lease(&self, worker_id: &str, action: &str) -> SchedulerResult<Option<Job>> {
        Ok(self.workers.next_job(worker_id, action).await?.into_job())
    }

    async fn heartbeat(&self, job_id: &str) -> SchedulerResult<()> {
        self.jobs.heartbeat(job_id).await.map(|_| ())
    }

    async fn report(
        &self,
        worker_id: &str,
        job_id: &str,
        status: JobStatus,
        timeout: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> SchedulerResult<Job> {
        let job = self
            .jobs
            .report_status(worker_id, job_id, status, timeout, error_message)
            .await?;
        debug!("[{}] 作业 {} 上报状态 {}", worker_id, job_id, status);
        Ok(job)
    }

    async fn get_metadata(&self, job_id: &str) -> SchedulerResult<Metadata> {
        self.jobs.list_metadata(job_id).await
    }

    async fn update_metadata(
        &self,
        job_id: &str,
        entries: &Metadata,
    ) -> SchedulerResult<Metadata> {
        self.jobs.update_metadata(job_id, entries).await
    }

    async fn get_schedule(&self, schedule_id: &str) -> SchedulerResult<Option<Schedule>> {
        match self.schedules.get(schedule_id).await {
            Ok(schedule) => Ok(Some(schedule)),
            Err(SchedulerError::ScheduleNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
