use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use scheduler_core::config::{duration_from_seconds, LeaseConfig};
use scheduler_core::{Clock, SchedulerError, SchedulerResult, SharedClock};
use scheduler_domain::{
    Job, JobRepository, JobStatus, NextJob, StatusChange, WorkerRepository,
};

/// 并发修改导致条件写入失败时的最大重试次数
const MAX_STATUS_CAS_ATTEMPTS: usize = 8;

/// 租约协调器配置
#[derive(Debug, Clone)]
pub struct LeaseCoordinatorConfig {
    /// `next_job` 授予的租约时长
    pub default_lease: Duration,
}

impl Default for LeaseCoordinatorConfig {
    fn default() -> Self {
        Self {
            default_lease: Duration::hours(1),
        }
    }
}

impl From<&LeaseConfig> for LeaseCoordinatorConfig {
    fn from(config: &LeaseConfig) -> Self {
        Self {
            default_lease: duration_from_seconds(config.default_lease_seconds),
        }
    }
}

/// 作业状态机与租约的唯一仲裁者
pub struct LeaseCoordinator {
    jobs: Arc<dyn JobRepository>,
    workers: Arc<dyn WorkerRepository>,
    clock: SharedClock,
    config: LeaseCoordinatorConfig,
}

impl LeaseCoordinator {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        workers: Arc<dyn WorkerRepository>,
        clock: SharedClock,
        config: LeaseCoordinatorConfig,
    ) -> Self {
        Self {
            jobs,
            workers,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LeaseCoordinatorConfig {
        &self.config
    }

    /// 为Worker租约一个到期的作业，没有可用作业时返回空标记
    #[instrument(skip(self))]
    pub async fn next_job(&self, worker_id: &str, action: &str) -> SchedulerResult<NextJob> {
        if self.workers.get(worker_id).await?.is_none() {
            return Err(SchedulerError::worker_not_found(worker_id));
        }

        let now = self.clock.now();
        let leased = self
            .jobs
            .lease_next(worker_id, action, now, now + self.config.default_lease)
            .await?;

        match leased {
            Some(job) => {
                counter!("scheduler_jobs_leased_total", "action" => action.to_string())
                    .increment(1);
                info!(
                    "Worker {} 获得作业 {} 的租约，到期时间 {}，重试次数 {}",
                    worker_id, job.id, job.timeout, job.retry_count
                );
                Ok(NextJob { job: Some(job) })
            }
            None => {
                debug!("没有可供 {} 租约的 {} 作业", worker_id, action);
                Ok(NextJob::empty())
            }
        }
    }

    /// 记录心跳，只刷新 `updated_at`
    pub async fn heartbeat(&self, job_id: &str) -> SchedulerResult<Job> {
        self.jobs.touch(job_id, self.clock.now()).await
    }

    pub async fn get_heartbeat(&self, job_id: &str) -> SchedulerResult<DateTime<Utc>> {
        Ok(self.get_job(job_id).await?.updated_at)
    }

    /// 按状态机校验后更新作业状态
    ///
    /// 转入 `ERROR` 时 `retry_count` 加一；未提供的 `timeout` 与 `error_message` 保持原值。
    #[instrument(skip(self, error_message))]
    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        timeout: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> SchedulerResult<Job> {
        self.apply_status(job_id, None, status, timeout, error_message)
            .await
    }

    /// 以租约持有者身份更新状态
    ///
    /// 租约已被其他Worker回收时返回 `OutOfTime`，作业保持不变。
    #[instrument(skip(self, error_message))]
    pub async fn report_status(
        &self,
        worker_id: &str,
        job_id: &str,
        status: JobStatus,
        timeout: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> SchedulerResult<Job> {
        self.apply_status(job_id, Some(worker_id), status, timeout, error_message)
            .await
    }

    async fn apply_status(
        &self,
        job_id: &str,
        holder: Option<&str>,
        status: JobStatus,
        timeout: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> SchedulerResult<Job> {
        for attempt in 1..=MAX_STATUS_CAS_ATTEMPTS {
            let mut job = self.get_job(job_id).await?;
            let change = StatusChange {
                status,
                timeout,
                error_message: error_message.clone(),
                increment_retry: status == JobStatus::Error,
                updated_at: self.clock.now(),
                holder: holder.map(str::to_string),
            };
            if let Err(e) = change.validate(&job) {
                if matches!(e, SchedulerError::OutOfTime { .. }) {
                    warn!(
                        "作业 {} 已由 {:?} 持有，拒绝 {:?} 的状态更新",
                        job_id, job.worker_id, holder
                    );
                }
                return Err(e);
            }

            if self.jobs.update_status_if(job_id, job.status, &change).await? {
                counter!("scheduler_job_status_updates_total", "status" => status.as_str())
                    .increment(1);
                debug!("作业 {} 状态 {} -> {}", job_id, job.status, status);
                change.apply_to(&mut job);
                return Ok(job);
            }
            debug!("作业 {} 状态或持有者被并发修改，第 {} 次重试", job_id, attempt);
        }

        warn!("作业 {} 状态更新多次冲突，放弃", job_id);
        Err(SchedulerError::database_error(format!(
            "作业 {job_id} 状态更新冲突"
        )))
    }

    /// 无条件删除作业
    pub async fn delete(&self, job_id: &str) -> SchedulerResult<()> {
        self.jobs.delete(job_id).await?;
        info!("删除作业 {}", job_id);
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> SchedulerResult<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| SchedulerError::job_not_found(job_id))
    }
}
