use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{
    Job, JobFilter, JobRepository, JobStatus, Metadata, PageRequest, ScheduleRepository,
};

use crate::lease_coordinator::LeaseCoordinator;
use crate::materializer::ScheduleMaterializer;

use super::require_key;

/// 作业状态子资源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: String,
    pub status: JobStatus,
    pub timeout: DateTime<Utc>,
    pub hard_timeout: DateTime<Utc>,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            timeout: job.timeout,
            hard_timeout: job.hard_timeout,
            worker_id: job.worker_id.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

pub struct JobService {
    jobs: Arc<dyn JobRepository>,
    schedules: Arc<dyn ScheduleRepository>,
    coordinator: Arc<LeaseCoordinator>,
    materializer: Arc<ScheduleMaterializer>,
}

impl JobService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        schedules: Arc<dyn ScheduleRepository>,
        coordinator: Arc<LeaseCoordinator>,
        materializer: Arc<ScheduleMaterializer>,
    ) -> Self {
        Self {
            jobs,
            schedules,
            coordinator,
            materializer,
        }
    }

    pub async fn list(&self, filter: &JobFilter, page: &PageRequest) -> SchedulerResult<Vec<Job>> {
        page.validate()?;
        self.jobs.list(filter, page).await
    }

    pub async fn get(&self, id: &str) -> SchedulerResult<Job> {
        self.coordinator.get_job(id).await
    }

    /// 由调度计划立即生成一个作业
    pub async fn create(&self, schedule_id: &str) -> SchedulerResult<Job> {
        if schedule_id.trim().is_empty() {
            return Err(SchedulerError::validation_error("schedule_id 不能为空"));
        }
        let schedule = self
            .schedules
            .get(schedule_id)
            .await?
            .ok_or_else(|| SchedulerError::schedule_not_found(schedule_id))?;
        self.materializer.spawn_job(&schedule).await
    }

    pub async fn delete(&self, id: &str) -> SchedulerResult<()> {
        self.coordinator.delete(id).await
    }

    pub async fn get_status(&self, id: &str) -> SchedulerResult<JobStatusView> {
        let job = self.coordinator.get_job(id).await?;
        Ok(JobStatusView::from(&job))
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        timeout: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> SchedulerResult<JobStatusView> {
        let job = self
            .coordinator
            .update_status(id, status, timeout, error_message)
            .await?;
        Ok(JobStatusView::from(&job))
    }

    /// Worker上报状态，只在租约仍归该Worker时生效
    pub async fn report_status(
        &self,
        worker_id: &str,
        id: &str,
        status: JobStatus,
        timeout: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> SchedulerResult<Job> {
        self.coordinator
            .report_status(worker_id, id, status, timeout, error_message)
            .await
    }

    pub async fn heartbeat(&self, id: &str) -> SchedulerResult<DateTime<Utc>> {
        Ok(self.coordinator.heartbeat(id).await?.updated_at)
    }

    pub async fn get_heartbeat(&self, id: &str) -> SchedulerResult<DateTime<Utc>> {
        self.coordinator.get_heartbeat(id).await
    }

    pub async fn list_metadata(&self, id: &str) -> SchedulerResult<Metadata> {
        Ok(self.coordinator.get_job(id).await?.metadata)
    }

    pub async fn get_metadata(&self, id: &str, key: &str) -> SchedulerResult<String> {
        self.list_metadata(id)
            .await?
            .remove(key)
            .ok_or_else(|| SchedulerError::metadata_not_found(id, key))
    }

    /// 合并写入元数据，返回完整的元数据
    pub async fn update_metadata(&self, id: &str, entries: &Metadata) -> SchedulerResult<Metadata> {
        for key in entries.keys() {
            require_key(key)?;
        }
        self.jobs.merge_metadata(id, entries).await
    }
}
