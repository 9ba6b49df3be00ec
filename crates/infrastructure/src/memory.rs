//! 内存实体存储
//!
//! 所有实体放在同一把读写锁之后，租约选取与写入在一次写锁持有期间完成。

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{
    Job, JobFilter, JobRepository, JobStatus, Metadata, PageRequest, Schedule, ScheduleFilter,
    ScheduleRepository, StatusChange, Worker, WorkerRepository,
};

#[derive(Debug, Default)]
struct StoreState {
    workers: BTreeMap<String, Worker>,
    schedules: BTreeMap<String, Schedule>,
    jobs: BTreeMap<String, Job>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRepository for InMemoryStore {
    async fn create(&self, worker: &Worker) -> SchedulerResult<Worker> {
        let mut state = self.state.write().await;
        state.workers.insert(worker.id.clone(), worker.clone());
        Ok(worker.clone())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<Worker>> {
        Ok(self.state.read().await.workers.get(id).cloned())
    }

    async fn list(&self, page: &PageRequest) -> SchedulerResult<Vec<Worker>> {
        let state = self.state.read().await;
        Ok(page.apply(state.workers.values().cloned(), |w| w.id.as_str()))
    }

    async fn delete(&self, id: &str) -> SchedulerResult<()> {
        self.state
            .write()
            .await
            .workers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::worker_not_found(id))
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryStore {
    async fn create(&self, schedule: &Schedule) -> SchedulerResult<Schedule> {
        let mut state = self.state.write().await;
        state
            .schedules
            .insert(schedule.id.clone(), schedule.clone());
        Ok(schedule.clone())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<Schedule>> {
        Ok(self.state.read().await.schedules.get(id).cloned())
    }

    async fn list(
        &self,
        filter: &ScheduleFilter,
        page: &PageRequest,
    ) -> SchedulerResult<Vec<Schedule>> {
        let state = self.state.read().await;
        let matching = state
            .schedules
            .values()
            .filter(|s| filter.matches(s))
            .cloned();
        Ok(page.apply(matching, |s| s.id.as_str()))
    }

    async fn update(&self, schedule: &Schedule) -> SchedulerResult<Schedule> {
        let mut state = self.state.write().await;
        let existing = state
            .schedules
            .get_mut(&schedule.id)
            .ok_or_else(|| SchedulerError::schedule_not_found(&schedule.id))?;
        *existing = schedule.clone();
        Ok(schedule.clone())
    }

    async fn delete(&self, id: &str) -> SchedulerResult<()> {
        self.state
            .write()
            .await
            .schedules
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::schedule_not_found(id))
    }

    async fn create_metadata(
        &self,
        schedule_id: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let schedule = state
            .schedules
            .get_mut(schedule_id)
            .ok_or_else(|| SchedulerError::schedule_not_found(schedule_id))?;
        if schedule.metadata.contains_key(key) {
            return Err(SchedulerError::duplicate(schedule_id, key));
        }
        schedule
            .metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list_metadata(&self, schedule_id: &str) -> SchedulerResult<Metadata> {
        let state = self.state.read().await;
        state
            .schedules
            .get(schedule_id)
            .map(|s| s.metadata.clone())
            .ok_or_else(|| SchedulerError::schedule_not_found(schedule_id))
    }

    async fn get_metadata(&self, schedule_id: &str, key: &str) -> SchedulerResult<String> {
        let state = self.state.read().await;
        let schedule = state
            .schedules
            .get(schedule_id)
            .ok_or_else(|| SchedulerError::schedule_not_found(schedule_id))?;
        schedule
            .metadata
            .get(key)
            .cloned()
            .ok_or_else(|| SchedulerError::metadata_not_found(schedule_id, key))
    }

    async fn update_metadata(
        &self,
        schedule_id: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let schedule = state
            .schedules
            .get_mut(schedule_id)
            .ok_or_else(|| SchedulerError::schedule_not_found(schedule_id))?;
        let entry = schedule
            .metadata
            .get_mut(key)
            .ok_or_else(|| SchedulerError::metadata_not_found(schedule_id, key))?;
        *entry = value.to_string();
        Ok(())
    }

    async fn delete_metadata(&self, schedule_id: &str, key: &str) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let schedule = state
            .schedules
            .get_mut(schedule_id)
            .ok_or_else(|| SchedulerError::schedule_not_found(schedule_id))?;
        schedule
            .metadata
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::metadata_not_found(schedule_id, key))
    }
}

#[async_trait]
impl JobRepository for InMemoryStore {
    async fn create(&self, job: &Job) -> SchedulerResult<Job> {
        let mut state = self.state.write().await;
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(job.clone())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<Job>> {
        Ok(self.state.read().await.jobs.get(id).cloned())
    }

    async fn list(&self, filter: &JobFilter, page: &PageRequest) -> SchedulerResult<Vec<Job>> {
        let state = self.state.read().await;
        let matching = state.jobs.values().filter(|j| filter.matches(j)).cloned();
        Ok(page.apply(matching, |j| j.id.as_str()))
    }

    async fn delete(&self, id: &str) -> SchedulerResult<()> {
        self.state
            .write()
            .await
            .jobs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::job_not_found(id))
    }

    async fn lease_next(
        &self,
        worker_id: &str,
        action: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> SchedulerResult<Option<Job>> {
        let mut state = self.state.write().await;
        let candidate = state
            .jobs
            .values()
            .filter(|job| job.action == action && job.is_leasable(now))
            .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
            .map(|job| job.id.clone());

        let Some(job_id) = candidate else {
            return Ok(None);
        };
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| SchedulerError::job_not_found(&job_id))?;

        if job.status == JobStatus::Processing {
            job.retry_count = job.retry_count.saturating_add(1);
            debug!("回收租约过期的作业 {}，原持有者 {:?}", job.id, job.worker_id);
        }
        job.worker_id = Some(worker_id.to_string());
        job.status = JobStatus::Processing;
        job.timeout = lease_until;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn update_status_if(
        &self,
        id: &str,
        expected: JobStatus,
        change: &StatusChange,
    ) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::job_not_found(id))?;
        if job.status != expected || !change.is_held(job) {
            return Ok(false);
        }
        change.apply_to(job);
        Ok(true)
    }

    async fn touch(&self, id: &str, now: DateTime<Utc>) -> SchedulerResult<Job> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::job_not_found(id))?;
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn merge_metadata(&self, id: &str, entries: &Metadata) -> SchedulerResult<Metadata> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::job_not_found(id))?;
        job.metadata
            .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(job.metadata.clone())
    }

    async fn cancel_for_schedule(
        &self,
        schedule_id: &str,
        statuses: &[JobStatus],
        message: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<u64> {
        let mut state = self.state.write().await;
        let mut cancelled = 0;
        for job in state
            .jobs
            .values_mut()
            .filter(|j| j.schedule_id == schedule_id && statuses.contains(&j.status))
        {
            job.status = JobStatus::Cancelled;
            job.error_message = Some(message.to_string());
            job.updated_at = now;
            cancelled += 1;
        }
        Ok(cancelled)
    }
}
