use std::sync::Arc;

use tracing::info;

use scheduler_core::{Clock, SchedulerError, SchedulerResult, SharedClock};
use scheduler_domain::{NextJob, PageRequest, Worker, WorkerRepository};

use crate::lease_coordinator::LeaseCoordinator;

pub struct WorkerService {
    workers: Arc<dyn WorkerRepository>,
    coordinator: Arc<LeaseCoordinator>,
    clock: SharedClock,
}

impl WorkerService {
    pub fn new(
        workers: Arc<dyn WorkerRepository>,
        coordinator: Arc<LeaseCoordinator>,
        clock: SharedClock,
    ) -> Self {
        Self {
            workers,
            coordinator,
            clock,
        }
    }

    pub async fn list(&self, page: &PageRequest) -> SchedulerResult<Vec<Worker>> {
        page.validate()?;
        self.workers.list(page).await
    }

    pub async fn create(&self, host: &str) -> SchedulerResult<Worker> {
        let worker = Worker::new(host, self.clock.now())?;
        let worker = self.workers.create(&worker).await?;
        info!("注册Worker {} (host: {})", worker.id, worker.host);
        Ok(worker)
    }

    pub async fn get(&self, id: &str) -> SchedulerResult<Worker> {
        self.workers
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::worker_not_found(id))
    }

    pub async fn delete(&self, id: &str) -> SchedulerResult<()> {
        self.workers.delete(id).await?;
        info!("注销Worker {}", id);
        Ok(())
    }

    /// 租约子资源
    pub async fn next_job(&self, worker_id: &str, action: &str) -> SchedulerResult<NextJob> {
        if action.trim().is_empty() {
            return Err(SchedulerError::validation_error("action 不能为空"));
        }
        self.coordinator.next_job(worker_id, action).await
    }
}
