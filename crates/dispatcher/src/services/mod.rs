//! 资源操作：Worker、调度计划、作业

mod job_service;
mod schedule_service;
mod worker_service;

pub use job_service::{JobService, JobStatusView};
pub use schedule_service::ScheduleService;
pub use worker_service::WorkerService;

use scheduler_core::{SchedulerError, SchedulerResult};

fn require_key(key: &str) -> SchedulerResult<()> {
    if key.trim().is_empty() {
        return Err(SchedulerError::validation_error("元数据键不能为空"));
    }
    Ok(())
}
