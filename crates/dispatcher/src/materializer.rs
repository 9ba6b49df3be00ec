use std::sync::Arc;

use chrono::Duration;
use metrics::counter;
use tracing::{info, instrument};

use scheduler_core::config::{duration_from_seconds, JobConfig};
use scheduler_core::{Clock, SchedulerResult, SharedClock};
use scheduler_domain::{Job, JobRepository, Schedule, ScheduleRepository};

#[derive(Debug, Clone)]
pub struct MaterializerConfig {
    /// 作业最长生命周期
    pub max_job_lifetime: Duration,
    pub initial_timeout: Duration,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            max_job_lifetime: Duration::hours(24),
            initial_timeout: Duration::hours(1),
        }
    }
}

impl From<&JobConfig> for MaterializerConfig {
    fn from(config: &JobConfig) -> Self {
        Self {
            max_job_lifetime: duration_from_seconds(config.hard_timeout_seconds),
            initial_timeout: duration_from_seconds(config.initial_timeout_seconds),
        }
    }
}

/// 把调度计划物化为作业
///
/// 每次调用恰好生成一个新的 `QUEUED` 作业，不做去重，避免重复生成由调用方负责。
pub struct ScheduleMaterializer {
    schedules: Arc<dyn ScheduleRepository>,
    jobs: Arc<dyn JobRepository>,
    clock: SharedClock,
    config: MaterializerConfig,
}

impl ScheduleMaterializer {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        jobs: Arc<dyn JobRepository>,
        clock: SharedClock,
        config: MaterializerConfig,
    ) -> Self {
        Self {
            schedules,
            jobs,
            clock,
            config,
        }
    }

    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id))]
    pub async fn spawn_job(&self, schedule: &Schedule) -> SchedulerResult<Job> {
        let now = self.clock.now();
        let job = Job::from_schedule(
            schedule,
            now,
            now + self.config.initial_timeout,
            now + self.config.max_job_lifetime,
        );
        let job = self.jobs.create(&job).await?;
        counter!("scheduler_jobs_spawned_total", "action" => job.action.clone()).increment(1);

        let mut refreshed = schedule.clone();
        refreshed.refresh_next_run(now)?;
        refreshed.updated_at = now;
        self.schedules.update(&refreshed).await?;

        info!(
            "由调度计划 {} 生成作业 {}，下次运行时间 {}",
            schedule.id, job.id, refreshed.next_run
        );
        Ok(job)
    }
}
