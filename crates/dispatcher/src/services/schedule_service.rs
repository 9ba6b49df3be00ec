use std::sync::Arc;

use tracing::{info, instrument};

use scheduler_core::{Clock, SchedulerError, SchedulerResult, SharedClock};
use scheduler_domain::{
    JobRepository, JobStatus, Metadata, NewSchedule, PageRequest, Schedule, ScheduleFilter,
    ScheduleRepository, ScheduleUpdate,
};

use super::require_key;

/// 删除调度计划时写入被取消作业的说明
const SCHEDULE_DELETED_MESSAGE: &str = "所属调度计划已删除";

pub struct ScheduleService {
    schedules: Arc<dyn ScheduleRepository>,
    jobs: Arc<dyn JobRepository>,
    clock: SharedClock,
}

impl ScheduleService {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        jobs: Arc<dyn JobRepository>,
        clock: SharedClock,
    ) -> Self {
        Self {
            schedules,
            jobs,
            clock,
        }
    }

    pub async fn list(
        &self,
        filter: &ScheduleFilter,
        page: &PageRequest,
    ) -> SchedulerResult<Vec<Schedule>> {
        filter.validate()?;
        page.validate()?;
        self.schedules.list(filter, page).await
    }

    pub async fn create(&self, request: NewSchedule) -> SchedulerResult<Schedule> {
        let schedule = request.into_schedule(self.clock.now())?;
        let schedule = self.schedules.create(&schedule).await?;
        info!(
            "创建调度计划 {} (action: {}, 下次运行: {})",
            schedule.id, schedule.action, schedule.next_run
        );
        Ok(schedule)
    }

    pub async fn get(&self, id: &str) -> SchedulerResult<Schedule> {
        self.schedules
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::schedule_not_found(id))
    }

    pub async fn update(&self, id: &str, update: ScheduleUpdate) -> SchedulerResult<Schedule> {
        let mut schedule = self.get(id).await?;
        update.apply_to(&mut schedule, self.clock.now())?;
        self.schedules.update(&schedule).await
    }

    /// 删除调度计划并取消尚未被持有的作业
    ///
    /// 处理中的作业由处理框架在下一次处理时发现调度计划缺失后取消。
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> SchedulerResult<()> {
        self.schedules.delete(id).await?;
        let cancelled = self
            .jobs
            .cancel_for_schedule(
                id,
                &[JobStatus::Queued, JobStatus::Error],
                SCHEDULE_DELETED_MESSAGE,
                self.clock.now(),
            )
            .await?;
        info!("删除调度计划 {}，取消了 {} 个作业", id, cancelled);
        Ok(())
    }

    pub async fn create_metadata(
        &self,
        schedule_id: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<Metadata> {
        require_key(key)?;
        self.schedules.create_metadata(schedule_id, key, value).await?;
        Ok(Metadata::from([(key.to_string(), value.to_string())]))
    }

    pub async fn list_metadata(&self, schedule_id: &str) -> SchedulerResult<Metadata> {
        self.schedules.list_metadata(schedule_id).await
    }

    pub async fn get_metadata(&self, schedule_id: &str, key: &str) -> SchedulerResult<String> {
        self.schedules.get_metadata(schedule_id, key).await
    }

    pub async fn update_metadata(
        &self,
        schedule_id: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<Metadata> {
        require_key(key)?;
        self.schedules.update_metadata(schedule_id, key, value).await?;
        Ok(Metadata::from([(key.to_string(), value.to_string())]))
    }

    pub async fn delete_metadata(&self, schedule_id: &str, key: &str) -> SchedulerResult<()> {
        self.schedules.delete_metadata(schedule_id, key).await
    }
}
