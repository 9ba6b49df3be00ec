//! Test data builders for creating test entities
//!
//! Builders start from sensible defaults anchored at the manual clock's epoch
//! so tests only spell out what they care about.

use chrono::{DateTime, Duration, TimeZone, Utc};
use scheduler_domain::{Job, JobStatus, Metadata, Schedule, INSTANCE_ID_KEY};
use uuid::Uuid;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Builder for creating test Schedule entities
pub struct ScheduleBuilder {
    schedule: Schedule,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        let now = epoch();
        Self {
            schedule: Schedule {
                id: Uuid::new_v4().to_string(),
                tenant_id: "tenant-1".to_string(),
                action: "snapshot".to_string(),
                minute: 30,
                hour: 12,
                day_of_week: None,
                metadata: Metadata::from([(INSTANCE_ID_KEY.to_string(), "instance-1".to_string())]),
                next_run: now + Duration::hours(12) + Duration::minutes(30),
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.schedule.id = id.to_string();
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.schedule.tenant_id = tenant_id.to_string();
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.schedule.action = action.to_string();
        self
    }

    pub fn with_time(mut self, hour: u32, minute: u32) -> Self {
        self.schedule.hour = hour;
        self.schedule.minute = minute;
        self
    }

    pub fn with_day_of_week(mut self, day: u32) -> Self {
        self.schedule.day_of_week = Some(day);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.schedule
            .metadata
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.schedule.metadata.clear();
        self
    }

    pub fn with_next_run(mut self, next_run: DateTime<Utc>) -> Self {
        self.schedule.next_run = next_run;
        self
    }

    pub fn build(self) -> Schedule {
        self.schedule
    }
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Job entities
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        let now = epoch();
        Self {
            job: Job {
                id: Uuid::new_v4().to_string(),
                schedule_id: Uuid::new_v4().to_string(),
                tenant_id: "tenant-1".to_string(),
                action: "snapshot".to_string(),
                worker_id: None,
                status: JobStatus::Queued,
                timeout: now + Duration::hours(1),
                hard_timeout: now + Duration::hours(24),
                retry_count: 0,
                error_message: None,
                metadata: Metadata::from([(INSTANCE_ID_KEY.to_string(), "instance-1".to_string())]),
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// A queued job copied from the given schedule
    pub fn for_schedule(schedule: &Schedule) -> Self {
        Self::new()
            .with_schedule_id(&schedule.id)
            .with_action(&schedule.action)
            .with_tenant(&schedule.tenant_id)
            .with_metadata_map(schedule.metadata.clone())
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.job.id = id.to_string();
        self
    }

    pub fn with_schedule_id(mut self, schedule_id: &str) -> Self {
        self.job.schedule_id = schedule_id.to_string();
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.job.tenant_id = tenant_id.to_string();
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.job.action = action.to_string();
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_worker(mut self, worker_id: &str) -> Self {
        self.job.worker_id = Some(worker_id.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: DateTime<Utc>) -> Self {
        self.job.timeout = timeout;
        self
    }

    pub fn with_hard_timeout(mut self, hard_timeout: DateTime<Utc>) -> Self {
        self.job.hard_timeout = hard_timeout;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.job.retry_count = retry_count;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.job.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.job.metadata = metadata;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.job.created_at = created_at;
        self.job.updated_at = created_at;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}
