use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scheduler_core::{SchedulerError, SchedulerResult};

use super::{Metadata, Schedule};

/// 作业状态
///
/// `QUEUED` 为初始状态；`ERROR` 之外的终态不再接受任何状态更新。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error,
    TimedOut,
    Cancelled,
    HardTimedOut,
    MaxRetried,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Done,
        JobStatus::Error,
        JobStatus::TimedOut,
        JobStatus::Cancelled,
        JobStatus::HardTimedOut,
        JobStatus::MaxRetried,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Done => "DONE",
            JobStatus::Error => "ERROR",
            JobStatus::TimedOut => "TIMED_OUT",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::HardTimedOut => "HARD_TIMED_OUT",
            JobStatus::MaxRetried => "MAX_RETRIED",
        }
    }

    /// 不允许再发生任何转换的状态
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            JobStatus::Done
                | JobStatus::TimedOut
                | JobStatus::Cancelled
                | JobStatus::HardTimedOut
                | JobStatus::MaxRetried
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Queued => matches!(next, Processing | Cancelled),
            Processing => matches!(
                next,
                Processing | Done | Error | TimedOut | Cancelled | HardTimedOut | MaxRetried
            ),
            Error => matches!(next, Queued | Processing | Cancelled),
            Done | TimedOut | Cancelled | HardTimedOut | MaxRetried => false,
        }
    }

    /// 租约过期后可被其他Worker回收的状态
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, JobStatus::Processing | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SchedulerError::validation_error(format!("未知的作业状态: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub schedule_id: String,
    pub tenant_id: String,
    pub action: String,
    pub worker_id: Option<String>,
    pub status: JobStatus,
    /// 当前租约到期时间
    pub timeout: DateTime<Utc>,
    /// 作业生命周期上限，创建后不可更改
    pub hard_timeout: DateTime<Utc>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// 由调度计划生成一个新的 `QUEUED` 作业，复制调度计划的元数据
    pub fn from_schedule(
        schedule: &Schedule,
        now: DateTime<Utc>,
        timeout: DateTime<Utc>,
        hard_timeout: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            schedule_id: schedule.id.clone(),
            tenant_id: schedule.tenant_id.clone(),
            action: schedule.action.clone(),
            worker_id: None,
            status: JobStatus::Queued,
            timeout,
            hard_timeout,
            retry_count: 0,
            error_message: None,
            metadata: schedule.metadata.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 当前时刻是否可以被 `next_job` 租约
    pub fn is_leasable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Queued => true,
            status if status.is_reclaimable() => self.timeout <= now,
            _ => false,
        }
    }

    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.worker_id.as_deref() == Some(worker_id)
    }
}

/// 一次状态更新请求，由租约协调器校验后交给存储层原子应用
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: JobStatus,
    pub timeout: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub increment_retry: bool,
    pub updated_at: DateTime<Utc>,
    /// 非空时只有该Worker仍持有租约才允许写入
    pub holder: Option<String>,
}

impl StatusChange {
    pub fn validate(&self, job: &Job) -> SchedulerResult<()> {
        if !self.is_held(job) {
            return Err(SchedulerError::out_of_time(job.id.clone()));
        }
        if !job.status.can_transition_to(self.status) {
            return Err(SchedulerError::invalid_state(
                job.id.clone(),
                job.status,
                self.status,
            ));
        }
        Ok(())
    }

    /// 未指定持有者，或作业仍由该持有者租约
    pub fn is_held(&self, job: &Job) -> bool {
        self.holder
            .as_deref()
            .map_or(true, |worker_id| job.is_held_by(worker_id))
    }

    /// 应用到内存中的作业记录，未提供的字段保持不变
    pub fn apply_to(&self, job: &mut Job) {
        job.status = self.status;
        if let Some(timeout) = self.timeout {
            job.timeout = timeout;
        }
        if let Some(message) = &self.error_message {
            job.error_message = Some(message.clone());
        }
        if self.increment_retry {
            job.retry_count = job.retry_count.saturating_add(1);
        }
        job.updated_at = self.updated_at;
    }
}
