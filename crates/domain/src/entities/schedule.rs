use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scheduler_core::{SchedulerError, SchedulerResult};

use super::Metadata;
use crate::recurrence::Recurrence;

/// 元数据中标识目标实例的键
pub const INSTANCE_ID_KEY: &str = "instance_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub tenant_id: String,
    pub action: String,
    pub minute: u32,
    pub hour: u32,
    pub day_of_week: Option<u32>,
    pub metadata: Metadata,
    pub next_run: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn recurrence(&self) -> Recurrence {
        Recurrence::new(self.minute, self.hour, self.day_of_week)
    }

    /// 按当前的周期字段重新计算 `next_run`
    pub fn refresh_next_run(&mut self, now: DateTime<Utc>) -> SchedulerResult<()> {
        self.next_run = self.recurrence().next_after(now)?;
        Ok(())
    }
}

/// 创建调度计划的请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSchedule {
    pub tenant_id: String,
    pub action: String,
    pub minute: u32,
    pub hour: u32,
    pub day_of_week: Option<u32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewSchedule {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(SchedulerError::validation_error("tenant_id 不能为空"));
        }
        if self.action.trim().is_empty() {
            return Err(SchedulerError::validation_error("action 不能为空"));
        }
        Recurrence::new(self.minute, self.hour, self.day_of_week).validate()
    }

    pub fn into_schedule(self, now: DateTime<Utc>) -> SchedulerResult<Schedule> {
        self.validate()?;
        let mut schedule = Schedule {
            id: Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id,
            action: self.action,
            minute: self.minute,
            hour: self.hour,
            day_of_week: self.day_of_week,
            metadata: self.metadata,
            next_run: now,
            created_at: now,
            updated_at: now,
        };
        schedule.refresh_next_run(now)?;
        Ok(schedule)
    }
}

/// 调度计划的部分更新，`metadata` 提供时整体替换
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub tenant_id: Option<String>,
    pub action: Option<String>,
    pub minute: Option<u32>,
    pub hour: Option<u32>,
    /// `Some(None)` 表示清除星期限制
    pub day_of_week: Option<Option<u32>>,
    pub metadata: Option<Metadata>,
}

impl ScheduleUpdate {
    pub fn is_empty(&self) -> bool {
        self.tenant_id.is_none()
            && self.action.is_none()
            && self.minute.is_none()
            && self.hour.is_none()
            && self.day_of_week.is_none()
            && self.metadata.is_none()
    }

    pub fn apply_to(self, schedule: &mut Schedule, now: DateTime<Utc>) -> SchedulerResult<()> {
        if self.is_empty() {
            return Err(SchedulerError::validation_error("更新内容不能为空"));
        }
        if let Some(tenant_id) = self.tenant_id {
            schedule.tenant_id = tenant_id;
        }
        if let Some(action) = self.action {
            schedule.action = action;
        }
        if let Some(minute) = self.minute {
            schedule.minute = minute;
        }
        if let Some(hour) = self.hour {
            schedule.hour = hour;
        }
        if let Some(day_of_week) = self.day_of_week {
            schedule.day_of_week = day_of_week;
        }
        if let Some(metadata) = self.metadata {
            schedule.metadata = metadata;
        }
        if schedule.tenant_id.trim().is_empty() || schedule.action.trim().is_empty() {
            return Err(SchedulerError::validation_error("tenant_id 与 action 不能为空"));
        }
        schedule.recurrence().validate()?;
        schedule.refresh_next_run(now)?;
        schedule.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn new_schedule() -> NewSchedule {
        NewSchedule {
            tenant_id: "tenant-1".to_string(),
            action: "snapshot".to_string(),
            minute: 30,
            hour: 12,
            day_of_week: None,
            metadata: Metadata::from([(INSTANCE_ID_KEY.to_string(), "vm-1".to_string())]),
        }
    }

    #[test]
    fn test_into_schedule_computes_next_run() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
        let schedule = new_schedule().into_schedule(now).unwrap();

        assert_eq!(
            schedule.next_run,
            Utc.with_ymd_and_hms(2024, 3, 2, 12, 30, 0).unwrap()
        );
        assert_eq!(schedule.created_at, now);
    }

    #[test]
    fn test_missing_action_rejected() {
        let request = NewSchedule {
            action: " ".to_string(),
            ..new_schedule()
        };
        assert!(matches!(
            request.validate(),
            Err(SchedulerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_update_recomputes_next_run() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut schedule = new_schedule().into_schedule(now).unwrap();

        let update = ScheduleUpdate {
            hour: Some(11),
            minute: Some(15),
            ..Default::default()
        };
        update.apply_to(&mut schedule, now).unwrap();

        assert_eq!(schedule.next_run.hour(), 11);
        assert_eq!(schedule.next_run.minute(), 15);
        assert_eq!(schedule.metadata.len(), 1);
    }

    #[test]
    fn test_update_replaces_metadata() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut schedule = new_schedule().into_schedule(now).unwrap();

        let update = ScheduleUpdate {
            metadata: Some(Metadata::from([("retention".to_string(), "3".to_string())])),
            ..Default::default()
        };
        update.apply_to(&mut schedule, now).unwrap();

        assert!(!schedule.metadata.contains_key(INSTANCE_ID_KEY));
        assert_eq!(schedule.metadata.get("retention").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_empty_update_rejected() {
        let now = Utc::now();
        let mut schedule = new_schedule().into_schedule(now).unwrap();
        assert!(ScheduleUpdate::default().apply_to(&mut schedule, now).is_err());
    }
}
