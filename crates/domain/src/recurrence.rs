use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};

use scheduler_core::{SchedulerError, SchedulerResult};

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// 调度计划的周期字段（分、时、可选的星期，0为周日）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub minute: u32,
    pub hour: u32,
    pub day_of_week: Option<u32>,
}

impl Recurrence {
    pub fn new(minute: u32, hour: u32, day_of_week: Option<u32>) -> Self {
        Self {
            minute,
            hour,
            day_of_week,
        }
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.minute > 59 {
            return Err(SchedulerError::validation_error(format!(
                "minute 超出范围(0-59): {}",
                self.minute
            )));
        }
        if self.hour > 23 {
            return Err(SchedulerError::validation_error(format!(
                "hour 超出范围(0-23): {}",
                self.hour
            )));
        }
        if let Some(day) = self.day_of_week {
            if day > 6 {
                return Err(SchedulerError::validation_error(format!(
                    "day_of_week 超出范围(0-6): {day}"
                )));
            }
        }
        Ok(())
    }

    /// 转换为六段式cron表达式（秒 分 时 日 月 星期）
    pub fn to_cron_expression(&self) -> String {
        let day = match self.day_of_week {
            Some(day) => DAY_NAMES[day as usize % 7].to_string(),
            None => "*".to_string(),
        };
        format!("0 {} {} * * {}", self.minute, self.hour, day)
    }

    /// 严格晚于 `after` 的下一个匹配时刻
    pub fn next_after(&self, after: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
        self.validate()?;
        let expr = self.to_cron_expression();
        let schedule = CronSchedule::from_str(&expr).map_err(|e| SchedulerError::InvalidCron {
            expr: expr.clone(),
            message: e.to_string(),
        })?;

        schedule
            .after(&after)
            .next()
            .ok_or_else(|| SchedulerError::InvalidCron {
                expr,
                message: "没有后续的执行时间".to_string(),
            })
    }
}
