//! 查询相关的值对象

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scheduler_core::{SchedulerError, SchedulerResult};

use crate::entities::{Job, JobStatus, Schedule};

/// 基于标记的分页请求
///
/// 结果总是按 `id` 升序排列，`marker` 为上一页最后一条记录的 `id`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: Option<usize>,
    pub marker: Option<String>,
}

impl PageRequest {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            marker: None,
        }
    }

    pub fn after(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.limit == Some(0) {
            return Err(SchedulerError::validation_error("limit 必须大于0"));
        }
        Ok(())
    }

    /// 对已按 `id` 升序排列的记录应用分页
    pub fn apply<T, I, F>(&self, items: I, id_of: F) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> &str,
    {
        let marker = self.marker.as_deref();
        let iter = items
            .into_iter()
            .filter(|item| marker.map_or(true, |m| id_of(item) > m));
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// 调度计划列表过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFilter {
    pub tenant_id: Option<String>,
    pub instance_id: Option<String>,
    pub action: Option<String>,
    /// 包含边界
    pub next_run_after: Option<DateTime<Utc>>,
    /// 单独使用时不包含边界，与 `next_run_after` 同时使用时为闭区间
    pub next_run_before: Option<DateTime<Utc>>,
}

impl ScheduleFilter {
    pub fn validate(&self) -> SchedulerResult<()> {
        if let (Some(after), Some(before)) = (self.next_run_after, self.next_run_before) {
            if after > before {
                return Err(SchedulerError::validation_error(
                    "next_run_after 不能晚于 next_run_before",
                ));
            }
        }
        Ok(())
    }

    pub fn matches(&self, schedule: &Schedule) -> bool {
        if let Some(tenant_id) = &self.tenant_id {
            if &schedule.tenant_id != tenant_id {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &schedule.action != action {
                return false;
            }
        }
        if let Some(instance_id) = &self.instance_id {
            if schedule.metadata.get(crate::entities::INSTANCE_ID_KEY) != Some(instance_id) {
                return false;
            }
        }
        match (self.next_run_after, self.next_run_before) {
            (Some(after), Some(before)) => schedule.next_run >= after && schedule.next_run <= before,
            (Some(after), None) => schedule.next_run >= after,
            (None, Some(before)) => schedule.next_run < before,
            (None, None) => true,
        }
    }
}

/// 作业列表过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub schedule_id: Option<String>,
    pub status: Option<JobStatus>,
    pub worker_id: Option<String>,
    pub action: Option<String>,
}

impl JobFilter {
    pub fn for_schedule(schedule_id: impl Into<String>) -> Self {
        Self {
            schedule_id: Some(schedule_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.schedule_id
            .as_ref()
            .map_or(true, |id| &job.schedule_id == id)
            && self.status.map_or(true, |status| job.status == status)
            && self
                .worker_id
                .as_ref()
                .map_or(true, |id| job.worker_id.as_ref() == Some(id))
            && self.action.as_ref().map_or(true, |a| &job.action == a)
    }
}

/// `next_job` 的返回值，没有可租约作业时 `job` 为空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextJob {
    pub job: Option<Job>,
}

impl NextJob {
    pub fn empty() -> Self {
        Self { job: None }
    }

    pub fn into_job(self) -> Option<Job> {
        self.job
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_applies_marker_and_limit() {
        let ids: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let page = PageRequest::new(2).after("b");
        assert_eq!(page.apply(ids.clone(), |id| id.as_str()), vec!["c", "d"]);

        let unbounded = PageRequest::default();
        assert_eq!(unbounded.apply(ids, |id| id.as_str()).len(), 5);
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(PageRequest::new(0).validate().is_err());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let now = Utc::now();
        let filter = ScheduleFilter {
            next_run_after: Some(now),
            next_run_before: Some(now - chrono::Duration::minutes(1)),
            ..Default::default()
        };
        assert!(filter.validate().is_err());
    }
}
