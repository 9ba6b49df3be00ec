//! 领域实体

mod job;
mod schedule;
mod worker;

use std::collections::BTreeMap;

pub use job::{Job, JobStatus, StatusChange};
pub use schedule::{NewSchedule, Schedule, ScheduleUpdate, INSTANCE_ID_KEY};
pub use worker::Worker;

/// 调度计划或作业的元数据，键唯一
pub type Metadata = BTreeMap<String, String>;
