use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scheduler_core::{SchedulerError, SchedulerResult};

/// 执行节点，存在即表示可以持有租约
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub host: String,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(host: &str, now: DateTime<Utc>) -> SchedulerResult<Self> {
        if host.trim().is_empty() {
            return Err(SchedulerError::validation_error("host 不能为空"));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            host: host.to_string(),
            created_at: now,
        })
    }
}
