//! 作业通知事件
//!
//! 通知的传输方式由 `Notifier` 的实现决定。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scheduler_core::SchedulerResult;

use crate::entities::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEventType {
    #[serde(rename = "job.start")]
    Start,
    #[serde(rename = "job.retry")]
    Retry,
    #[serde(rename = "job.update")]
    Update,
    #[serde(rename = "job.end")]
    End,
    #[serde(rename = "job.failed")]
    Failed,
}

impl JobEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventType::Start => "job.start",
            JobEventType::Retry => "job.retry",
            JobEventType::Update => "job.update",
            JobEventType::End => "job.end",
            JobEventType::Failed => "job.failed",
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            JobEventType::Failed => EventLevel::Error,
            _ => EventLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub event_type: JobEventType,
    pub level: EventLevel,
    pub job_id: String,
    pub schedule_id: String,
    pub tenant_id: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(event_type: JobEventType, job: &Job, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            level: event_type.level(),
            job_id: job.id.clone(),
            schedule_id: job.schedule_id.clone(),
            tenant_id: job.tenant_id.clone(),
            action: job.action.clone(),
            payload: serde_json::json!({
                "status": job.status,
                "retry_count": job.retry_count,
                "timeout": job.timeout,
            }),
            occurred_at,
        }
    }

    pub fn with_payload_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let Some(map) = self.payload.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("error_message").and_then(|v| v.as_str())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: JobEvent) -> SchedulerResult<()>;
}
