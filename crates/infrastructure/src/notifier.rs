//! 作业通知的传输实现

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info};

use scheduler_core::SchedulerResult;
use scheduler_domain::{EventLevel, JobEvent, Notifier};

/// 以结构化日志输出通知
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: JobEvent) -> SchedulerResult<()> {
        let payload = serde_json::to_string(&event.payload)?;
        match event.level {
            EventLevel::Info => info!(
                event_type = event.event_type.as_str(),
                job_id = %event.job_id,
                tenant_id = %event.tenant_id,
                action = %event.action,
                payload = %payload,
                "作业通知"
            ),
            EventLevel::Error => error!(
                event_type = event.event_type.as_str(),
                job_id = %event.job_id,
                tenant_id = %event.tenant_id,
                action = %event.action,
                payload = %payload,
                "作业通知"
            ),
        }
        Ok(())
    }
}

/// 进程内广播通知，没有订阅者时事件被丢弃
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<JobEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: JobEvent) -> SchedulerResult<()> {
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use scheduler_domain::JobEventType;
    use scheduler_testing_utils::JobBuilder;

    fn failed_event() -> JobEvent {
        let job = JobBuilder::new().with_id("job-1").build();
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        JobEvent::new(JobEventType::Failed, &job, at)
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.notify(failed_event()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.job_id, "job-1");
        assert_eq!(received.level, EventLevel::Error);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::default();
        assert!(notifier.notify(failed_event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_tracing_notifier_accepts_events() {
        assert!(TracingNotifier.notify(failed_event()).await.is_ok());
    }
}
