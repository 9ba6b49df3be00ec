use std::sync::Arc;

use chrono::Duration;

use scheduler_core::{Clock, SharedClock};
use scheduler_dispatcher::{
    JobService, LeaseCoordinator, LeaseCoordinatorConfig, MaterializerConfig,
    ScheduleMaterializer, ScheduleService, WorkerService,
};
use scheduler_domain::{
    ActionStatus, Job, JobEventType, JobRepository, JobStatus, ScheduleRepository,
};
use scheduler_infrastructure::InMemoryStore;
use scheduler_testing_utils::{
    JobBuilder, ManualClock, RecordingNotifier, ScheduleBuilder, ScriptedAction,
};
use scheduler_worker::{
    JobProcessor, LeaseClient, LocalLeaseClient, ProcessOutcome, ProcessorPolicy, StopSignal,
    ACTION_HANDLE_KEY,
};

struct Harness {
    store: Arc<InMemoryStore>,
    clock: ManualClock,
    notifier: Arc<RecordingNotifier>,
    schedules: Arc<ScheduleService>,
    client: Arc<LocalLeaseClient>,
    worker_id: String,
}

async fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = ManualClock::at_epoch();
    let shared: SharedClock = Arc::new(clock.clone());

    let coordinator = Arc::new(LeaseCoordinator::new(
        store.clone(),
        store.clone(),
        shared.clone(),
        LeaseCoordinatorConfig::default(),
    ));
    let materializer = Arc::new(ScheduleMaterializer::new(
        store.clone(),
        store.clone(),
        shared.clone(),
        MaterializerConfig::default(),
    ));
    let workers = Arc::new(WorkerService::new(
        store.clone(),
        coordinator.clone(),
        shared.clone(),
    ));
    let schedules = Arc::new(ScheduleService::new(store.clone(), store.clone(), shared));
    let jobs = Arc::new(JobService::new(
        store.clone(),
        store.clone(),
        coordinator,
        materializer,
    ));
    let client = Arc::new(LocalLeaseClient::new(workers, schedules.clone(), jobs));
    let worker = client.register_worker("compute-01").await.unwrap();

    Harness {
        store,
        clock,
        notifier: Arc::new(RecordingNotifier::new()),
        schedules,
        client,
        worker_id: worker.id,
    }
}

fn fast_policy() -> ProcessorPolicy {
    ProcessorPolicy {
        poll_interval: std::time::Duration::ZERO,
        ..ProcessorPolicy::default()
    }
}

impl Harness {
    async fn seed(&self, customize: impl FnOnce(JobBuilder) -> JobBuilder) -> Job {
        let schedule = ScheduleBuilder::new().build();
        ScheduleRepository::create(self.store.as_ref(), &schedule)
            .await
            .unwrap();
        let job = customize(JobBuilder::for_schedule(&schedule)).build();
        JobRepository::create(self.store.as_ref(), &job)
            .await
            .unwrap();
        job
    }

    async fn lease_as(&self, worker_id: &str) -> Option<Job> {
        self.client.lease(worker_id, "snapshot").await.unwrap()
    }

    async fn lease(&self) -> Job {
        self.lease_as(&self.worker_id)
            .await
            .expect("a due snapshot job")
    }

    fn processor_with(
        &self,
        action: &Arc<ScriptedAction>,
        policy: ProcessorPolicy,
        stop: StopSignal,
    ) -> JobProcessor {
        JobProcessor::new(
            self.worker_id.clone(),
            action.clone(),
            self.client.clone(),
            self.notifier.clone(),
            Arc::new(self.clock.clone()),
            policy,
            stop,
        )
    }

    fn processor(&self, action: &Arc<ScriptedAction>) -> JobProcessor {
        self.processor_with(action, fast_policy(), StopSignal::new())
    }

    async fn stored(&self, id: &str) -> Job {
        JobRepository::get(self.store.as_ref(), id)
            .await
            .unwrap()
            .expect("job exists")
    }
}

#[tokio::test]
async fn test_single_failure_backs_off_then_retries() {
    let h = harness().await;
    let seeded = h.seed(|b| b).await;
    let job = h.lease().await;
    assert_eq!(job.id, seeded.id);

    let failing = Arc::new(ScriptedAction::new("snapshot").then_error("镜像服务不可用"));
    let outcome = h.processor(&failing).process_job(job).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Errored);

    let errored = h.stored(&seeded.id).await;
    assert_eq!(errored.status, JobStatus::Error);
    assert_eq!(errored.retry_count, 1);
    assert_eq!(errored.timeout, h.clock.now() + Duration::hours(1));
    assert!(errored
        .error_message
        .as_deref()
        .unwrap()
        .contains("镜像服务不可用"));

    let events = h.notifier.events();
    assert_eq!(
        h.notifier.event_types(),
        vec![JobEventType::Start, JobEventType::Failed]
    );
    assert!(events[1].error_message().unwrap().contains("镜像服务不可用"));

    assert!(h.lease_as(&h.worker_id).await.is_none());
    h.clock.advance(Duration::hours(1));

    let retried = h.lease().await;
    assert_eq!(retried.id, seeded.id);
    assert_eq!(retried.retry_count, 1);

    let healthy = Arc::new(ScriptedAction::new("snapshot").with_fallback(ActionStatus::Succeeded));
    let outcome = h.processor(&healthy).process_job(retried).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Done);
    assert_eq!(healthy.execute_calls(), 0);
    assert_eq!(h.notifier.count(JobEventType::Retry), 1);
    assert_eq!(h.notifier.count(JobEventType::End), 1);
    assert_eq!(h.stored(&seeded.id).await.status, JobStatus::Done);
}

#[tokio::test]
async fn test_hard_timeout_takes_precedence() {
    let h = harness().await;
    let now = h.clock.now();
    let seeded = h
        .seed(|b| b.with_retry_count(9).with_hard_timeout(now))
        .await;
    let job = h.lease().await;

    let action = Arc::new(ScriptedAction::new("snapshot"));
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::HardTimedOut);
    assert!(action.untouched());
    assert_eq!(h.stored(&seeded.id).await.status, JobStatus::HardTimedOut);
}

#[tokio::test]
async fn test_max_retry_skips_action() {
    let h = harness().await;
    let seeded = h.seed(|b| b.with_retry_count(6)).await;
    let job = h.lease().await;

    let action = Arc::new(ScriptedAction::new("snapshot"));
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::MaxRetried);
    assert!(action.untouched());
    let stored = h.stored(&seeded.id).await;
    assert_eq!(stored.status, JobStatus::MaxRetried);
    assert!(stored.error_message.is_some());
}

#[tokio::test]
async fn test_last_allowed_retry_still_runs() {
    let h = harness().await;
    h.seed(|b| b.with_retry_count(5)).await;
    let job = h.lease().await;

    let action = Arc::new(ScriptedAction::new("snapshot").with_fallback(ActionStatus::Succeeded));
    let outcome = h.processor(&action).process_job(job).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Done);
    assert_eq!(action.execute_calls(), 1);
}

#[tokio::test]
async fn test_deleted_schedule_cancels_processing_job() {
    let h = harness().await;
    let seeded = h.seed(|b| b).await;
    let job = h.lease().await;

    h.schedules.delete(&seeded.schedule_id).await.unwrap();
    assert_eq!(h.stored(&seeded.id).await.status, JobStatus::Processing);

    let action = Arc::new(ScriptedAction::new("snapshot"));
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Cancelled);
    assert!(action.untouched());
    assert_eq!(h.stored(&seeded.id).await.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_missing_required_metadata_cancels() {
    let h = harness().await;
    let seeded = h.seed(|b| b).await;
    let job = h.lease().await;

    let action = Arc::new(ScriptedAction::new("snapshot").requiring("volume_id"));
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Cancelled);
    assert_eq!(action.execute_calls(), 0);
    let stored = h.stored(&seeded.id).await;
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.error_message.unwrap().contains("volume_id"));
}

fn extension_policy() -> ProcessorPolicy {
    ProcessorPolicy {
        initial_timeout: Duration::minutes(10),
        extension_threshold: Duration::minutes(5),
        timeout_extension: Duration::minutes(10),
        timeout_max_updates: 2,
        update_interval: Duration::hours(1),
        ..fast_policy()
    }
}

#[tokio::test]
async fn test_lease_extended_until_budget_spent() {
    let h = harness().await;
    let start = h.clock.now();
    let seeded = h.seed(|b| b).await;
    let job = h.lease().await;

    let action = Arc::new(
        ScriptedAction::new("snapshot").advancing(h.clock.clone(), Duration::minutes(3)),
    );
    let processor = h.processor_with(&action, extension_policy(), StopSignal::new());
    let outcome = processor.process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::TimedOut);
    assert_eq!(action.resume_calls(), 10);
    assert_eq!(h.notifier.count(JobEventType::Update), 2);

    let stored = h.stored(&seeded.id).await;
    assert_eq!(stored.status, JobStatus::TimedOut);
    assert_eq!(stored.timeout, start + Duration::minutes(30));
}

#[tokio::test]
async fn test_extension_then_success() {
    let h = harness().await;
    let start = h.clock.now();
    let seeded = h.seed(|b| b).await;
    let job = h.lease().await;

    let action = Arc::new(
        ScriptedAction::new("snapshot")
            .then_in_progress(6)
            .with_fallback(ActionStatus::Succeeded)
            .advancing(h.clock.clone(), Duration::minutes(3)),
    );
    let processor = h.processor_with(&action, extension_policy(), StopSignal::new());
    let outcome = processor.process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Done);
    assert_eq!(action.resume_calls(), 7);
    assert_eq!(action.success_calls(), 1);
    let stored = h.stored(&seeded.id).await;
    assert_eq!(stored.status, JobStatus::Done);
    assert_eq!(stored.timeout, start + Duration::minutes(30));
}

#[tokio::test]
async fn test_status_only_update_between_extensions() {
    let h = harness().await;
    h.seed(|b| b).await;
    let job = h.lease().await;

    let policy = ProcessorPolicy {
        update_interval: Duration::minutes(5),
        ..fast_policy()
    };
    let action = Arc::new(
        ScriptedAction::new("snapshot")
            .then_in_progress(3)
            .with_fallback(ActionStatus::Succeeded)
            .advancing(h.clock.clone(), Duration::minutes(2)),
    );
    let outcome = h
        .processor_with(&action, policy, StopSignal::new())
        .process_job(job)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Done);
    assert_eq!(
        h.notifier.event_types(),
        vec![JobEventType::Start, JobEventType::Update, JobEventType::End]
    );
}

#[tokio::test]
async fn test_stop_releases_job_with_short_lease() {
    let h = harness().await;
    let seeded = h.seed(|b| b).await;
    let job = h.lease().await;

    let stop = StopSignal::new();
    stop.request_stop();
    let action = Arc::new(ScriptedAction::new("snapshot"));
    let outcome = h
        .processor_with(&action, fast_policy(), stop)
        .process_job(job)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Released);
    assert_eq!(action.execute_calls(), 1);
    assert_eq!(action.resume_calls(), 0);

    let stored = h.stored(&seeded.id).await;
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.timeout, h.clock.now() + Duration::minutes(5));
    assert!(stored.metadata.contains_key(ACTION_HANDLE_KEY));
}

#[tokio::test]
async fn test_stored_handle_is_resumed() {
    let h = harness().await;
    let seeded = h.seed(|b| b.with_metadata(ACTION_HANDLE_KEY, "snap-7")).await;
    let job = h.lease().await;

    let action = Arc::new(
        ScriptedAction::new("snapshot")
            .then_in_progress(1)
            .with_fallback(ActionStatus::Succeeded),
    );
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Done);
    assert_eq!(action.execute_calls(), 0);
    assert_eq!(action.resume_calls(), 2);
    assert_eq!(
        h.stored(&seeded.id).await.metadata.get(ACTION_HANDLE_KEY),
        Some(&"snap-7".to_string())
    );
}

#[tokio::test]
async fn test_resumed_handle_status_is_not_polled_twice() {
    let h = harness().await;
    h.seed(|b| b.with_metadata(ACTION_HANDLE_KEY, "snap-7")).await;
    let job = h.lease().await;

    let action = Arc::new(ScriptedAction::new("snapshot").then_status(ActionStatus::Succeeded));
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Done);
    assert_eq!(action.resume_calls(), 1);
    assert_eq!(action.execute_calls(), 0);
}

#[tokio::test]
async fn test_failed_stored_handle_is_re_executed() {
    let h = harness().await;
    let seeded = h.seed(|b| b.with_metadata(ACTION_HANDLE_KEY, "snap-7")).await;
    let job = h.lease().await;

    let action = Arc::new(
        ScriptedAction::new("snapshot")
            .then_status(ActionStatus::Failed("快照已被删除".to_string()))
            .with_fallback(ActionStatus::Succeeded),
    );
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Done);
    assert_eq!(action.execute_calls(), 1);
    assert_eq!(
        h.stored(&seeded.id).await.metadata.get(ACTION_HANDLE_KEY),
        Some(&format!("{}-handle-1", seeded.id))
    );
}

#[tokio::test]
async fn test_handle_check_error_is_polling_failure() {
    let h = harness().await;
    let seeded = h.seed(|b| b.with_metadata(ACTION_HANDLE_KEY, "snap-7")).await;
    let job = h.lease().await;

    let action = Arc::new(ScriptedAction::new("snapshot").then_error("连接超时"));
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Errored);
    assert_eq!(action.execute_calls(), 0);
    let stored = h.stored(&seeded.id).await;
    assert_eq!(stored.status, JobStatus::Error);
    assert!(stored.error_message.unwrap().contains("连接超时"));
}

#[tokio::test]
async fn test_failing_execute_moves_to_error() {
    let h = harness().await;
    let seeded = h.seed(|b| b).await;
    let job = h.lease().await;

    let action = Arc::new(ScriptedAction::new("snapshot").failing_execute("配额不足"));
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Errored);
    let stored = h.stored(&seeded.id).await;
    assert_eq!(stored.status, JobStatus::Error);
    assert_eq!(stored.retry_count, 1);
    assert!(!stored.metadata.contains_key(ACTION_HANDLE_KEY));
}

#[tokio::test]
async fn test_post_success_failure_still_completes() {
    let h = harness().await;
    let seeded = h.seed(|b| b).await;
    let job = h.lease().await;

    let action = Arc::new(
        ScriptedAction::new("snapshot")
            .with_fallback(ActionStatus::Succeeded)
            .failing_on_success("清理旧快照失败"),
    );
    let outcome = h.processor(&action).process_job(job).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Done);
    assert_eq!(action.success_calls(), 1);
    assert_eq!(h.stored(&seeded.id).await.status, JobStatus::Done);
}

#[tokio::test]
async fn test_reclaimed_lease_is_abandoned() {
    let h = harness().await;
    let seeded = h.seed(|b| b).await;
    let stale = h.lease().await;

    h.clock.advance(Duration::minutes(61));
    let other = h.client.register_worker("compute-02").await.unwrap();
    let reclaimed = h.lease_as(&other.id).await.expect("expired lease is reclaimable");
    assert_eq!(reclaimed.id, seeded.id);
    assert_eq!(reclaimed.retry_count, 1);

    let action = Arc::new(ScriptedAction::new("snapshot"));
    let outcome = h.processor(&action).process_job(stale).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Abandoned);
    assert!(action.untouched());
    let stored = h.stored(&seeded.id).await;
    assert_eq!(stored.worker_id.as_deref(), Some(other.id.as_str()));
    assert_eq!(stored.status, JobStatus::Processing);
}

#[tokio::test]
async fn test_client_heartbeat_refreshes_updated_at_only() {
    let h = harness().await;
    h.seed(|b| b).await;
    let leased = h.lease().await;

    h.clock.advance(Duration::minutes(5));
    h.client.heartbeat(&leased.id).await.unwrap();

    let stored = h.stored(&leased.id).await;
    assert_eq!(stored.updated_at, h.clock.now());
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.timeout, leased.timeout);
    assert_eq!(stored.worker_id, leased.worker_id);

    let missing = h.client.heartbeat("no-such-job").await;
    assert!(matches!(
        missing,
        Err(scheduler_core::SchedulerError::JobNotFound { .. })
    ));
}
