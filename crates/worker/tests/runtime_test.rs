use std::sync::Arc;
use std::time::Duration;

use scheduler_core::SharedClock;
use scheduler_dispatcher::{
    JobService, LeaseCoordinator, LeaseCoordinatorConfig, MaterializerConfig,
    ScheduleMaterializer, ScheduleService, WorkerService,
};
use scheduler_domain::{
    ActionStatus, JobFilter, JobRepository, JobStatus, PageRequest, ScheduleRepository,
    WorkerRepository,
};
use scheduler_infrastructure::InMemoryStore;
use scheduler_testing_utils::{
    JobBuilder, ManualClock, RecordingNotifier, ScheduleBuilder, ScriptedAction,
};
use scheduler_worker::{
    LocalLeaseClient, ProcessorPolicy, ProcessorRegistry, WorkerRuntime, WorkerRuntimeConfig,
};

fn local_client(store: &Arc<InMemoryStore>, clock: SharedClock) -> Arc<LocalLeaseClient> {
    let coordinator = Arc::new(LeaseCoordinator::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        LeaseCoordinatorConfig::default(),
    ));
    let materializer = Arc::new(ScheduleMaterializer::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        MaterializerConfig::default(),
    ));
    Arc::new(LocalLeaseClient::new(
        Arc::new(WorkerService::new(store.clone(), coordinator.clone(), clock.clone())),
        Arc::new(ScheduleService::new(store.clone(), store.clone(), clock)),
        Arc::new(JobService::new(
            store.clone(),
            store.clone(),
            coordinator,
            materializer,
        )),
    ))
}

async fn all_done(store: &InMemoryStore) -> bool {
    let jobs = JobRepository::list(store, &JobFilter::default(), &PageRequest::default())
        .await
        .unwrap();
    jobs.iter().all(|job| job.status == JobStatus::Done)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slots_drain_queue_then_stop_cleanly() {
    let store = Arc::new(InMemoryStore::new());
    let clock = ManualClock::at_epoch();
    let shared: SharedClock = Arc::new(clock.clone());

    let schedule = ScheduleBuilder::new().build();
    ScheduleRepository::create(store.as_ref(), &schedule)
        .await
        .unwrap();
    for _ in 0..12 {
        let job = JobBuilder::for_schedule(&schedule).build();
        JobRepository::create(store.as_ref(), &job).await.unwrap();
    }

    let action = Arc::new(ScriptedAction::new("snapshot").with_fallback(ActionStatus::Succeeded));
    let mut registry = ProcessorRegistry::new();
    registry.register(action.clone()).unwrap();

    let notifier = Arc::new(RecordingNotifier::new());
    let runtime = Arc::new(WorkerRuntime::new(
        WorkerRuntimeConfig {
            host: "compute-01".to_string(),
            slots: 3,
            actions: vec!["snapshot".to_string()],
            poll_interval: Duration::from_millis(10),
        },
        local_client(&store, shared.clone()),
        registry,
        notifier.clone(),
        shared,
        ProcessorPolicy {
            poll_interval: Duration::ZERO,
            ..ProcessorPolicy::default()
        },
    ));

    let stop = runtime.stop_signal();
    let running = tokio::spawn({
        let runtime = runtime.clone();
        async move { runtime.run().await }
    });

    tokio::time::timeout(Duration::from_secs(10), async {
        while !all_done(&store).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all jobs should complete");

    stop.request_stop();
    let report = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("runtime should stop")
        .unwrap()
        .unwrap();

    assert_eq!(report.processed, 12);
    assert_eq!(action.execute_calls(), 12);
    assert_eq!(action.cleanup_calls(), 1);
    assert_eq!(notifier.count(scheduler_domain::JobEventType::End), 12);

    let workers = WorkerRepository::list(store.as_ref(), &PageRequest::default())
        .await
        .unwrap();
    assert!(workers.is_empty(), "worker is unregistered on stop");
}

#[tokio::test]
async fn test_unregistered_action_rejected_before_registration() {
    let store = Arc::new(InMemoryStore::new());
    let shared: SharedClock = Arc::new(ManualClock::at_epoch());

    let runtime = WorkerRuntime::new(
        WorkerRuntimeConfig {
            host: "compute-01".to_string(),
            slots: 1,
            actions: vec!["resize".to_string()],
            poll_interval: Duration::from_millis(10),
        },
        local_client(&store, shared.clone()),
        ProcessorRegistry::new(),
        Arc::new(RecordingNotifier::new()),
        shared,
        ProcessorPolicy::default(),
    );

    assert!(runtime.run().await.is_err());
    let workers = WorkerRepository::list(store.as_ref(), &PageRequest::default())
        .await
        .unwrap();
    assert!(workers.is_empty());
}
