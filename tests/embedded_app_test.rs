use std::sync::Arc;
use std::time::Duration;

use job_lease_scheduler::{AppConfig, EmbeddedApplication};
use scheduler_domain::{
    ActionStatus, JobEventType, JobStatus, Metadata, NewSchedule, INSTANCE_ID_KEY,
};
use scheduler_testing_utils::{RecordingNotifier, ScriptedAction};

fn snapshot_schedule() -> NewSchedule {
    NewSchedule {
        tenant_id: "tenant-a".to_string(),
        action: "snapshot".to_string(),
        minute: 0,
        hour: 3,
        day_of_week: Some(0),
        metadata: Metadata::from([(INSTANCE_ID_KEY.to_string(), "vm-1".to_string())]),
    }
}

fn memory_config() -> AppConfig {
    AppConfig::from_toml_str(
        r#"
        [database]
        backend = "memory"

        [worker]
        host = "embedded-test"
        slots = 2
        actions = ["snapshot"]
        poll_interval_ms = 20
        "#,
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_embedded_worker_completes_spawned_job() {
    let action = Arc::new(ScriptedAction::new("snapshot").with_fallback(ActionStatus::Succeeded));
    let notifier = Arc::new(RecordingNotifier::new());
    let app = EmbeddedApplication::new(memory_config());
    let _ = app.init_logging();
    let app = app
        .with_action(action.clone())
        .unwrap()
        .with_notifier(notifier.clone())
        .start()
        .await
        .unwrap();

    let schedule = app.schedules().create(snapshot_schedule()).await.unwrap();
    let job = app.jobs().create(&schedule.id).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = app.jobs().get_status(&job.id).await.unwrap();
            if status.status == JobStatus::Done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("job should be processed by the embedded worker");

    let report = app.shutdown().await.unwrap().expect("worker report");
    assert_eq!(report.processed, 1);
    assert_eq!(action.execute_calls(), 1);
    assert_eq!(action.cleanup_calls(), 1);
    assert_eq!(notifier.count(JobEventType::Start), 1);
    assert_eq!(notifier.count(JobEventType::End), 1);
}

#[tokio::test]
async fn test_unimplemented_action_rejected_at_start() {
    let result = EmbeddedApplication::new(memory_config())
        .with_action(Arc::new(ScriptedAction::new("backup")))
        .unwrap()
        .start()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_sqlite_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("scheduler.db").display());
    let config = AppConfig::from_toml_str(&format!(
        r#"
        [database]
        backend = "sqlite"
        url = "{url}"
        "#
    ))
    .unwrap();

    let app = EmbeddedApplication::new(config.clone()).start().await.unwrap();
    let schedule = app.schedules().create(snapshot_schedule()).await.unwrap();
    let job = app.jobs().create(&schedule.id).await.unwrap();
    let worker = app.workers().create("compute-01").await.unwrap();
    let leased = app
        .workers()
        .next_job(&worker.id, "snapshot")
        .await
        .unwrap()
        .into_job()
        .unwrap();
    assert_eq!(leased.id, job.id);
    assert!(app.shutdown().await.unwrap().is_none());

    let app = EmbeddedApplication::new(config).start().await.unwrap();
    let stored = app.jobs().get(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.worker_id.as_deref(), Some(worker.id.as_str()));
    assert_eq!(
        stored.metadata.get(INSTANCE_ID_KEY).map(String::as_str),
        Some("vm-1")
    );
    assert_eq!(
        app.schedules().get(&schedule.id).await.unwrap().next_run,
        schedule.next_run
    );
    app.shutdown().await.unwrap();
}
