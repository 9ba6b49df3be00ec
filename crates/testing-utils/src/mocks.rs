//! Test doubles for the notification port and external actions

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{ActionHandler, ActionStatus, Job, JobEvent, JobEventType, Notifier};

use crate::clock::ManualClock;

/// Notifier that keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<JobEventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type)
            .collect()
    }

    pub fn count(&self, event_type: JobEventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: JobEvent) -> SchedulerResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// One scripted answer to `resume`
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Status(ActionStatus),
    Error(String),
}

/// External action whose status answers are scripted up front.
///
/// Each `resume` call pops the next step; once the script is exhausted the
/// fallback status is returned. When a clock step is configured every
/// `resume` call also advances the manual clock, which lets tests walk a job
/// through lease extensions without sleeping.
#[derive(Debug)]
pub struct ScriptedAction {
    action: String,
    required: Vec<String>,
    script: Mutex<VecDeque<ScriptStep>>,
    fallback: ActionStatus,
    execute_error: Option<String>,
    success_error: Option<String>,
    clock_step: Option<(ManualClock, Duration)>,
    execute_calls: AtomicUsize,
    resume_calls: AtomicUsize,
    success_calls: AtomicUsize,
    cleanup_calls: AtomicUsize,
}

impl ScriptedAction {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            required: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            fallback: ActionStatus::InProgress,
            execute_error: None,
            success_error: None,
            clock_step: None,
            execute_calls: AtomicUsize::new(0),
            resume_calls: AtomicUsize::new(0),
            success_calls: AtomicUsize::new(0),
            cleanup_calls: AtomicUsize::new(0),
        }
    }

    pub fn requiring(mut self, key: &str) -> Self {
        self.required.push(key.to_string());
        self
    }

    pub fn then_status(self, status: ActionStatus) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptStep::Status(status));
        self
    }

    pub fn then_in_progress(self, times: usize) -> Self {
        for _ in 0..times {
            self.script
                .lock()
                .unwrap()
                .push_back(ScriptStep::Status(ActionStatus::InProgress));
        }
        self
    }

    pub fn then_error(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptStep::Error(message.to_string()));
        self
    }

    pub fn with_fallback(mut self, status: ActionStatus) -> Self {
        self.fallback = status;
        self
    }

    pub fn failing_execute(mut self, message: &str) -> Self {
        self.execute_error = Some(message.to_string());
        self
    }

    pub fn failing_on_success(mut self, message: &str) -> Self {
        self.success_error = Some(message.to_string());
        self
    }

    pub fn advancing(mut self, clock: ManualClock, step: Duration) -> Self {
        self.clock_step = Some((clock, step));
        self
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn resume_calls(&self) -> usize {
        self.resume_calls.load(Ordering::SeqCst)
    }

    pub fn success_calls(&self) -> usize {
        self.success_calls.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> usize {
        self.cleanup_calls.load(Ordering::SeqCst)
    }

    /// True when the action was never contacted
    pub fn untouched(&self) -> bool {
        self.execute_calls() == 0 && self.resume_calls() == 0
    }
}

#[async_trait]
impl ActionHandler for ScriptedAction {
    fn action(&self) -> &str {
        &self.action
    }

    fn required_metadata(&self) -> Vec<String> {
        self.required.clone()
    }

    async fn execute(&self, job: &Job) -> SchedulerResult<String> {
        let n = self.execute_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(message) = &self.execute_error {
            return Err(SchedulerError::Internal(message.clone()));
        }
        Ok(format!("{}-handle-{}", job.id, n))
    }

    async fn resume(&self, _job: &Job, _handle: &str) -> SchedulerResult<ActionStatus> {
        self.resume_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((clock, step)) = &self.clock_step {
            clock.advance(*step);
        }
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(ScriptStep::Status(status)) => Ok(status),
            Some(ScriptStep::Error(message)) => Err(SchedulerError::polling(message)),
            None => Ok(self.fallback.clone()),
        }
    }

    async fn on_success(&self, _job: &Job, _handle: &str) -> SchedulerResult<()> {
        self.success_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.success_error {
            return Err(SchedulerError::Internal(message.clone()));
        }
        Ok(())
    }

    async fn cleanup(&self) {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
    }
}
