//! 作业处理框架
//!
//! 包裹具体外部操作的通用执行流程：硬超时与重试上限检查、外部操作句柄的持久化与恢复、
//! 轮询期间的租约续期、失败退避以及通知发送。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, error, info, warn};

use scheduler_core::{Clock, SchedulerError, SchedulerResult, SharedClock};
use scheduler_domain::{
    ActionHandler, ActionStatus, Job, JobEvent, JobEventType, JobStatus, Metadata, Notifier,
};

use crate::lease_client::LeaseClient;
use crate::policy::ProcessorPolicy;
use crate::renewal::{JobRun, RenewalDecision};
use crate::stop::StopSignal;

/// 作业元数据中保存外部操作句柄的键
pub const ACTION_HANDLE_KEY: &str = "action_handle";

/// 一次处理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Done,
    Errored,
    TimedOut,
    HardTimedOut,
    MaxRetried,
    Cancelled,
    /// Worker停止，作业以短租约交还
    Released,
    /// 租约已被其他Worker回收
    Abandoned,
}

impl ProcessOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessOutcome::Done => "done",
            ProcessOutcome::Errored => "errored",
            ProcessOutcome::TimedOut => "timed_out",
            ProcessOutcome::HardTimedOut => "hard_timed_out",
            ProcessOutcome::MaxRetried => "max_retried",
            ProcessOutcome::Cancelled => "cancelled",
            ProcessOutcome::Released => "released",
            ProcessOutcome::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个 action 的作业处理器
pub struct JobProcessor {
    worker_id: String,
    handler: Arc<dyn ActionHandler>,
    client: Arc<dyn LeaseClient>,
    notifier: Arc<dyn Notifier>,
    clock: SharedClock,
    policy: ProcessorPolicy,
    stop: StopSignal,
}

impl JobProcessor {
    pub fn new(
        worker_id: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
        client: Arc<dyn LeaseClient>,
        notifier: Arc<dyn Notifier>,
        clock: SharedClock,
        policy: ProcessorPolicy,
        stop: StopSignal,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            handler,
            client,
            notifier,
            clock,
            policy,
            stop,
        }
    }

    pub fn action(&self) -> &str {
        self.handler.action()
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 处理一个已租约的作业
    ///
    /// 租约在处理中被回收时返回 `Abandoned`，其余上报失败作为错误返回。
    pub async fn process_job(&self, job: Job) -> SchedulerResult<ProcessOutcome> {
        let job_id = job.id.clone();
        let outcome = match self.run(job).await {
            Ok(outcome) => outcome,
            Err(SchedulerError::OutOfTime { .. }) => {
                warn!("[{}] 作业 {} 的租约已失效，放弃处理", self.worker_id, job_id);
                ProcessOutcome::Abandoned
            }
            Err(e) => {
                error!("[{}] 处理作业 {} 失败: {}", self.worker_id, job_id, e);
                return Err(e);
            }
        };

        counter!(
            "scheduler_job_outcomes_total",
            "action" => self.action().to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        info!("[{}] 作业 {} 处理结束: {}", self.worker_id, job_id, outcome);
        Ok(outcome)
    }

    async fn run(&self, mut job: Job) -> SchedulerResult<ProcessOutcome> {
        let first_event = if job.retry_count == 0 {
            JobEventType::Start
        } else {
            JobEventType::Retry
        };
        self.emit(first_event, &job, None).await;

        let now = self.clock.now();
        if job.hard_timeout <= now {
            info!(
                "[{}] 作业 {} 已超过硬超时 {}",
                self.worker_id, job.id, job.hard_timeout
            );
            let message = format!("作业超过最长生命周期 ({})", job.hard_timeout);
            self.finish_failed(&job, JobStatus::HardTimedOut, message).await?;
            return Ok(ProcessOutcome::HardTimedOut);
        }

        if job.retry_count > self.policy.max_retry {
            info!(
                "[{}] 作业 {} 重试次数 {} 超过上限 {}",
                self.worker_id, job.id, job.retry_count, self.policy.max_retry
            );
            let message = format!("重试次数超过上限 {}", self.policy.max_retry);
            self.finish_failed(&job, JobStatus::MaxRetried, message).await?;
            return Ok(ProcessOutcome::MaxRetried);
        }

        if self.client.get_schedule(&job.schedule_id).await?.is_none() {
            info!(
                "[{}] 作业 {} 的调度计划 {} 已删除",
                self.worker_id, job.id, job.schedule_id
            );
            self.finish_failed(&job, JobStatus::Cancelled, "所属调度计划已删除".to_string())
                .await?;
            return Ok(ProcessOutcome::Cancelled);
        }

        let mut run = JobRun::start(now, &self.policy);
        job = self
            .report(&job, JobStatus::Processing, Some(run.next_timeout), None)
            .await?;

        let missing: Vec<String> = self
            .handler
            .required_metadata()
            .into_iter()
            .filter(|key| !job.metadata.contains_key(key))
            .collect();
        if !missing.is_empty() {
            warn!(
                "[{}] 作业 {} 缺少元数据 {:?}",
                self.worker_id, job.id, missing
            );
            let message = format!("缺少必需的元数据: {}", missing.join(", "));
            self.finish_failed(&job, JobStatus::Cancelled, message).await?;
            return Ok(ProcessOutcome::Cancelled);
        }

        let (handle, mut checked) = match self.resolve_handle(&mut job).await {
            Ok(resolved) => resolved,
            Err(e @ SchedulerError::OutOfTime { .. }) => return Err(e),
            Err(e) => return self.fail(&job, e.to_string()).await,
        };

        loop {
            if self.stop.is_stopped() {
                return self.release(&job).await;
            }

            let polled = match checked.take() {
                Some(status) => Ok(status),
                None => self.handler.resume(&job, &handle).await,
            };
            let status = match polled {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        "[{}] 轮询作业 {} 的外部操作 {} 出错: {}",
                        self.worker_id, job.id, handle, e
                    );
                    return self.fail(&job, e.to_string()).await;
                }
            };

            match status {
                ActionStatus::Succeeded => return self.succeed(&job, &handle).await,
                ActionStatus::Failed(reason) => return self.fail(&job, reason).await,
                ActionStatus::InProgress => {}
            }

            let now = self.clock.now();
            match run.evaluate(now, &self.policy) {
                RenewalDecision::Extend(timeout) => {
                    info!(
                        "[{}] 作业 {} 第 {} 次续期至 {}",
                        self.worker_id, job.id, run.timeout_count, timeout
                    );
                    job = self
                        .report(&job, JobStatus::Processing, Some(timeout), None)
                        .await?;
                    self.emit(JobEventType::Update, &job, None).await;
                }
                RenewalDecision::OutOfTime => {
                    warn!(
                        "[{}] 作业 {} 续期次数耗尽，租约于 {} 到期",
                        self.worker_id, job.id, run.next_timeout
                    );
                    self.finish_failed(&job, JobStatus::TimedOut, "作业处理超时".to_string())
                        .await?;
                    return Ok(ProcessOutcome::TimedOut);
                }
                RenewalDecision::StatusUpdate => {
                    debug!("[{}] 作业 {} 定期上报状态", self.worker_id, job.id);
                    job = self.report(&job, JobStatus::Processing, None, None).await?;
                    self.emit(JobEventType::Update, &job, None).await;
                }
                RenewalDecision::Nothing => {}
            }

            self.stop.sleep(self.policy.poll_interval).await;
        }
    }

    /// 找到可轮询的外部操作句柄，必要时启动新的外部操作
    ///
    /// 恢复已有句柄时一并返回检查得到的状态，供首轮轮询直接使用。
    async fn resolve_handle(
        &self,
        job: &mut Job,
    ) -> SchedulerResult<(String, Option<ActionStatus>)> {
        if let Some(handle) = job.metadata.get(ACTION_HANDLE_KEY).cloned() {
            match self.handler.resume(job, &handle).await {
                Ok(ActionStatus::Failed(reason)) => {
                    info!(
                        "[{}] 作业 {} 的已有外部操作 {} 已失败 ({})，重新执行",
                        self.worker_id, job.id, handle, reason
                    );
                }
                Ok(status) => {
                    info!(
                        "[{}] 作业 {} 恢复外部操作 {}",
                        self.worker_id, job.id, handle
                    );
                    return Ok((handle, Some(status)));
                }
                Err(e) => {
                    return Err(SchedulerError::polling(format!(
                        "检查外部操作 {handle} 失败: {e}"
                    )))
                }
            }
        }

        let handle = self.handler.execute(job).await?;
        let entries = Metadata::from([(ACTION_HANDLE_KEY.to_string(), handle.clone())]);
        job.metadata = self.client.update_metadata(&job.id, &entries).await?;
        info!(
            "[{}] 作业 {} 启动外部操作 {}",
            self.worker_id, job.id, handle
        );
        Ok((handle, None))
    }

    async fn succeed(&self, job: &Job, handle: &str) -> SchedulerResult<ProcessOutcome> {
        if let Err(e) = self.handler.on_success(job, handle).await {
            warn!(
                "[{}] 作业 {} 成功后的附加处理失败: {}",
                self.worker_id, job.id, e
            );
        }
        let done = self.report(job, JobStatus::Done, None, None).await?;
        self.emit(JobEventType::End, &done, None).await;
        Ok(ProcessOutcome::Done)
    }

    /// 转入 `ERROR` 并按退避策略设置下一次可租约时间
    async fn fail(&self, job: &Job, message: String) -> SchedulerResult<ProcessOutcome> {
        let timeout = self
            .policy
            .backoff_timeout(self.clock.now(), job.retry_count);
        warn!(
            "[{}] 作业 {} 失败，{} 后可重试: {}",
            self.worker_id, job.id, timeout, message
        );
        let errored = self
            .report(job, JobStatus::Error, Some(timeout), Some(message.clone()))
            .await?;
        self.emit(JobEventType::Failed, &errored, Some(&message)).await;
        Ok(ProcessOutcome::Errored)
    }

    async fn finish_failed(
        &self,
        job: &Job,
        status: JobStatus,
        message: String,
    ) -> SchedulerResult<()> {
        let finished = self
            .report(job, status, None, Some(message.clone()))
            .await?;
        self.emit(JobEventType::Failed, &finished, Some(&message))
            .await;
        Ok(())
    }

    async fn release(&self, job: &Job) -> SchedulerResult<ProcessOutcome> {
        let timeout = self.clock.now() + self.policy.worker_stop_timeout;
        info!(
            "[{}] Worker停止，作业 {} 的租约缩短至 {}",
            self.worker_id, job.id, timeout
        );
        self.report(job, JobStatus::Processing, Some(timeout), None)
            .await?;
        Ok(ProcessOutcome::Released)
    }

    async fn report(
        &self,
        job: &Job,
        status: JobStatus,
        timeout: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> SchedulerResult<Job> {
        self.client
            .report(&self.worker_id, &job.id, status, timeout, error_message)
            .await
    }

    async fn emit(&self, event_type: JobEventType, job: &Job, error_message: Option<&str>) {
        let mut event = JobEvent::new(event_type, job, self.clock.now())
            .with_payload_field("worker_id", self.worker_id.clone());
        if let Some(message) = error_message {
            event = event.with_payload_field("error_message", message);
        }
        if let Err(e) = self.notifier.notify(event).await {
            warn!(
                "[{}] 发送 {} 通知失败: {}",
                self.worker_id,
                event_type.as_str(),
                e
            );
        }
    }
}
