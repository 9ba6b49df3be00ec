use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use scheduler_core::config::WorkerConfig;
use scheduler_core::{SchedulerError, SchedulerResult, SharedClock};
use scheduler_domain::Notifier;

use crate::lease_client::LeaseClient;
use crate::policy::ProcessorPolicy;
use crate::processor::JobProcessor;
use crate::registry::ProcessorRegistry;
use crate::stop::StopSignal;

#[derive(Debug, Clone)]
pub struct WorkerRuntimeConfig {
    pub host: String,
    /// 并发处理的作业数，每个槽位同一时刻只处理一个作业
    pub slots: usize,
    pub actions: Vec<String>,
    /// 没有到期作业时的休眠时长
    pub poll_interval: Duration,
}

impl From<&WorkerConfig> for WorkerRuntimeConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            host: config.host.clone(),
            slots: config.slots,
            actions: config.actions.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Worker运行结束后的统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeReport {
    pub worker_id: String,
    pub processed: usize,
}

/// Worker进程：注册、按槽位轮询租约、停止后注销并清理
pub struct WorkerRuntime {
    config: WorkerRuntimeConfig,
    client: Arc<dyn LeaseClient>,
    registry: ProcessorRegistry,
    notifier: Arc<dyn Notifier>,
    clock: SharedClock,
    policy: ProcessorPolicy,
    stop: StopSignal,
}

impl WorkerRuntime {
    pub fn new(
        config: WorkerRuntimeConfig,
        client: Arc<dyn LeaseClient>,
        registry: ProcessorRegistry,
        notifier: Arc<dyn Notifier>,
        clock: SharedClock,
        policy: ProcessorPolicy,
    ) -> Self {
        Self {
            config,
            client,
            registry,
            notifier,
            clock,
            policy,
            stop: StopSignal::new(),
        }
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// 运行到收到停止信号为止
    pub async fn run(&self) -> SchedulerResult<RuntimeReport> {
        if self.config.slots == 0 {
            return Err(SchedulerError::config_error("worker.slots 必须大于0"));
        }
        for action in &self.config.actions {
            self.registry.get(action)?;
        }

        let worker = self.client.register_worker(&self.config.host).await?;
        info!(
            "[{}] Worker已注册 (host: {}, 槽位: {}, actions: {:?})",
            worker.id, worker.host, self.config.slots, self.config.actions
        );

        let loops = (0..self.config.slots).map(|slot| self.slot_loop(slot, &worker.id));
        let processed: usize = join_all(loops).await.into_iter().sum();

        if let Err(e) = self.client.unregister_worker(&worker.id).await {
            warn!("[{}] 注销Worker失败: {}", worker.id, e);
        }
        for handler in self.registry.handlers() {
            handler.cleanup().await;
        }
        info!("[{}] Worker已停止，共处理 {} 个作业", worker.id, processed);

        Ok(RuntimeReport {
            worker_id: worker.id,
            processed,
        })
    }

    async fn slot_loop(&self, slot: usize, worker_id: &str) -> usize {
        let mut processors = Vec::with_capacity(self.config.actions.len());
        for action in &self.config.actions {
            match self.registry.get(action) {
                Ok(handler) => processors.push(JobProcessor::new(
                    worker_id,
                    handler,
                    self.client.clone(),
                    self.notifier.clone(),
                    self.clock.clone(),
                    self.policy.clone(),
                    self.stop.clone(),
                )),
                Err(e) => error!("[{}] 槽位 {} 无法处理 {}: {}", worker_id, slot, action, e),
            }
        }

        let mut processed = 0;
        while !self.stop.is_stopped() {
            let mut leased_any = false;
            for processor in &processors {
                if self.stop.is_stopped() {
                    break;
                }
                let job = match self.client.lease(worker_id, processor.action()).await {
                    Ok(Some(job)) => job,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(
                            "[{}] 槽位 {} 租约 {} 作业失败: {}",
                            worker_id,
                            slot,
                            processor.action(),
                            e
                        );
                        continue;
                    }
                };

                leased_any = true;
                debug!("[{}] 槽位 {} 开始处理作业 {}", worker_id, slot, job.id);
                match processor.process_job(job).await {
                    Ok(_) => processed += 1,
                    Err(e) => error!("[{}] 槽位 {} 处理作业出错: {}", worker_id, slot, e),
                }
            }

            if !leased_any && self.stop.sleep(self.config.poll_interval).await {
                break;
            }
        }
        processed
    }
}
