use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use scheduler_core::config::{AppConfig, ConfigValidator, DatabaseBackend};
use scheduler_core::{system_clock, SchedulerResult, SharedClock};
use scheduler_dispatcher::{
    JobService, LeaseCoordinator, LeaseCoordinatorConfig, MaterializerConfig,
    ScheduleMaterializer, ScheduleService, WorkerService,
};
use scheduler_domain::{ActionHandler, Notifier};
use scheduler_infrastructure::{DatabaseManager, Repositories, TracingNotifier};
use scheduler_worker::{
    LocalLeaseClient, ProcessorPolicy, ProcessorRegistry, RuntimeReport, WorkerRuntime,
    WorkerRuntimeConfig,
};

use crate::shutdown::ShutdownManager;

/// 嵌入式应用程序：存储、租约协调器、资源服务与Worker运行在同一进程
pub struct EmbeddedApplication {
    config: AppConfig,
    registry: ProcessorRegistry,
    clock: SharedClock,
    notifier: Arc<dyn Notifier>,
}

/// 运行中的嵌入式应用
pub struct EmbeddedApplicationHandle {
    workers: Arc<WorkerService>,
    schedules: Arc<ScheduleService>,
    jobs: Arc<JobService>,
    shutdown_manager: ShutdownManager,
    worker_task: Option<JoinHandle<SchedulerResult<RuntimeReport>>>,
    database: Option<DatabaseManager>,
}

impl EmbeddedApplication {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: ProcessorRegistry::new(),
            clock: system_clock(),
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// 按默认查找顺序加载配置
    pub fn from_config_file(path: Option<&str>) -> Result<Self> {
        let config = AppConfig::load(path).context("加载配置失败")?;
        Ok(Self::new(config))
    }

    pub fn with_action(mut self, handler: Arc<dyn ActionHandler>) -> Result<Self> {
        self.registry
            .register(handler)
            .context("注册作业类型失败")?;
        Ok(self)
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 按配置中的 [logging] 段初始化全局日志
    pub fn init_logging(&self) -> Result<()> {
        scheduler_core::init_logging(&self.config.logging).context("初始化日志失败")?;
        Ok(())
    }

    pub async fn start(self) -> Result<EmbeddedApplicationHandle> {
        self.config.validate().context("配置校验失败")?;
        info!(
            "启动嵌入式调度应用 (存储: {:?})",
            self.config.database.backend
        );

        let (repositories, database) = match self.config.database.backend {
            DatabaseBackend::Memory => (Repositories::in_memory(), None),
            DatabaseBackend::Sqlite => {
                let manager = DatabaseManager::new(&self.config.database)
                    .await
                    .with_context(|| {
                        format!("连接数据库失败: {}", self.config.database.url)
                    })?;
                (Repositories::sqlite(manager.pool().clone()), Some(manager))
            }
        };

        let coordinator = Arc::new(LeaseCoordinator::new(
            repositories.jobs.clone(),
            repositories.workers.clone(),
            self.clock.clone(),
            LeaseCoordinatorConfig::from(&self.config.lease),
        ));
        let materializer = Arc::new(ScheduleMaterializer::new(
            repositories.schedules.clone(),
            repositories.jobs.clone(),
            self.clock.clone(),
            MaterializerConfig::from(&self.config.job),
        ));
        let workers = Arc::new(WorkerService::new(
            repositories.workers.clone(),
            coordinator.clone(),
            self.clock.clone(),
        ));
        let schedules = Arc::new(ScheduleService::new(
            repositories.schedules.clone(),
            repositories.jobs.clone(),
            self.clock.clone(),
        ));
        let jobs = Arc::new(JobService::new(
            repositories.jobs.clone(),
            repositories.schedules.clone(),
            coordinator,
            materializer,
        ));

        let shutdown_manager = ShutdownManager::new();
        let worker_task = if self.registry.is_empty() {
            info!("未注册任何作业类型，只运行调度服务");
            None
        } else {
            for action in &self.config.worker.actions {
                self.registry
                    .get(action)
                    .with_context(|| format!("worker.actions 中的 {action} 没有对应实现"))?;
            }

            let client = Arc::new(LocalLeaseClient::new(
                workers.clone(),
                schedules.clone(),
                jobs.clone(),
            ));
            let runtime = WorkerRuntime::new(
                WorkerRuntimeConfig::from(&self.config.worker),
                client,
                self.registry,
                self.notifier.clone(),
                self.clock.clone(),
                ProcessorPolicy::from(&self.config.processor),
            );

            let stop = runtime.stop_signal();
            let mut shutdown_rx = shutdown_manager.subscribe().await;
            tokio::spawn(async move {
                let _ = shutdown_rx.recv().await;
                stop.request_stop();
            });
            Some(tokio::spawn(async move { runtime.run().await }))
        };

        info!("嵌入式调度应用已启动");
        Ok(EmbeddedApplicationHandle {
            workers,
            schedules,
            jobs,
            shutdown_manager,
            worker_task,
            database,
        })
    }
}

impl EmbeddedApplicationHandle {
    pub fn workers(&self) -> &Arc<WorkerService> {
        &self.workers
    }

    pub fn schedules(&self) -> &Arc<ScheduleService> {
        &self.schedules
    }

    pub fn jobs(&self) -> &Arc<JobService> {
        &self.jobs
    }

    /// 停止Worker并关闭存储，返回Worker的运行统计
    pub async fn shutdown(self) -> Result<Option<RuntimeReport>> {
        info!("开始关闭嵌入式调度应用");
        let report = match self.worker_task {
            Some(task) => match self.shutdown_manager.graceful_shutdown(task).await {
                Some(joined) => Some(
                    joined
                        .context("Worker任务异常退出")?
                        .context("Worker运行失败")?,
                ),
                None => {
                    warn!("Worker未在宽限期内退出，持有的作业将在租约到期后被回收");
                    None
                }
            },
            None => {
                self.shutdown_manager.shutdown().await;
                None
            }
        };

        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("嵌入式调度应用已关闭");
        Ok(report)
    }
}
