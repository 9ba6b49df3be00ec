//! 应用配置
//!
//! 加载顺序：内置默认值 → TOML配置文件 → `SCHEDULER__*` 环境变量。

mod sections;
mod validation;

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{SchedulerError, SchedulerResult};

pub use sections::{
    duration_from_seconds, DatabaseBackend, DatabaseConfig, JobConfig, LeaseConfig, LogFormat,
    LoggingConfig, ProcessorConfig, WorkerConfig, MAX_DURATION_SECONDS,
};
pub use validation::ConfigValidator;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/scheduler.toml", "scheduler.toml"];
const ENV_PREFIX: &str = "SCHEDULER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub lease: LeaseConfig,
    pub job: JobConfig,
    pub worker: WorkerConfig,
    pub processor: ProcessorConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从配置文件加载，未指定路径时依次查找默认位置
    pub fn load(config_path: Option<&str>) -> SchedulerResult<Self> {
        let mut builder = Config::builder().add_source(defaults_source()?);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(SchedulerError::config_error(format!(
                    "配置文件不存在: {path}"
                )));
            }
            info!("加载配置文件: {}", path);
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            info!("加载配置文件: {}", path);
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            debug!("未找到配置文件，使用默认配置");
        }

        let config: AppConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        config.validate()?;
        Ok(config)
    }

    /// 从TOML字符串加载，未出现的字段使用默认值
    pub fn from_toml_str(content: &str) -> SchedulerResult<Self> {
        let config: AppConfig = Config::builder()
            .add_source(defaults_source()?)
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> SchedulerResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SchedulerError::config_error(format!("序列化配置失败: {e}")))
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> SchedulerResult<()> {
        self.database.validate()?;
        self.lease.validate()?;
        self.job.validate()?;
        self.worker.validate()?;
        self.processor.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn defaults_source() -> SchedulerResult<Config> {
    Config::try_from(&AppConfig::default()).map_err(config_error)
}

fn config_error(err: config::ConfigError) -> SchedulerError {
    SchedulerError::config_error(format!("加载配置失败: {err}"))
}
