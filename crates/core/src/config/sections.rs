use chrono::Duration;
use serde::{Deserialize, Serialize};

/// 所有以秒为单位的时长配置的上限（十年）
pub const MAX_DURATION_SECONDS: u64 = 10 * 365 * 24 * 3600;

/// 把秒数转换为时长，超过 `MAX_DURATION_SECONDS` 的值按上限处理
pub fn duration_from_seconds(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_DURATION_SECONDS) as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Memory,
            url: "sqlite:scheduler.db".to_string(),
            max_connections: 5,
        }
    }
}

/// 租约协调器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// `next_job` 授予的默认租约时长（秒）
    pub default_lease_seconds: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_lease_seconds: 3600,
        }
    }
}

/// 作业生成参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// 作业最长生命周期（秒），决定 `hard_timeout`
    pub hard_timeout_seconds: u64,
    /// 新建作业的初始 `timeout`（秒）
    pub initial_timeout_seconds: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            hard_timeout_seconds: 24 * 3600,
            initial_timeout_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub host: String,
    /// 并发槽位数，每个槽位同时只处理一个作业
    pub slots: usize,
    pub actions: Vec<String>,
    /// 没有可租约作业时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        Self {
            host,
            slots: 1,
            actions: vec!["snapshot".to_string()],
            poll_interval_ms: 1000,
        }
    }
}

/// 作业处理框架的超时/重试/退避参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub action_poll_interval_seconds: u64,
    pub job_update_interval_seconds: u64,
    pub job_timeout_initial_value_seconds: u64,
    pub job_timeout_extension_seconds: u64,
    pub job_timeout_extension_threshold_seconds: u64,
    pub job_timeout_max_updates: u32,
    pub job_timeout_backoff_increment_seconds: u64,
    pub job_timeout_backoff_factor: f64,
    pub job_timeout_worker_stop_seconds: u64,
    pub max_retry: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            action_poll_interval_seconds: 30,
            job_update_interval_seconds: 300,
            job_timeout_initial_value_seconds: 3600,
            job_timeout_extension_seconds: 3600,
            job_timeout_extension_threshold_seconds: 300,
            job_timeout_max_updates: 3,
            job_timeout_backoff_increment_seconds: 3600,
            job_timeout_backoff_factor: 1.0,
            job_timeout_worker_stop_seconds: 300,
            max_retry: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
