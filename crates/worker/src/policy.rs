use chrono::{DateTime, Duration, Utc};

use scheduler_core::config::{duration_from_seconds, ProcessorConfig};

/// 退避间隔上限，避免时间戳溢出
const MAX_BACKOFF_SECONDS: f64 = 365.0 * 24.0 * 3600.0;

/// 作业处理框架的超时、续约与重试策略
///
/// 构造后不可变，由处理器在创建时持有。
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorPolicy {
    /// 轮询外部操作状态的间隔
    pub poll_interval: std::time::Duration,
    pub update_interval: Duration,
    pub initial_timeout: Duration,
    pub timeout_extension: Duration,
    pub extension_threshold: Duration,
    pub timeout_max_updates: u32,
    pub backoff_increment: Duration,
    pub backoff_factor: f64,
    pub worker_stop_timeout: Duration,
    pub max_retry: u32,
}

impl Default for ProcessorPolicy {
    fn default() -> Self {
        Self::from(&ProcessorConfig::default())
    }
}

impl From<&ProcessorConfig> for ProcessorPolicy {
    fn from(config: &ProcessorConfig) -> Self {
        let seconds = duration_from_seconds;
        Self {
            poll_interval: std::time::Duration::from_secs(config.action_poll_interval_seconds),
            update_interval: seconds(config.job_update_interval_seconds),
            initial_timeout: seconds(config.job_timeout_initial_value_seconds),
            timeout_extension: seconds(config.job_timeout_extension_seconds),
            extension_threshold: seconds(config.job_timeout_extension_threshold_seconds),
            timeout_max_updates: config.job_timeout_max_updates,
            backoff_increment: seconds(config.job_timeout_backoff_increment_seconds),
            backoff_factor: config.job_timeout_backoff_factor,
            worker_stop_timeout: seconds(config.job_timeout_worker_stop_seconds),
            max_retry: config.max_retry,
        }
    }
}

impl ProcessorPolicy {
    /// `backoff_increment * backoff_factor ^ retry_count`，超出上限时饱和
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let base = self.backoff_increment.num_milliseconds() as f64 / 1000.0;
        let seconds = base * self.backoff_factor.powi(exponent);

        let capped = if seconds.is_finite() {
            seconds.clamp(0.0, MAX_BACKOFF_SECONDS)
        } else {
            MAX_BACKOFF_SECONDS
        };
        Duration::milliseconds((capped * 1000.0) as i64)
    }

    pub fn backoff_timeout(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        now + self.backoff_delay(retry_count)
    }
}
