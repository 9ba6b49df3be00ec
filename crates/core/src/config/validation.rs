use crate::{SchedulerError, SchedulerResult};

use super::sections::{
    DatabaseBackend, DatabaseConfig, JobConfig, LeaseConfig, LoggingConfig, ProcessorConfig,
    WorkerConfig, MAX_DURATION_SECONDS,
};

pub trait ConfigValidator {
    fn validate(&self) -> SchedulerResult<()>;
}

fn require_positive(value: u64, field: &str) -> SchedulerResult<()> {
    if value == 0 {
        return Err(SchedulerError::config_error(format!("{field} 必须大于0")));
    }
    Ok(())
}

fn require_seconds_within_limit(value: u64, field: &str) -> SchedulerResult<()> {
    if value > MAX_DURATION_SECONDS {
        return Err(SchedulerError::config_error(format!(
            "{field} 不能超过 {MAX_DURATION_SECONDS} 秒"
        )));
    }
    Ok(())
}

/// 大于0且不超过上限的秒数
fn require_seconds(value: u64, field: &str) -> SchedulerResult<()> {
    require_positive(value, field)?;
    require_seconds_within_limit(value, field)
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> SchedulerResult<()> {
        if self.backend == DatabaseBackend::Sqlite {
            if self.url.is_empty() {
                return Err(SchedulerError::config_error("数据库URL不能为空"));
            }
            if !self.url.starts_with("sqlite:") {
                return Err(SchedulerError::config_error(format!(
                    "不支持的数据库URL: {}",
                    self.url
                )));
            }
        }
        if self.max_connections == 0 {
            return Err(SchedulerError::config_error("max_connections 必须大于0"));
        }
        Ok(())
    }
}

impl ConfigValidator for LeaseConfig {
    fn validate(&self) -> SchedulerResult<()> {
        require_seconds(self.default_lease_seconds, "lease.default_lease_seconds")
    }
}

impl ConfigValidator for JobConfig {
    fn validate(&self) -> SchedulerResult<()> {
        require_seconds(self.hard_timeout_seconds, "job.hard_timeout_seconds")?;
        require_seconds(self.initial_timeout_seconds, "job.initial_timeout_seconds")
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> SchedulerResult<()> {
        if self.host.trim().is_empty() {
            return Err(SchedulerError::config_error("worker.host 不能为空"));
        }
        if self.slots == 0 {
            return Err(SchedulerError::config_error("worker.slots 必须大于0"));
        }
        if self.actions.is_empty() || self.actions.iter().any(|a| a.trim().is_empty()) {
            return Err(SchedulerError::config_error("worker.actions 不能为空"));
        }
        require_positive(self.poll_interval_ms, "worker.poll_interval_ms")
    }
}

impl ConfigValidator for ProcessorConfig {
    fn validate(&self) -> SchedulerResult<()> {
        require_seconds(
            self.action_poll_interval_seconds,
            "processor.action_poll_interval_seconds",
        )?;
        require_seconds(
            self.job_update_interval_seconds,
            "processor.job_update_interval_seconds",
        )?;
        require_seconds(
            self.job_timeout_initial_value_seconds,
            "processor.job_timeout_initial_value_seconds",
        )?;
        require_seconds(
            self.job_timeout_extension_seconds,
            "processor.job_timeout_extension_seconds",
        )?;
        require_seconds(
            self.job_timeout_worker_stop_seconds,
            "processor.job_timeout_worker_stop_seconds",
        )?;
        require_seconds_within_limit(
            self.job_timeout_backoff_increment_seconds,
            "processor.job_timeout_backoff_increment_seconds",
        )?;
        if self.job_timeout_extension_threshold_seconds > self.job_timeout_extension_seconds {
            return Err(SchedulerError::config_error(
                "processor.job_timeout_extension_threshold_seconds 不能大于延长时长",
            ));
        }
        if !self.job_timeout_backoff_factor.is_finite() || self.job_timeout_backoff_factor <= 0.0
        {
            return Err(SchedulerError::config_error(
                "processor.job_timeout_backoff_factor 必须为正数",
            ));
        }
        Ok(())
    }
}

impl ConfigValidator for LoggingConfig {
    fn validate(&self) -> SchedulerResult<()> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(SchedulerError::config_error(format!(
                "无效的日志级别: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_larger_than_extension_rejected() {
        let config = ProcessorConfig {
            job_timeout_extension_seconds: 60,
            job_timeout_extension_threshold_seconds: 120,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let lease = LeaseConfig {
            default_lease_seconds: u64::MAX,
        };
        assert!(lease.validate().is_err());

        let job = JobConfig {
            hard_timeout_seconds: MAX_DURATION_SECONDS + 1,
            ..Default::default()
        };
        assert!(job.validate().is_err());

        let processor = ProcessorConfig {
            job_timeout_backoff_increment_seconds: u64::MAX,
            ..Default::default()
        };
        assert!(processor.validate().is_err());

        let at_limit = JobConfig {
            hard_timeout_seconds: MAX_DURATION_SECONDS,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_sqlite_url_required() {
        let config = DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: "postgres://localhost/scheduler".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let memory = DatabaseConfig {
            backend: DatabaseBackend::Memory,
            url: String::new(),
            ..Default::default()
        };
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn test_worker_without_actions_rejected() {
        let config = WorkerConfig {
            actions: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_checked() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
