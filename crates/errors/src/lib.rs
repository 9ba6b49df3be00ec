use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },
    #[error("调度计划未找到: {id}")]
    ScheduleNotFound { id: String },
    #[error("作业未找到: {id}")]
    JobNotFound { id: String },
    #[error("元数据未找到: {owner_id} 的键 {key}")]
    MetadataNotFound { owner_id: String, key: String },
    #[error("元数据键已存在: {owner_id} 的键 {key}")]
    Duplicate { owner_id: String, key: String },
    #[error("非法的状态转换: 作业 {job_id} 从 {from} 到 {to}")]
    InvalidState {
        job_id: String,
        from: String,
        to: String,
    },
    #[error("作业租约已过期: {job_id}")]
    OutOfTime { job_id: String },
    #[error("轮询外部操作状态失败: {0}")]
    Polling(String),
    #[error("未注册的作业类型: {0}")]
    ActionNotRegistered(String),
    #[error("无效的调度表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn worker_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }
    pub fn schedule_not_found<S: Into<String>>(id: S) -> Self {
        Self::ScheduleNotFound { id: id.into() }
    }
    pub fn job_not_found<S: Into<String>>(id: S) -> Self {
        Self::JobNotFound { id: id.into() }
    }
    pub fn metadata_not_found<O: Into<String>, K: Into<String>>(owner_id: O, key: K) -> Self {
        Self::MetadataNotFound {
            owner_id: owner_id.into(),
            key: key.into(),
        }
    }
    pub fn duplicate<O: Into<String>, K: Into<String>>(owner_id: O, key: K) -> Self {
        Self::Duplicate {
            owner_id: owner_id.into(),
            key: key.into(),
        }
    }
    pub fn invalid_state<J, F, T>(job_id: J, from: F, to: T) -> Self
    where
        J: Into<String>,
        F: ToString,
        T: ToString,
    {
        Self::InvalidState {
            job_id: job_id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
    pub fn out_of_time<S: Into<String>>(job_id: S) -> Self {
        Self::OutOfTime {
            job_id: job_id.into(),
        }
    }
    pub fn polling<S: Into<String>>(msg: S) -> Self {
        Self::Polling(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::WorkerNotFound { .. }
                | SchedulerError::ScheduleNotFound { .. }
                | SchedulerError::JobNotFound { .. }
                | SchedulerError::MetadataNotFound { .. }
        )
    }

    /// 面向调用方的状态码（HTTP语义）
    pub fn status_code(&self) -> u16 {
        match self {
            e if e.is_not_found() => 404,
            SchedulerError::ValidationError(_)
            | SchedulerError::InvalidCron { .. }
            | SchedulerError::Serialization(_) => 400,
            SchedulerError::Duplicate { .. } | SchedulerError::InvalidState { .. } => 409,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            SchedulerError::WorkerNotFound { .. } => "WORKER_NOT_FOUND",
            SchedulerError::ScheduleNotFound { .. } => "SCHEDULE_NOT_FOUND",
            SchedulerError::JobNotFound { .. } => "JOB_NOT_FOUND",
            SchedulerError::MetadataNotFound { .. } => "METADATA_NOT_FOUND",
            SchedulerError::Duplicate { .. } => "DUPLICATE_METADATA",
            SchedulerError::InvalidState { .. } => "INVALID_STATE",
            SchedulerError::ValidationError(_) => "VALIDATION_ERROR",
            SchedulerError::InvalidCron { .. } => "INVALID_SCHEDULE",
            SchedulerError::Serialization(_) => "BAD_REQUEST",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            SchedulerError::WorkerNotFound { .. } => "请求的Worker节点不存在",
            SchedulerError::ScheduleNotFound { .. } => "请求的调度计划不存在",
            SchedulerError::JobNotFound { .. } => "请求的作业不存在",
            SchedulerError::MetadataNotFound { .. } => "请求的元数据不存在",
            SchedulerError::Duplicate { .. } => "元数据键已存在",
            SchedulerError::InvalidState { .. } => "作业当前状态不允许该操作",
            SchedulerError::ValidationError(_) | SchedulerError::InvalidCron { .. } => {
                "输入数据验证失败"
            }
            SchedulerError::Serialization(_) => "请求体格式有误",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}
