use serde::Serialize;

use scheduler_core::SchedulerError;

/// 面向调用方的错误表示，内部错误细节不会原样透出
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
}

impl From<&SchedulerError> for ErrorResponse {
    fn from(err: &SchedulerError) -> Self {
        let message = match err.status_code() {
            500 => err.user_message().to_string(),
            _ => err.to_string(),
        };
        Self {
            status: err.status_code(),
            code: err.error_code(),
            message,
        }
    }
}

impl ErrorResponse {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
            },
            "status": self.status,
        })
    }
}
