//! 外部长时操作的能力接口
//!
//! 每种作业类型（如 `snapshot`）提供一个实现，作业处理框架按 `action` 名称分派。

use async_trait::async_trait;

use scheduler_core::SchedulerResult;

use crate::entities::Job;

/// 外部操作句柄的当前状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    InProgress,
    Succeeded,
    Failed(String),
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action(&self) -> &str;

    /// 处理前必须存在于作业元数据中的键
    fn required_metadata(&self) -> Vec<String> {
        Vec::new()
    }

    /// 启动外部操作，返回用于轮询的句柄
    async fn execute(&self, job: &Job) -> SchedulerResult<String>;

    /// 查询句柄对应外部操作的状态
    async fn resume(&self, job: &Job, handle: &str) -> SchedulerResult<ActionStatus>;

    /// 外部操作成功后的附加处理（如清理过期产物）
    async fn on_success(&self, _job: &Job, _handle: &str) -> SchedulerResult<()> {
        Ok(())
    }

    /// Worker停止时调用
    async fn cleanup(&self) {}
}
