//! 产物保留策略
//!
//! 外部操作成功后，动作实现可以据此淘汰超出保留数量的旧产物（如旧快照）。

use chrono::{DateTime, Utc};

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::Metadata;

/// 元数据中保留数量的键
pub const RETENTION_KEY: &str = "retention";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// 按创建时间从新到旧保留 `retention` 个产物，返回需要淘汰的部分（从新到旧）
///
/// `retention` 为 0 时不淘汰任何产物。
pub fn select_for_eviction(mut artifacts: Vec<Artifact>, retention: usize) -> Vec<Artifact> {
    if retention == 0 || artifacts.len() <= retention {
        return Vec::new();
    }
    artifacts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    artifacts.split_off(retention)
}

/// 读取元数据中的保留数量，缺失时为 0
pub fn retention_from_metadata(metadata: &Metadata) -> SchedulerResult<usize> {
    match metadata.get(RETENTION_KEY) {
        None => Ok(0),
        Some(raw) => raw.trim().parse().map_err(|_| {
            SchedulerError::validation_error(format!("retention 必须是非负整数: {raw}"))
        }),
    }
}
