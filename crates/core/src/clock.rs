use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// 统一的时间来源
///
/// 租约判定与处理框架的所有时间比较都通过同一个时钟完成，测试中可替换为手动时钟。
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
