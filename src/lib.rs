//! 分布式周期作业调度系统（租约核心）
//!
//! 根包负责把各个crate装配成单进程的嵌入式应用。

pub mod embedded;
pub mod shutdown;

pub use embedded::{EmbeddedApplication, EmbeddedApplicationHandle};
pub use shutdown::ShutdownManager;

pub use scheduler_core::config::AppConfig;
pub use scheduler_core::{SchedulerError, SchedulerResult};
