pub mod database;
pub mod memory;
pub mod notifier;

use std::sync::Arc;

use scheduler_domain::{JobRepository, ScheduleRepository, WorkerRepository};

pub use database::sqlite::{SqliteJobRepository, SqliteScheduleRepository, SqliteWorkerRepository};
pub use database::DatabaseManager;
pub use memory::InMemoryStore;
pub use notifier::{BroadcastNotifier, TracingNotifier};

/// 三类仓储的组合，租约协调器与各服务共享同一组实例
#[derive(Clone)]
pub struct Repositories {
    pub workers: Arc<dyn WorkerRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub jobs: Arc<dyn JobRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            workers: store.clone(),
            schedules: store.clone(),
            jobs: store,
        }
    }

    pub fn sqlite(pool: sqlx::SqlitePool) -> Self {
        Self {
            workers: Arc::new(SqliteWorkerRepository::new(pool.clone())),
            schedules: Arc::new(SqliteScheduleRepository::new(pool.clone())),
            jobs: Arc::new(SqliteJobRepository::new(pool)),
        }
    }
}
