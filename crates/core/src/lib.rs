pub mod clock;
pub mod config;
pub mod logging;

pub use clock::{system_clock, Clock, SharedClock, SystemClock};
pub use logging::init_logging;
pub use scheduler_errors::{SchedulerError, SchedulerResult};
