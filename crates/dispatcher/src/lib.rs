pub mod error_response;
pub mod lease_coordinator;
pub mod materializer;
pub mod services;

pub use error_response::ErrorResponse;
pub use lease_coordinator::{LeaseCoordinator, LeaseCoordinatorConfig};
pub use materializer::{MaterializerConfig, ScheduleMaterializer};
pub use services::{JobService, JobStatusView, ScheduleService, WorkerService};
