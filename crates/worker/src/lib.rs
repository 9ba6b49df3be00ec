pub mod lease_client;
pub mod policy;
pub mod processor;
pub mod registry;
pub mod renewal;
pub mod retention;
pub mod runtime;
pub mod stop;

pub use lease_client::{LeaseClient, LocalLeaseClient};
pub use policy::ProcessorPolicy;
pub use processor::{JobProcessor, ProcessOutcome, ACTION_HANDLE_KEY};
pub use registry::ProcessorRegistry;
pub use renewal::{JobRun, RenewalDecision};
pub use retention::{retention_from_metadata, select_for_eviction, Artifact, RETENTION_KEY};
pub use runtime::{RuntimeReport, WorkerRuntime, WorkerRuntimeConfig};
pub use stop::StopSignal;
