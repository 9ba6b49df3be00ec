pub mod action;
pub mod entities;
pub mod events;
pub mod recurrence;
pub mod repositories;
pub mod value_objects;

pub use action::{ActionHandler, ActionStatus};
pub use entities::{
    Job, JobStatus, Metadata, NewSchedule, Schedule, ScheduleUpdate, StatusChange, Worker,
    INSTANCE_ID_KEY,
};
pub use events::{EventLevel, JobEvent, JobEventType, Notifier};
pub use recurrence::Recurrence;
pub use repositories::{JobRepository, ScheduleRepository, WorkerRepository};
pub use value_objects::{JobFilter, NextJob, PageRequest, ScheduleFilter};
