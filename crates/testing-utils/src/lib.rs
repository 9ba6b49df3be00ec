//! # Scheduler Testing Utils
//!
//! Shared testing utilities for the job lease scheduler workspace.
//!
//! ## Features
//!
//! - **Manual Clock**: a controllable time source for lease and backoff tests
//! - **Test Data Builders**: schedules and jobs with sensible defaults
//! - **Mocks**: a recording notifier and a scripted external action
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod clock;
pub mod mocks;

pub use builders::*;
pub use clock::*;
pub use mocks::*;
