mod app;

pub use app::{EmbeddedApplication, EmbeddedApplicationHandle};
