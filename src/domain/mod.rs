//! Domain layer: scheduled-task model, hook capability records, errors,
//! and the ports the engine depends on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{SchedulerError, SchedulerResult};
