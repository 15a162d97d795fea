//! A durable, recurring, prioritized task scheduler.
//!
//! The engine (`services`) runs against two ports (`domain::ports`): a
//! `Store` for durable task persistence and a `TypeResolver` for
//! constructing handlers by name. SQLite and in-process implementations
//! of those ports live under `adapters`; process wiring (config, logging)
//! lives under `infrastructure`.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{SchedulerError, SchedulerResult};
pub use domain::models::{
    Handler, HandlerHooks, HandlerReference, HandlerCapabilities, ResolvedHandler, ScheduledTask,
};
pub use domain::ports::{Store, TypeResolver};
pub use services::{Control, ControlSettings, Executor, Poller, PollerConfig, Submitter};
