//! Application services composing the scheduling engine.

pub mod control;
pub mod executor;
pub mod handler_registry;
pub mod interval_function;
pub mod occurrence_oracle;
pub mod poller;
pub mod submitter;
pub mod worker_pool;

pub use control::{Control, ControlSettings};
pub use executor::{Executor, PendingHandlers};
pub use handler_registry::HandlerRegistry;
pub use interval_function::{constant, exponential_backoff, IntervalFunction};
pub use occurrence_oracle::{CronOracle, OccurrenceOracle};
pub use poller::{Poller, PollerConfig};
pub use submitter::Submitter;
pub use worker_pool::{BoxedUnit, PriorityWorkerPool};
