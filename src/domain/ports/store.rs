//! The durable store port. Coordination between tasks is mediated
//! entirely through this interface — the engine never locks across tasks
//! by any other means.

use async_trait::async_trait;

use crate::domain::errors::SchedulerResult;
use crate::domain::models::ScheduledTask;

/// Durable storage for scheduled tasks.
///
/// Implementations must guarantee that `get_and_lock_next_available`
/// returns a given due row to at most one caller, even under concurrent
/// invocation from multiple worker processes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically select up to `n` due-and-unlocked rows, mark them
    /// locked (`locked_at := now`, `locked_by := worker_id`), and return
    /// them. "Due" means `run_at <= now` and the row is unlocked or its
    /// lock has expired per the store's own lock-timeout policy.
    async fn get_and_lock_next_available(
        &self,
        n: usize,
        worker_id: &str,
    ) -> SchedulerResult<Vec<ScheduledTask>>;

    /// Upsert by `id`. A task with `id = None` is inserted as a new row.
    async fn save(&self, task: &mut ScheduledTask) -> SchedulerResult<()>;

    /// Remove the row by `id`. A no-op if the task was never persisted.
    async fn delete(&self, task: &ScheduledTask) -> SchedulerResult<()>;
}
