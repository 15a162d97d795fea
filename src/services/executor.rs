//! Runs one attempt of a locked task: resolves its handler, dispatches
//! the lifecycle hooks around the attempt body, classifies the outcome,
//! computes backoff, persists the result, and clones the task forward if
//! it recurs.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{ResolvedHandler, ScheduledTask};
use crate::domain::ports::Store;
use crate::services::interval_function::IntervalFunction;
use crate::services::occurrence_oracle::OccurrenceOracle;
use crate::services::handler_registry::HandlerRegistry;

/// Handlers currently occupying a worker slot, keyed by a per-attempt id
/// rather than the task id (an immediate, undelayed task never gets one).
/// `Control::stop` walks this map to invoke `Halt?` on whatever is running
/// when shutdown begins.
pub type PendingHandlers = Arc<RwLock<HashMap<Uuid, Arc<ResolvedHandler>>>>;

struct AttemptOutcome {
    success: bool,
    errored: bool,
    last_error: Option<String>,
}

/// Executes individual task attempts against a `Store`, `HandlerRegistry`,
/// and `OccurrenceOracle`.
pub struct Executor {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn Store>,
    oracle: Arc<dyn OccurrenceOracle>,
    interval_fn: IntervalFunction,
    pending: PendingHandlers,
}

impl Executor {
    #[must_use]
    pub fn new(
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn Store>,
        oracle: Arc<dyn OccurrenceOracle>,
        interval_fn: IntervalFunction,
    ) -> Self {
        Self {
            registry,
            store,
            oracle,
            interval_fn,
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The shared registry of handlers currently occupying a worker slot.
    /// `Control` clones this handle to dispatch `Halt?` on shutdown.
    #[must_use]
    pub fn pending_handlers(&self) -> PendingHandlers {
        Arc::clone(&self.pending)
    }

    /// Run one attempt of `task`, persist its outcome, and clone it
    /// forward if it recurs. Returns the task as last persisted. If the
    /// supplied `cancel` token is already cancelled by the time
    /// persistence completes, returns `Err(SchedulerError::Cancelled)` so
    /// the caller can unwind the pool.
    #[instrument(skip(self, task, cancel), fields(task_id = ?task.id, attempt = task.attempts + 1))]
    pub async fn execute(
        &self,
        mut task: ScheduledTask,
        cancel: CancellationToken,
    ) -> SchedulerResult<ScheduledTask> {
        task.attempts += 1;

        let resolved = self.registry.resolve(&task.handler).await;
        let outcome = match resolved {
            None => AttemptOutcome {
                success: false,
                errored: false,
                last_error: Some("Missing or invalid handler".to_string()),
            },
            Some(resolved) => {
                let slot = Uuid::new_v4();
                self.pending.write().await.insert(slot, Arc::clone(&resolved));
                let outcome = self.run_attempt(&task, resolved.as_ref(), cancel.clone()).await;
                self.pending.write().await.remove(&slot);
                outcome
            }
        };

        task.last_error = outcome.last_error;

        if !outcome.success {
            let delay = (self.interval_fn)(task.attempts);
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            task.run_at = Utc::now() + delay;
        }

        self.persist_outcome(&mut task, outcome.success, outcome.errored).await?;

        if cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }

        Ok(task)
    }

    async fn run_attempt(
        &self,
        task: &ScheduledTask,
        resolved: &ResolvedHandler,
        cancel: CancellationToken,
    ) -> AttemptOutcome {
        let attempt = AssertUnwindSafe(self.run_hooks(task, resolved)).catch_unwind();

        tokio::select! {
            biased;
            () = cancel.cancelled() => AttemptOutcome {
                success: false,
                errored: true,
                last_error: Some("Cancelled".to_string()),
            },
            result = attempt => match result {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    if let Some(error_hook) = &resolved.hooks.error {
                        error_hook.error(&message).await;
                    }
                    AttemptOutcome {
                        success: false,
                        errored: true,
                        last_error: Some(message),
                    }
                }
            },
        }
    }

    async fn run_hooks(&self, task: &ScheduledTask, resolved: &ResolvedHandler) -> AttemptOutcome {
        let should_perform = match &resolved.hooks.before {
            Some(before) => before.before().await,
            None => true,
        };

        let success = if should_perform {
            resolved.handler.perform().await
        } else {
            false
        };

        if success {
            if let Some(success_hook) = &resolved.hooks.success {
                success_hook.success().await;
            }
        }

        // Fires whenever the terminal-fail predicate holds, even on a
        // successful attempt where attempts just reached the ceiling.
        if task.job_will_fail() {
            if let Some(failure_hook) = &resolved.hooks.failure {
                failure_hook.failure().await;
            }
        }

        if let Some(after_hook) = &resolved.hooks.after {
            after_hook.after().await;
        }

        AttemptOutcome {
            success,
            errored: false,
            last_error: None,
        }
    }

    /// Apply the save rules of the record's lifecycle: delete or mark
    /// terminal on a completed attempt, otherwise clear the lock and
    /// persist, then evaluate recurrence.
    async fn persist_outcome(
        &self,
        task: &mut ScheduledTask,
        success: bool,
        errored: bool,
    ) -> SchedulerResult<()> {
        let now = Utc::now();
        let mut deleted = false;

        if !success && task.job_will_fail() {
            if task.delete_on_failure {
                self.store.delete(task).await?;
                deleted = true;
            } else {
                task.failed_at = Some(now);
            }
        } else if success {
            if task.delete_on_success {
                self.store.delete(task).await?;
                deleted = true;
            } else {
                task.succeeded_at = Some(now);
            }
        }

        if !deleted {
            task.locked_at = None;
            task.locked_by = None;
            self.store.save(task).await?;
            self.apply_recurrence(task, success, errored).await?;
        }

        Ok(())
    }

    /// Clone `task` forward to its next occurrence if it recurs. The
    /// window anchor advance described in the recurrence contract
    /// (`start := run_at`) is applied to a local copy only — the original
    /// row was already persisted in its terminal state above and must
    /// not be mutated again.
    async fn apply_recurrence(
        &self,
        task: &ScheduledTask,
        success: bool,
        errored: bool,
    ) -> SchedulerResult<()> {
        if !task.should_repeat(success, errored) {
            return Ok(());
        }

        let mut anchor = task.clone();
        anchor.start = anchor.run_at;

        let Some(next_run_at) = anchor.next_occurrence(self.oracle.as_ref())? else {
            return Ok(());
        };

        let mut clone = anchor.clone_forward(next_run_at);
        self.store.save(&mut clone).await?;
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Handler, HandlerHooks, HandlerReference};
    use crate::domain::ports::TypeResolver;
    use crate::services::interval_function::constant;
    use crate::services::occurrence_oracle::CronOracle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct FakeStore {
        saved: AsyncMutex<Vec<ScheduledTask>>,
        deleted: AsyncMutex<Vec<ScheduledTask>>,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn get_and_lock_next_available(
            &self,
            _n: usize,
            _worker_id: &str,
        ) -> SchedulerResult<Vec<ScheduledTask>> {
            Ok(Vec::new())
        }

        async fn save(&self, task: &mut ScheduledTask) -> SchedulerResult<()> {
            if task.id.is_none() {
                task.id = Some(uuid::Uuid::new_v4());
            }
            self.saved.lock().await.push(task.clone());
            Ok(())
        }

        async fn delete(&self, task: &ScheduledTask) -> SchedulerResult<()> {
            self.deleted.lock().await.push(task.clone());
            Ok(())
        }
    }

    struct ScriptedHandler {
        results: StdMutex<Vec<bool>>,
    }

    #[async_trait]
    impl Handler for ScriptedHandler {
        async fn perform(&self) -> bool {
            self.results.lock().unwrap().pop().unwrap_or(false)
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl Handler for PanicHandler {
        async fn perform(&self) -> bool {
            panic!("boom");
        }
    }

    struct ScriptedResolver {
        results: Vec<bool>,
    }

    impl TypeResolver for ScriptedResolver {
        fn find_type_by_name(&self, qualified_name: &str) -> Option<(Box<dyn Handler>, HandlerHooks)> {
            match qualified_name {
                "demo.scripted" => Some((
                    Box::new(ScriptedHandler {
                        results: StdMutex::new({
                            let mut r = self.results.clone();
                            r.reverse();
                            r
                        }),
                    }),
                    HandlerHooks::default(),
                )),
                "demo.panics" => Some((Box::new(PanicHandler), HandlerHooks::default())),
                _ => None,
            }
        }
    }

    fn executor_for(results: Vec<bool>) -> Executor {
        executor_with_store(results).0
    }

    fn executor_with_store(results: Vec<bool>) -> (Executor, Arc<FakeStore>) {
        let resolver = Arc::new(ScriptedResolver { results });
        let registry = Arc::new(HandlerRegistry::new(resolver));
        let store = Arc::new(FakeStore::default());
        let executor = Executor::new(
            registry,
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(CronOracle),
            constant(Duration::from_secs(1)),
        );
        (executor, store)
    }

    #[tokio::test]
    async fn missing_handler_is_unsuccessful_without_raising() {
        let executor = executor_for(vec![]);
        let task = ScheduledTask::new(HandlerReference::new("demo", "missing"), Utc::now());
        let result = executor.execute(task, CancellationToken::new()).await.unwrap();
        assert_eq!(result.last_error.as_deref(), Some("Missing or invalid handler"));
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn successful_attempt_clears_lock_and_sets_succeeded_at() {
        let executor = executor_for(vec![true]);
        let mut task = ScheduledTask::new(HandlerReference::new("demo", "scripted"), Utc::now());
        task.locked_at = Some(Utc::now());
        task.locked_by = Some("worker-1".to_string());

        let result = executor.execute(task, CancellationToken::new()).await.unwrap();
        assert!(result.succeeded_at.is_some());
        assert!(result.locked_at.is_none());
        assert!(result.locked_by.is_none());
    }

    #[tokio::test]
    async fn terminal_failure_with_delete_on_failure_removes_row() {
        let executor = executor_for(vec![false]);
        let mut task = ScheduledTask::new(HandlerReference::new("demo", "scripted"), Utc::now());
        task.maximum_attempts = Some(1);
        task.delete_on_failure = true;

        let result = executor.execute(task, CancellationToken::new()).await.unwrap();
        assert!(result.failed_at.is_none());
    }

    #[tokio::test]
    async fn failing_attempt_applies_backoff() {
        let before = Utc::now();
        let executor = executor_for(vec![false]);
        let task = ScheduledTask::new(HandlerReference::new("demo", "scripted"), before);

        let result = executor.execute(task, CancellationToken::new()).await.unwrap();
        assert!(result.run_at >= before + chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn handler_panic_is_caught_and_classified() {
        let executor = executor_for(vec![]);
        let task = ScheduledTask::new(HandlerReference::new("demo", "panics"), Utc::now());

        let result = executor.execute(task, CancellationToken::new()).await.unwrap();
        assert_eq!(result.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn cancellation_is_recorded_and_surfaced_to_caller() {
        let executor = executor_for(vec![]);
        let task = ScheduledTask::new(HandlerReference::new("demo", "missing"), Utc::now());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor.execute(task, cancel).await;
        assert!(matches!(result, Err(SchedulerError::Cancelled)));
    }

    #[tokio::test]
    async fn recurring_task_clones_forward_on_success() {
        let (executor, store) = executor_with_store(vec![true]);
        let mut task = ScheduledTask::new(HandlerReference::new("demo", "scripted"), Utc::now());
        task.expression = Some("0 0 * * * *".to_string());
        task.continue_on_success = true;

        let original_run_at = task.run_at;
        let result = executor.execute(task, CancellationToken::new()).await.unwrap();
        assert!(result.succeeded_at.is_some());
        assert_eq!(result.run_at, original_run_at);

        let saved = store.saved.lock().await;
        // The original row plus the forward clone.
        assert_eq!(saved.len(), 2);
        let clone = &saved[1];
        assert_eq!(clone.attempts, 0);
        assert!(clone.run_at > original_run_at);
        assert_eq!(clone.start, original_run_at);
    }

    mockall::mock! {
        pub StoreImpl {}

        #[async_trait]
        impl Store for StoreImpl {
            async fn get_and_lock_next_available(&self, n: usize, worker_id: &str) -> SchedulerResult<Vec<ScheduledTask>>;
            async fn save(&self, task: &mut ScheduledTask) -> SchedulerResult<()>;
            async fn delete(&self, task: &ScheduledTask) -> SchedulerResult<()>;
        }
    }

    #[tokio::test]
    async fn successful_attempt_saves_exactly_once_with_no_recurrence() {
        let mut mock_store = MockStoreImpl::new();
        mock_store.expect_save().times(1).returning(|task| {
            task.id = Some(uuid::Uuid::new_v4());
            Ok(())
        });
        mock_store.expect_delete().times(0);

        let resolver = Arc::new(ScriptedResolver { results: vec![true] });
        let registry = Arc::new(HandlerRegistry::new(resolver));
        let executor = Executor::new(
            registry,
            Arc::new(mock_store) as Arc<dyn Store>,
            Arc::new(CronOracle),
            constant(Duration::from_secs(1)),
        );

        let task = ScheduledTask::new(HandlerReference::new("demo", "scripted"), Utc::now());
        let result = executor.execute(task, CancellationToken::new()).await.unwrap();
        assert!(result.succeeded_at.is_some());
    }
}
