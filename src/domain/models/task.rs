//! Scheduled task domain model.
//!
//! A `ScheduledTask` is a persistent record describing one unit of work: a
//! handler reference, a due time, retry/runtime limits, and optional
//! recurrence. The store is the sole arbiter of which worker owns a row;
//! the engine never coordinates across tasks by any other means.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::occurrence_oracle::OccurrenceOracle;

/// Reference to a handler type plus an optional serialized instance
/// payload, resolvable by a `TypeResolver` as `"{namespace}.{entrypoint}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerReference {
    /// Namespace-like prefix grouping related handlers.
    pub namespace: String,
    /// Entrypoint name within the namespace.
    pub entrypoint: String,
    /// Optional JSON payload injected into the handler before execution.
    pub payload: Option<String>,
}

impl HandlerReference {
    /// Construct a reference with no instance payload.
    pub fn new(namespace: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entrypoint: entrypoint.into(),
            payload: None,
        }
    }

    /// Attach an instance payload, used by the registry cache key so that
    /// stateful handlers with different payloads do not alias.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// The qualified name a `TypeResolver` looks up: `"{namespace}.{entrypoint}"`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.entrypoint)
    }
}

/// A durable, recurring, prioritized unit of work.
///
/// See the module documentation for the lifecycle. Fields map directly to
/// columns in the `scheduled_tasks` table maintained by the SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Store-assigned identifier. `None` means "not yet persisted".
    pub id: Option<Uuid>,
    /// Separates tasks into independent FIFO queues; no intrinsic order
    /// between distinct values is implied by the engine.
    pub priority: i64,
    /// Count of execution attempts so far, including the in-flight one.
    pub attempts: u32,
    /// Handler type plus optional instance payload.
    pub handler: HandlerReference,
    /// Earliest wall-clock time (UTC) at which this task may run.
    pub run_at: DateTime<Utc>,
    /// Optional cap on the duration of a single attempt.
    pub maximum_runtime: Option<Duration>,
    /// Optional upper bound on attempts; reaching it makes the next
    /// failure terminal.
    pub maximum_attempts: Option<u32>,
    /// Delete the row once an attempt succeeds.
    pub delete_on_success: bool,
    /// Delete the row once an attempt terminally fails.
    pub delete_on_failure: bool,
    /// Declared but never consulted by the save rules (see DESIGN.md);
    /// kept because the record format requires it.
    pub delete_on_error: bool,
    /// When the row was first persisted.
    pub created_at: DateTime<Utc>,
    /// Set when an attempt terminally fails.
    pub failed_at: Option<DateTime<Utc>>,
    /// Set when an attempt succeeds.
    pub succeeded_at: Option<DateTime<Utc>>,
    /// Message from the most recent unsuccessful or errored attempt.
    pub last_error: Option<String>,
    /// Non-null exactly when a worker currently owns this row.
    pub locked_at: Option<DateTime<Utc>>,
    /// Identifier of the worker holding the lock.
    pub locked_by: Option<String>,
    /// Opaque, unordered labels.
    pub tags: HashSet<String>,
    /// Cron expression driving recurrence; absent means one-shot.
    pub expression: Option<String>,
    /// Lower bound of the recurrence window; advances to `run_at` on each
    /// clone.
    pub start: DateTime<Utc>,
    /// Upper bound of the recurrence window. `None` means unbounded.
    pub end: Option<DateTime<Utc>>,
    /// Clone forward after a successful attempt.
    pub continue_on_success: bool,
    /// Clone forward after a terminally-failed attempt.
    pub continue_on_failure: bool,
    /// Clone forward after an errored attempt.
    pub continue_on_error: bool,
}

impl ScheduledTask {
    /// Build a one-shot task due immediately, with the continuation flags
    /// defaulted to `true` per §3.1.
    pub fn new(handler: HandlerReference, run_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            priority: 0,
            attempts: 0,
            handler,
            run_at,
            maximum_runtime: None,
            maximum_attempts: None,
            delete_on_success: false,
            delete_on_failure: false,
            delete_on_error: false,
            created_at: Utc::now(),
            failed_at: None,
            succeeded_at: None,
            last_error: None,
            locked_at: None,
            locked_by: None,
            tags: HashSet::new(),
            expression: None,
            start: run_at,
            end: None,
            continue_on_success: true,
            continue_on_failure: true,
            continue_on_error: true,
        }
    }

    /// Attempts have reached (or exceeded) the configured ceiling, i.e. the
    /// next failure is terminal. A `None` or zero ceiling never fires.
    pub fn job_will_fail(&self) -> bool {
        match self.maximum_attempts {
            Some(max) if max > 0 => self.attempts >= max,
            _ => false,
        }
    }

    /// True iff the lock has been held past 125% of `maximum_runtime`.
    /// External janitorial sweeps use this to decide whether to break a
    /// stale lock; the engine itself only exposes the probe.
    pub fn running_overtime(&self, now: DateTime<Utc>) -> bool {
        match (self.locked_at, self.maximum_runtime) {
            (Some(locked_at), Some(max_runtime)) => {
                let elapsed = now - locked_at;
                let threshold_nanos = max_runtime.as_nanos().saturating_mul(5) / 4;
                let threshold_nanos = i64::try_from(threshold_nanos).unwrap_or(i64::MAX);
                let threshold = chrono::Duration::nanoseconds(threshold_nanos);
                elapsed >= threshold
            }
            _ => false,
        }
    }

    /// Next wall-clock occurrence after `run_at`, or `None` if this task
    /// has no recurrence expression. Never materializes more than one
    /// instant even for an infinite series.
    pub fn next_occurrence(&self, oracle: &dyn OccurrenceOracle) -> crate::domain::errors::SchedulerResult<Option<DateTime<Utc>>> {
        let Some(expression) = self.expression.as_deref() else {
            return Ok(None);
        };
        if expression.trim().is_empty() {
            return Ok(None);
        }
        let candidate = oracle.next(expression, self.run_at)?;
        Ok(candidate.filter(|occurrence| self.end.is_none_or(|end| *occurrence <= end)))
    }

    /// All occurrences in `(start, end]` for a finite series. Errors with
    /// `InvalidSeriesBounds` if `end` is unset — enumerating a full series
    /// with no upper bound would require materializing an infinite list.
    pub fn finite_series_occurrences(
        &self,
        oracle: &dyn OccurrenceOracle,
    ) -> crate::domain::errors::SchedulerResult<Vec<DateTime<Utc>>> {
        let Some(end) = self.end else {
            return Err(crate::domain::errors::SchedulerError::InvalidSeriesBounds);
        };
        let Some(expression) = self.expression.as_deref() else {
            return Ok(Vec::new());
        };
        oracle.between(expression, self.start, end)
    }

    /// The last occurrence of a finite series, or `None` if the series has
    /// no occurrences within its bounds. Errors with `InvalidSeriesBounds`
    /// if `end` is unset, same as `finite_series_occurrences`.
    pub fn last_occurrence(
        &self,
        oracle: &dyn OccurrenceOracle,
    ) -> crate::domain::errors::SchedulerResult<Option<DateTime<Utc>>> {
        Ok(self.finite_series_occurrences(oracle)?.into_iter().last())
    }

    /// Whether recurrence should clone forward given the outcome of the
    /// attempt just completed.
    pub fn should_repeat(&self, success: bool, errored: bool) -> bool {
        (success && self.continue_on_success)
            || (!success && !errored && self.continue_on_failure)
            || (errored && self.continue_on_error)
    }

    /// Produce the next occurrence's clone: a fresh row at `next_run_at`
    /// with attempts reset and lifecycle fields cleared. The caller is
    /// responsible for persisting it; the original row is left untouched
    /// beyond the `start` advance already applied to `self`.
    #[must_use]
    pub fn clone_forward(&self, next_run_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            priority: self.priority,
            attempts: 0,
            handler: self.handler.clone(),
            run_at: next_run_at,
            maximum_runtime: self.maximum_runtime,
            maximum_attempts: self.maximum_attempts,
            delete_on_success: self.delete_on_success,
            delete_on_failure: self.delete_on_failure,
            delete_on_error: self.delete_on_error,
            created_at: Utc::now(),
            failed_at: None,
            succeeded_at: None,
            last_error: None,
            locked_at: None,
            locked_by: None,
            tags: self.tags.clone(),
            expression: self.expression.clone(),
            start: self.start,
            end: self.end,
            continue_on_success: self.continue_on_success,
            continue_on_failure: self.continue_on_failure,
            continue_on_error: self.continue_on_error,
        }
    }
}
