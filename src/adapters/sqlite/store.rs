//! SQLite implementation of the `Store` port.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{HandlerReference, ScheduledTask};
use crate::domain::ports::Store;

/// Stale locks older than this are treated as expired and eligible for
/// reclaim by `get_and_lock_next_available`, independent of a task's own
/// `maximum_runtime` (which may be unset).
const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read-only listing for CLI/observability use; not part of the
    /// `Store` port since the engine itself never needs to browse rows.
    pub async fn list_recent(&self, limit: usize) -> SchedulerResult<Vec<ScheduledTask>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM scheduled_tasks ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ScheduledTask::try_from).collect()
    }

    /// Fetch a single row by id, without locking it. Used by the CLI's
    /// `show` command.
    pub async fn find_by_id(&self, id: Uuid) -> SchedulerResult<Option<ScheduledTask>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM scheduled_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ScheduledTask::try_from).transpose()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_and_lock_next_available(
        &self,
        n: usize,
        worker_id: &str,
    ) -> SchedulerResult<Vec<ScheduledTask>> {
        let now = Utc::now().to_rfc3339();
        let stale_before = (Utc::now() - chrono::Duration::from_std(LOCK_TIMEOUT).unwrap()).to_rfc3339();
        let limit = i64::try_from(n).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await?;

        let candidate_ids: Vec<(String,)> = sqlx::query_as(
            r#"SELECT id FROM scheduled_tasks
               WHERE run_at <= ?
                 AND (locked_at IS NULL OR locked_at <= ?)
               ORDER BY priority, run_at
               LIMIT ?"#,
        )
        .bind(&now)
        .bind(&stale_before)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if candidate_ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let mut claimed = Vec::with_capacity(candidate_ids.len());
        for (id,) in &candidate_ids {
            // Re-check the same unlocked-or-stale predicate on the write so a
            // concurrent claimant who already locked this row between our
            // SELECT and this UPDATE loses the race instead of both winning.
            let result = sqlx::query(
                r#"UPDATE scheduled_tasks SET locked_at = ?, locked_by = ?
                   WHERE id = ? AND (locked_at IS NULL OR locked_at <= ?)"#,
            )
            .bind(&now)
            .bind(worker_id)
            .bind(id)
            .bind(&stale_before)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                continue;
            }

            let row: TaskRow = sqlx::query_as("SELECT * FROM scheduled_tasks WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            claimed.push(ScheduledTask::try_from(row)?);
        }

        tx.commit().await?;
        Ok(claimed)
    }

    async fn save(&self, task: &mut ScheduledTask) -> SchedulerResult<()> {
        if task.id.is_none() {
            task.id = Some(Uuid::new_v4());
            task.created_at = Utc::now();
        }
        let id = task.id.expect("just assigned above if absent");
        let bindings = TaskRow::from_task(id, task);

        sqlx::query(
            r#"INSERT INTO scheduled_tasks (
                id, priority, attempts, handler_namespace, handler_entrypoint, handler_payload,
                run_at, maximum_runtime_ms, maximum_attempts, delete_on_success, delete_on_failure,
                delete_on_error, created_at, failed_at, succeeded_at, last_error, locked_at,
                locked_by, tags, expression, window_start, window_end, continue_on_success, continue_on_failure,
                continue_on_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                priority = excluded.priority,
                attempts = excluded.attempts,
                handler_namespace = excluded.handler_namespace,
                handler_entrypoint = excluded.handler_entrypoint,
                handler_payload = excluded.handler_payload,
                run_at = excluded.run_at,
                maximum_runtime_ms = excluded.maximum_runtime_ms,
                maximum_attempts = excluded.maximum_attempts,
                delete_on_success = excluded.delete_on_success,
                delete_on_failure = excluded.delete_on_failure,
                delete_on_error = excluded.delete_on_error,
                failed_at = excluded.failed_at,
                succeeded_at = excluded.succeeded_at,
                last_error = excluded.last_error,
                locked_at = excluded.locked_at,
                locked_by = excluded.locked_by,
                tags = excluded.tags,
                expression = excluded.expression,
                window_start = excluded.window_start,
                window_end = excluded.window_end,
                continue_on_success = excluded.continue_on_success,
                continue_on_failure = excluded.continue_on_failure,
                continue_on_error = excluded.continue_on_error"#,
        )
        .bind(bindings.id)
        .bind(bindings.priority)
        .bind(bindings.attempts)
        .bind(bindings.handler_namespace)
        .bind(bindings.handler_entrypoint)
        .bind(bindings.handler_payload)
        .bind(bindings.run_at)
        .bind(bindings.maximum_runtime_ms)
        .bind(bindings.maximum_attempts)
        .bind(bindings.delete_on_success)
        .bind(bindings.delete_on_failure)
        .bind(bindings.delete_on_error)
        .bind(bindings.created_at)
        .bind(bindings.failed_at)
        .bind(bindings.succeeded_at)
        .bind(bindings.last_error)
        .bind(bindings.locked_at)
        .bind(bindings.locked_by)
        .bind(bindings.tags)
        .bind(bindings.expression)
        .bind(bindings.window_start)
        .bind(bindings.window_end)
        .bind(bindings.continue_on_success)
        .bind(bindings.continue_on_failure)
        .bind(bindings.continue_on_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, task: &ScheduledTask) -> SchedulerResult<()> {
        let Some(id) = task.id else {
            return Ok(());
        };
        sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    priority: i64,
    attempts: i64,
    handler_namespace: String,
    handler_entrypoint: String,
    handler_payload: Option<String>,
    run_at: String,
    maximum_runtime_ms: Option<i64>,
    maximum_attempts: Option<i64>,
    delete_on_success: bool,
    delete_on_failure: bool,
    delete_on_error: bool,
    created_at: String,
    failed_at: Option<String>,
    succeeded_at: Option<String>,
    last_error: Option<String>,
    locked_at: Option<String>,
    locked_by: Option<String>,
    tags: String,
    expression: Option<String>,
    window_start: String,
    window_end: Option<String>,
    continue_on_success: bool,
    continue_on_failure: bool,
    continue_on_error: bool,
}

impl TaskRow {
    fn from_task(id: Uuid, task: &ScheduledTask) -> TaskRowBindings {
        TaskRowBindings {
            id: id.to_string(),
            priority: task.priority,
            attempts: i64::from(task.attempts),
            handler_namespace: task.handler.namespace.clone(),
            handler_entrypoint: task.handler.entrypoint.clone(),
            handler_payload: task.handler.payload.clone(),
            run_at: task.run_at.to_rfc3339(),
            maximum_runtime_ms: task.maximum_runtime.map(|d| d.as_millis() as i64),
            maximum_attempts: task.maximum_attempts.map(i64::from),
            delete_on_success: task.delete_on_success,
            delete_on_failure: task.delete_on_failure,
            delete_on_error: task.delete_on_error,
            created_at: task.created_at.to_rfc3339(),
            failed_at: task.failed_at.map(|t| t.to_rfc3339()),
            succeeded_at: task.succeeded_at.map(|t| t.to_rfc3339()),
            last_error: task.last_error.clone(),
            locked_at: task.locked_at.map(|t| t.to_rfc3339()),
            locked_by: task.locked_by.clone(),
            tags: serde_json::to_string(&task.tags).unwrap_or_else(|_| "[]".to_string()),
            expression: task.expression.clone(),
            window_start: task.start.to_rfc3339(),
            window_end: task.end.map(|t| t.to_rfc3339()),
            continue_on_success: task.continue_on_success,
            continue_on_failure: task.continue_on_failure,
            continue_on_error: task.continue_on_error,
        }
    }
}

struct TaskRowBindings {
    id: String,
    priority: i64,
    attempts: i64,
    handler_namespace: String,
    handler_entrypoint: String,
    handler_payload: Option<String>,
    run_at: String,
    maximum_runtime_ms: Option<i64>,
    maximum_attempts: Option<i64>,
    delete_on_success: bool,
    delete_on_failure: bool,
    delete_on_error: bool,
    created_at: String,
    failed_at: Option<String>,
    succeeded_at: Option<String>,
    last_error: Option<String>,
    locked_at: Option<String>,
    locked_by: Option<String>,
    tags: String,
    expression: Option<String>,
    window_start: String,
    window_end: Option<String>,
    continue_on_success: bool,
    continue_on_failure: bool,
    continue_on_error: bool,
}

impl TryFrom<TaskRow> for ScheduledTask {
    type Error = SchedulerError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = super::parse_uuid(&row.id)?;
        let handler = HandlerReference {
            namespace: row.handler_namespace,
            entrypoint: row.handler_entrypoint,
            payload: row.handler_payload,
        };

        let tags: HashSet<String> = serde_json::from_str(&row.tags)?;

        Ok(ScheduledTask {
            id: Some(id),
            priority: row.priority,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            handler,
            run_at: super::parse_datetime(&row.run_at)?,
            maximum_runtime: row.maximum_runtime_ms.map(|ms| Duration::from_millis(ms as u64)),
            maximum_attempts: row.maximum_attempts.map(|n| u32::try_from(n).unwrap_or(0)),
            delete_on_success: row.delete_on_success,
            delete_on_failure: row.delete_on_failure,
            delete_on_error: row.delete_on_error,
            created_at: super::parse_datetime(&row.created_at)?,
            failed_at: super::parse_optional_datetime(row.failed_at)?,
            succeeded_at: super::parse_optional_datetime(row.succeeded_at)?,
            last_error: row.last_error,
            locked_at: super::parse_optional_datetime(row.locked_at)?,
            locked_by: row.locked_by,
            tags,
            expression: row.expression,
            start: super::parse_datetime(&row.window_start)?,
            end: super::parse_optional_datetime(row.window_end)?,
            continue_on_success: row.continue_on_success,
            continue_on_failure: row.continue_on_failure,
            continue_on_error: row.continue_on_error,
        })
    }
}
