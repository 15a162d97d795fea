//! Subcommand handlers, each a thin adapter between clap args and the
//! engine's service layer.

use anyhow::{Context, Result};
use chrono::Utc;
use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use uuid::Uuid;

use crate::adapters::sqlite::SqliteStore;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{HandlerReference, ScheduledTask};
use crate::services::{Control, Submitter};

#[derive(Debug, serde::Serialize)]
pub struct TaskOutput {
    pub id: Option<String>,
    pub priority: i64,
    pub attempts: u32,
    pub handler: String,
    pub run_at: String,
    pub expression: Option<String>,
    pub last_error: Option<String>,
    pub locked_by: Option<String>,
}

impl From<&ScheduledTask> for TaskOutput {
    fn from(task: &ScheduledTask) -> Self {
        Self {
            id: task.id.map(|id| id.to_string()),
            priority: task.priority,
            attempts: task.attempts,
            handler: task.handler.qualified_name(),
            run_at: task.run_at.to_rfc3339(),
            expression: task.expression.clone(),
            last_error: task.last_error.clone(),
            locked_by: task.locked_by.clone(),
        }
    }
}

impl CommandOutput for TaskOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("ID: {}", self.id.as_deref().unwrap_or("(unassigned)")),
            format!("Handler: {}", self.handler),
            format!("Priority: {}", self.priority),
            format!("Attempts: {}", self.attempts),
            format!("RunAt: {}", self.run_at),
        ];
        if let Some(expr) = &self.expression {
            lines.push(format!("Expression: {expr}"));
        }
        if let Some(locked_by) = &self.locked_by {
            lines.push(format!("LockedBy: {locked_by}"));
        }
        if let Some(err) = &self.last_error {
            lines.push(format!("LastError: {err}"));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskOutput>,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }

        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(["ID", "PRIORITY", "ATTEMPTS", "HANDLER", "RUN_AT"].map(|h| {
                Cell::new(h).set_alignment(CellAlignment::Left)
            }));

        for task in &self.tasks {
            table.add_row([
                task.id.as_deref().unwrap_or("(unassigned)").to_string(),
                task.priority.to_string(),
                task.attempts.to_string(),
                truncate(&task.handler, 40),
                task.run_at.clone(),
            ]);
        }

        format!("{} task(s):\n{table}", self.tasks.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Build the task described by the `submit` subcommand's arguments.
#[allow(clippy::too_many_arguments)]
fn build_task(
    namespace: String,
    entrypoint: String,
    payload: Option<String>,
    priority: i64,
    delay_secs: i64,
    expression: Option<String>,
    maximum_attempts: Option<u32>,
    maximum_runtime_ms: Option<u64>,
) -> ScheduledTask {
    let mut handler = HandlerReference::new(namespace, entrypoint);
    if let Some(payload) = payload {
        handler = handler.with_payload(payload);
    }

    let run_at = Utc::now() + chrono::Duration::seconds(delay_secs);
    let mut task = ScheduledTask::new(handler, run_at);
    task.priority = priority;
    task.expression = expression;
    task.maximum_attempts = maximum_attempts;
    task.maximum_runtime = maximum_runtime_ms.map(std::time::Duration::from_millis);
    task
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_submit(
    submitter: &Submitter,
    namespace: String,
    entrypoint: String,
    payload: Option<String>,
    priority: i64,
    delay_secs: i64,
    expression: Option<String>,
    maximum_attempts: Option<u32>,
    maximum_runtime_ms: Option<u64>,
    json_mode: bool,
) -> Result<()> {
    let task = build_task(
        namespace,
        entrypoint,
        payload,
        priority,
        delay_secs,
        expression,
        maximum_attempts,
        maximum_runtime_ms,
    );

    let submitted = submitter
        .submit(task, tokio_util::sync::CancellationToken::new())
        .await
        .context("failed to submit task")?;

    output(&TaskOutput::from(&submitted), json_mode);
    Ok(())
}

pub async fn handle_list(store: &SqliteStore, limit: usize, json_mode: bool) -> Result<()> {
    let tasks = store.list_recent(limit).await.context("failed to list tasks")?;
    let result = TaskListOutput {
        tasks: tasks.iter().map(TaskOutput::from).collect(),
    };
    output(&result, json_mode);
    Ok(())
}

pub async fn handle_show(store: &SqliteStore, id: &str, json_mode: bool) -> Result<()> {
    let uuid = Uuid::parse_str(id).context("task id must be a valid UUID")?;
    let task = store
        .find_by_id(uuid)
        .await
        .context("failed to look up task")?
        .with_context(|| format!("no task found with id {id}"))?;

    output(&TaskOutput::from(&task), json_mode);
    Ok(())
}

pub async fn handle_run(control: &Control) -> Result<()> {
    control.start(true).await.context("failed to start the poll loop")?;
    tracing::info!("scheduler running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    control.dispose().await;
    Ok(())
}
