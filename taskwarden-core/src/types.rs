use crate::error::CoordinatorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ─── Task Options ───────────────────────────────────────────────────────────

fn default_max_retry_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    pub id: String,
    #[serde(default)]
    pub periodic: bool,
    #[serde(rename = "frequency", skip_serializing_if = "Option::is_none")]
    pub frequency_ms: Option<u64>,
    #[serde(rename = "initialDelay", default)]
    pub initial_delay_ms: u64,
    #[serde(default)]
    pub requires_charging: bool,
    #[serde(default)]
    pub requires_wifi: bool,
    #[serde(default)]
    pub retry_on_fail: bool,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,
}

impl TaskOptions {
    /// A one-shot task with no constraints, no delay, and no payload.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            periodic: false,
            frequency_ms: None,
            initial_delay_ms: 0,
            requires_charging: false,
            requires_wifi: false,
            retry_on_fail: false,
            max_retry_attempts: default_max_retry_attempts(),
            data: None,
        }
    }
}

// ─── Scheduled Task Record ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub options: TaskOptions,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<u64>,
    pub execution_count: u32,
    pub failure_count: u32,
    pub scheduled_at: u64,
}

// ─── Execution Request ──────────────────────────────────────────────────────

/// Inbound notification that a scheduled job is due. `data` is whatever was
/// attached at scheduling time; the scheduler never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,
}

// ─── Port Interfaces ────────────────────────────────────────────────────────

/// Receives "execute this task now" callbacks from the scheduler port.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    /// The returned result is the completion signal the platform uses for
    /// its own retry bookkeeping; an `Err` means the run did not succeed.
    async fn dispatch(&self, request: ExecutionRequest) -> Result<(), CoordinatorError>;
}

/// The OS-level job scheduler, reached across a process or privilege
/// boundary. Submitting a job hands responsibility for timing and resource
/// constraints to the platform; the coordinator only mirrors what it
/// submitted.
#[async_trait]
pub trait SchedulerPort: Send + Sync {
    async fn initialize(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn schedule_task(&self, options: &TaskOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn cancel_task(&self, task_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn cancel_all_tasks(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Platform-side view of submitted jobs. A port that tracks no state may
    /// return an empty list; the coordinator never consults this for its own
    /// queries.
    async fn get_scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>>;
    async fn is_task_scheduled(&self, task_id: &str) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    async fn execute_task_now(&self, task_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn task_results(&self) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>>;
    async fn task_result(&self, task_id: &str) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;
    async fn clear_task_results(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn ping(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Infallible: installing or removing the sink must always succeed so
    /// that `reset` cannot fail.
    async fn set_execution_sink(&self, sink: Option<Arc<dyn ExecutionSink>>);
}

/// Durable record store for scheduled task state. Survives process restarts;
/// the platform scheduler does not share this storage.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: &ScheduledTask) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn load(&self, task_id: &str) -> Result<Option<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>>;
    async fn load_all(&self) -> Result<Vec<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>>;
    async fn remove(&self, task_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn clear_all(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Bump the execution counter and stamp the execution time. Load-then-save;
    /// concurrent bumps for one id can lose an update, which is accepted
    /// because the platform serializes runs per task id. Missing record is a
    /// no-op.
    async fn record_execution(&self, task_id: &str, executed_at: u64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(mut task) = self.load(task_id).await? {
            task.execution_count += 1;
            task.last_executed = Some(executed_at);
            self.save(&task).await?;
        }
        Ok(())
    }

    /// Bump the failure counter. Missing record is a no-op.
    async fn record_failure(&self, task_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(mut task) = self.load(task_id).await? {
            task.failure_count += 1;
            self.save(&task).await?;
        }
        Ok(())
    }

    /// Flip the record inactive without deleting its history. Missing record
    /// is a no-op.
    async fn mark_inactive(&self, task_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(mut task) = self.load(task_id).await? {
            task.is_active = false;
            self.save(&task).await?;
        }
        Ok(())
    }
}

// ─── Hooks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Hooks for observing coordinator activity.
///
/// All methods have default no-op implementations, so consumers only
/// need to implement the hooks they care about.
pub trait CoordinatorHooks: Send + Sync {
    fn on_task_executed(&self, _task_id: &str) {}
    fn on_task_execution_failed(&self, _task_id: &str, _err: &(dyn std::error::Error + Send + Sync)) {}
    fn on_record_pruned(&self, _task_id: &str) {}
    fn on_unhandled_error(&self, _err: &(dyn std::error::Error + Send + Sync), _context: &ErrorContext) {}
}

// ─── Time ───────────────────────────────────────────────────────────────────

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_millis() as u64
}

// ─── Tests ──────────────────────────────────────────────────────────────────
