use crate::types::TaskOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Operation name of the inbound execute notification (platform to app).
/// Its arguments decode as [`crate::types::ExecutionRequest`].
pub const EXECUTE_TASK_OPERATION: &str = "executeTask";

/// One outbound call to the platform scheduler, as named on the wire.
///
/// RPC-backed `SchedulerPort` implementations encode each trait method as
/// one of these envelopes; the coordinator itself never leaves the typed
/// trait. Serializes to `{ "operation": ..., "arguments": ... }` with the
/// arguments member omitted for argument-free calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "arguments", rename_all = "camelCase")]
pub enum SchedulerRequest {
    Initialize,
    ScheduleTask(TaskOptions),
    #[serde(rename_all = "camelCase")]
    CancelTask { task_id: String },
    CancelAllTasks,
    GetScheduledTasks,
    #[serde(rename_all = "camelCase")]
    IsTaskScheduled { task_id: String },
    #[serde(rename_all = "camelCase")]
    ExecuteTaskNow { task_id: String },
    GetTaskResults,
    #[serde(rename_all = "camelCase")]
    GetTaskResult { task_id: String },
    ClearTaskResults,
    Ping,
}

impl SchedulerRequest {
    /// Render the operation name to wire format.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ScheduleTask(_) => "scheduleTask",
            Self::CancelTask { .. } => "cancelTask",
            Self::CancelAllTasks => "cancelAllTasks",
            Self::GetScheduledTasks => "getScheduledTasks",
            Self::IsTaskScheduled { .. } => "isTaskScheduled",
            Self::ExecuteTaskNow { .. } => "executeTaskNow",
            Self::GetTaskResults => "getTaskResults",
            Self::GetTaskResult { .. } => "getTaskResult",
            Self::ClearTaskResults => "clearTaskResults",
            Self::Ping => "ping",
        }
    }

    /// Render the argument map to wire format. `None` for argument-free
    /// operations; the map keys are always camelCase.
    pub fn arguments(&self) -> Option<Value> {
        match self {
            Self::ScheduleTask(options) => Some(json!(options)),
            Self::CancelTask { task_id }
            | Self::IsTaskScheduled { task_id }
            | Self::ExecuteTaskNow { task_id }
            | Self::GetTaskResult { task_id } => Some(json!({ "taskId": task_id })),
            Self::Initialize
            | Self::CancelAllTasks
            | Self::GetScheduledTasks
            | Self::GetTaskResults
            | Self::ClearTaskResults
            | Self::Ping => None,
        }
    }

    /// Parse an operation name and argument map received from the wire.
    pub fn decode(operation: &str, arguments: Option<Value>) -> Result<Self, serde_json::Error> {
        let envelope = match arguments {
            Some(args) => json!({ "operation": operation, "arguments": args }),
            None => json!({ "operation": operation }),
        };
        serde_json::from_value(envelope)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
