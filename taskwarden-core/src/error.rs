/// Every fallible coordinator operation returns exactly one of these.
/// Callers match on the variant; there is no success-with-warning shape.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid task options: {0}")]
    InvalidOptions(String),

    #[error("Frequency {frequency_ms}ms is below the 15-minute platform minimum")]
    FrequencyTooLow { frequency_ms: u64 },

    #[error("Coordinator is not initialized")]
    NotInitialized,

    #[error("A task with id '{0}' is already registered")]
    DuplicateTask(String),

    #[error("No task registered with id '{0}'")]
    TaskNotRegistered(String),

    #[error("Scheduler operation '{operation}' failed: {message}")]
    Scheduler { operation: &'static str, message: String },

    #[error("Store operation '{operation}' failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Handler for task '{task_id}' failed: {source}")]
    HandlerFailed {
        task_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CoordinatorError {
    /// Wrap a scheduler port failure, keeping the wire operation name.
    pub fn scheduler(operation: &'static str, err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Scheduler {
            operation,
            message: err.to_string(),
        }
    }

    /// Wrap a store failure, keeping the attempted operation and the cause.
    pub fn store(operation: &'static str, err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Store {
            operation,
            source: err,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
