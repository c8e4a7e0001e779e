use crate::error::CoordinatorError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A named unit of deferred work.
///
/// One capability only: run with the payload that was attached when the task
/// was scheduled. Anything else a handler needs it must capture itself.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(
        &self,
        task_id: &str,
        data: Option<&HashMap<String, serde_json::Value>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// In-memory table of registered handlers, keyed by task id.
///
/// Never persisted. The embedding application rebuilds it on every process
/// start, before any previously scheduled job gets a chance to fire.
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under an id. Ids are claimed exactly once;
    /// a second registration fails and changes nothing.
    pub fn register(
        &mut self,
        task_id: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), CoordinatorError> {
        let task_id = task_id.into();
        if self.handlers.contains_key(&task_id) {
            return Err(CoordinatorError::DuplicateTask(task_id));
        }
        self.handlers.insert(task_id, handler);
        Ok(())
    }

    /// Remove a handler. Unknown ids are ignored.
    pub fn unregister(&mut self, task_id: &str) {
        self.handlers.remove(task_id);
    }

    pub fn lookup(&self, task_id: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_id).cloned()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.handlers.contains_key(task_id)
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct NoopHandler;

    #[async_trait]
    impl TaskHandler for NoopHandler {
        async fn run(
            &self,
            _task_id: &str,
            _data: Option<&HashMap<String, serde_json::Value>>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
    }

    struct RecordingHandler {
        runs: Mutex<Vec<(String, Option<HashMap<String, serde_json::Value>>)>>,
    }

    impl RecordingHandler {
        fn new() -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        async fn run(
            &self,
            task_id: &str,
            data: Option<&HashMap<String, serde_json::Value>>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.runs
                .lock()
                .unwrap()
                .push((task_id.to_string(), data.cloned()));
            Ok(())
        }
    }

    #[test]
    fn register_makes_the_handler_visible() {
        let mut registry = TaskRegistry::new();
        registry.register("sync", Arc::new(NoopHandler)).unwrap();
        assert!(registry.contains("sync"));
        assert_eq!(registry.count(), 1);
        assert!(registry.lookup("sync").is_some());
    }

    #[test]
    fn duplicate_registration_is_rejected_and_changes_nothing() {
        let mut registry = TaskRegistry::new();
        let first: Arc<dyn TaskHandler> = Arc::new(NoopHandler);
        registry.register("sync", first.clone()).unwrap();

        let result = registry.register("sync", Arc::new(NoopHandler));
        assert!(matches!(result, Err(CoordinatorError::DuplicateTask(id)) if id == "sync"));
        assert_eq!(registry.count(), 1);
        let kept = registry.lookup("sync").unwrap();
        assert!(Arc::ptr_eq(&kept, &first));
    }

    #[test]
    fn unregister_removes_the_handler() {
        let mut registry = TaskRegistry::new();
        registry.register("sync", Arc::new(NoopHandler)).unwrap();
        registry.unregister("sync");
        assert!(!registry.contains("sync"));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn unregister_of_an_unknown_id_is_silent() {
        let mut registry = TaskRegistry::new();
        registry.unregister("never-registered");
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn lookup_of_an_unknown_id_returns_none() {
        let registry = TaskRegistry::new();
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn clear_empties_the_table() {
        let mut registry = TaskRegistry::new();
        registry.register("a", Arc::new(NoopHandler)).unwrap();
        registry.register("b", Arc::new(NoopHandler)).unwrap();
        registry.clear();
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn a_looked_up_handler_receives_id_and_payload() {
        let mut registry = TaskRegistry::new();
        let handler = Arc::new(RecordingHandler::new());
        registry.register("upload", handler.clone()).unwrap();

        let mut data = HashMap::new();
        data.insert("file".to_string(), json!("report.pdf"));

        let looked_up = registry.lookup("upload").unwrap();
        looked_up.run("upload", Some(&data)).await.unwrap();

        let runs = handler.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, "upload");
        assert_eq!(runs[0].1.as_ref().unwrap()["file"], json!("report.pdf"));
    }
}
