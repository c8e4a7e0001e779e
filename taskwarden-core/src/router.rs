use std::sync::Arc;

use async_trait::async_trait;

use crate::coordinator::Shared;
use crate::error::CoordinatorError;
use crate::types::{now_millis, ErrorContext, ExecutionRequest, ExecutionSink};

// ─── ExecutionRouter ────────────────────────────────────────────────────────

/// Receives due-job callbacks from the scheduler port and routes them to the
/// registered handler. The returned result is the port's completion signal,
/// so platform-level retry applies to handler failures.
pub struct ExecutionRouter {
    shared: Arc<Shared>,
}

impl ExecutionRouter {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn report(&self, err: &(dyn std::error::Error + Send + Sync), operation: &str, task_id: &str) {
        if let Some(ref hooks) = self.shared.hooks {
            hooks.on_unhandled_error(
                err,
                &ErrorContext {
                    operation: operation.to_string(),
                    task_id: Some(task_id.to_string()),
                },
            );
        }
    }
}

#[async_trait]
impl ExecutionSink for ExecutionRouter {
    async fn dispatch(&self, request: ExecutionRequest) -> Result<(), CoordinatorError> {
        let task_id = request.task_id;

        let handler = {
            let state = self.shared.state.lock().await;
            state.registry.lookup(&task_id)
        };
        let handler = match handler {
            Some(handler) => handler,
            None => return Err(CoordinatorError::TaskNotRegistered(task_id)),
        };

        // The attempt is recorded before the handler runs, so a crash
        // mid-run still shows up in the counters.
        let executed_at = now_millis();
        self.shared
            .store
            .record_execution(&task_id, executed_at)
            .await
            .map_err(|err| CoordinatorError::store("recordExecution", err))?;
        {
            let mut state = self.shared.state.lock().await;
            if let Some(task) = state.scheduled.iter_mut().find(|t| t.id == task_id) {
                task.execution_count += 1;
                task.last_executed = Some(executed_at);
            }
        }

        // The handler runs without the coordinator lock, so cancellations
        // and queries stay live during a long run.
        match handler.run(&task_id, request.data.as_ref()).await {
            Ok(()) => {
                {
                    let state = self.shared.state.lock().await;
                    state.events.publish(&task_id);
                }
                if let Some(ref hooks) = self.shared.hooks {
                    hooks.on_task_executed(&task_id);
                }
                Ok(())
            }
            Err(err) => {
                if let Err(store_err) = self.shared.store.record_failure(&task_id).await {
                    self.report(store_err.as_ref(), "recordFailure", &task_id);
                }
                {
                    let mut state = self.shared.state.lock().await;
                    if let Some(task) = state.scheduled.iter_mut().find(|t| t.id == task_id) {
                        task.failure_count += 1;
                    }
                }
                if let Some(ref hooks) = self.shared.hooks {
                    hooks.on_task_execution_failed(&task_id, err.as_ref());
                }
                Err(CoordinatorError::HandlerFailed {
                    task_id,
                    source: err,
                })
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{TaskCoordinator, TaskCoordinatorOptions};
    use crate::memory_adapters::{MemorySchedulerPort, MemoryTaskStore};
    use crate::registry::TaskHandler;
    use crate::types::{CoordinatorHooks, ScheduledTask, SchedulerPort, TaskOptions, TaskStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    // ─── Doubles ────────────────────────────────────────────────────────

    /// Captures what the handler saw: the request payload and the stored
    /// record as it looked while the handler was running.
    struct ProbeHandler {
        store: Arc<MemoryTaskStore>,
        seen_data: Mutex<Option<Option<HashMap<String, serde_json::Value>>>>,
        seen_record: Mutex<Option<ScheduledTask>>,
    }

    impl ProbeHandler {
        fn new(store: Arc<MemoryTaskStore>) -> Self {
            Self {
                store,
                seen_data: Mutex::new(None),
                seen_record: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TaskHandler for ProbeHandler {
        async fn run(
            &self,
            task_id: &str,
            data: Option<&HashMap<String, serde_json::Value>>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            *self.seen_data.lock().unwrap() = Some(data.cloned());
            *self.seen_record.lock().unwrap() = self.store.load(task_id).await?;
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl TaskHandler for FailingHandler {
        async fn run(
            &self,
            _task_id: &str,
            _data: Option<&HashMap<String, serde_json::Value>>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("boom".into())
        }
    }

    struct CountingHandler {
        runs: AtomicU64,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn run(
            &self,
            _task_id: &str,
            _data: Option<&HashMap<String, serde_json::Value>>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        executed: Mutex<Vec<String>>,
        failed: Mutex<Vec<String>>,
    }

    impl CoordinatorHooks for RecordingHooks {
        fn on_task_executed(&self, task_id: &str) {
            self.executed.lock().unwrap().push(task_id.to_string());
        }

        fn on_task_execution_failed(
            &self,
            task_id: &str,
            _err: &(dyn std::error::Error + Send + Sync),
        ) {
            self.failed.lock().unwrap().push(task_id.to_string());
        }
    }

    /// Store whose `save` can be switched off after the initial schedule.
    struct SaveFailStore {
        inner: MemoryTaskStore,
        fail_save: AtomicBool,
    }

    impl SaveFailStore {
        fn new() -> Self {
            Self {
                inner: MemoryTaskStore::new(),
                fail_save: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl TaskStore for SaveFailStore {
        async fn save(
            &self,
            task: &ScheduledTask,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.fail_save.load(Ordering::SeqCst) {
                return Err("save failed".into());
            }
            self.inner.save(task).await
        }

        async fn load(
            &self,
            task_id: &str,
        ) -> Result<Option<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>> {
            self.inner.load(task_id).await
        }

        async fn load_all(
            &self,
        ) -> Result<Vec<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>> {
            self.inner.load_all().await
        }

        async fn remove(
            &self,
            task_id: &str,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.inner.remove(task_id).await
        }

        async fn clear_all(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.inner.clear_all().await
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    fn make_stack(
        hooks: Option<Arc<dyn CoordinatorHooks>>,
    ) -> (TaskCoordinator, Arc<MemorySchedulerPort>, Arc<MemoryTaskStore>) {
        let port = Arc::new(MemorySchedulerPort::new());
        let store = Arc::new(MemoryTaskStore::new());
        let coordinator = TaskCoordinator::new(TaskCoordinatorOptions {
            scheduler: Arc::clone(&port) as Arc<dyn SchedulerPort>,
            store: Arc::clone(&store) as Arc<dyn TaskStore>,
            hooks,
            config: None,
        });
        (coordinator, port, store)
    }

    // ─── Dispatch: payload and bookkeeping ──────────────────────────────

    #[tokio::test]
    async fn dispatch_delivers_scheduling_time_payload() {
        let (coordinator, _port, store) = make_stack(None);
        coordinator.initialize().await.unwrap();

        let handler = Arc::new(ProbeHandler::new(Arc::clone(&store)));
        coordinator
            .register_task("sync", Arc::clone(&handler) as Arc<dyn TaskHandler>)
            .await
            .unwrap();

        let mut data = HashMap::new();
        data.insert("endpoint".to_string(), json!("https://example.com"));
        let mut options = TaskOptions::new("sync");
        options.data = Some(data.clone());
        coordinator.schedule_task(options).await.unwrap();

        coordinator.execute_task_now("sync").await.unwrap();

        assert_eq!(*handler.seen_data.lock().unwrap(), Some(Some(data)));
    }

    #[tokio::test]
    async fn dispatch_records_the_attempt_before_the_handler_runs() {
        let (coordinator, _port, store) = make_stack(None);
        coordinator.initialize().await.unwrap();

        let handler = Arc::new(ProbeHandler::new(Arc::clone(&store)));
        coordinator
            .register_task("sync", Arc::clone(&handler) as Arc<dyn TaskHandler>)
            .await
            .unwrap();
        coordinator.schedule_task(TaskOptions::new("sync")).await.unwrap();

        coordinator.execute_task_now("sync").await.unwrap();

        let seen = handler.seen_record.lock().unwrap().clone().unwrap();
        assert_eq!(seen.execution_count, 1);
        assert!(seen.last_executed.is_some());
        assert_eq!(seen.failure_count, 0);
    }

    #[tokio::test]
    async fn dispatch_without_registered_handler_is_reported_to_the_port() {
        // A restarted process restores its jobs from the store but starts
        // with an empty registry; firing such a job is a hard error.
        let (coordinator, port, store) = make_stack(None);
        coordinator.initialize().await.unwrap();
        coordinator
            .register_task("sync", Arc::new(CountingHandler { runs: AtomicU64::new(0) }))
            .await
            .unwrap();
        coordinator.schedule_task(TaskOptions::new("sync")).await.unwrap();
        drop(coordinator);

        let restarted = TaskCoordinator::new(TaskCoordinatorOptions {
            scheduler: Arc::clone(&port) as Arc<dyn SchedulerPort>,
            store: Arc::clone(&store) as Arc<dyn TaskStore>,
            hooks: None,
            config: None,
        });
        restarted.initialize().await.unwrap();
        assert_eq!(restarted.scheduled_tasks().await.unwrap().len(), 1);

        // The port acks and keeps the error as the task's result.
        port.execute_task_now("sync").await.unwrap();
        let result = port.task_result("sync").await.unwrap().unwrap();
        assert!(result.contains("No task registered"), "got: {result}");

        // The attempt never reached the counters.
        let stored = store.load("sync").await.unwrap().unwrap();
        assert_eq!(stored.execution_count, 0);
    }

    // ─── Dispatch: success path ─────────────────────────────────────────

    #[tokio::test]
    async fn dispatch_success_publishes_id_and_fires_hook() {
        let hooks = Arc::new(RecordingHooks::default());
        let (coordinator, _port, _store) =
            make_stack(Some(Arc::clone(&hooks) as Arc<dyn CoordinatorHooks>));
        coordinator.initialize().await.unwrap();
        coordinator
            .register_task("sync", Arc::new(CountingHandler { runs: AtomicU64::new(0) }))
            .await
            .unwrap();
        coordinator.schedule_task(TaskOptions::new("sync")).await.unwrap();

        let mut rx = coordinator.subscribe_executions().await.unwrap();
        coordinator.execute_task_now("sync").await.unwrap();

        assert_eq!(rx.try_recv().unwrap(), "sync");
        assert_eq!(*hooks.executed.lock().unwrap(), vec!["sync"]);
        assert!(hooks.failed.lock().unwrap().is_empty());
    }

    // ─── Dispatch: failure path ─────────────────────────────────────────

    #[tokio::test]
    async fn dispatch_failure_counts_and_propagates() {
        let hooks = Arc::new(RecordingHooks::default());
        let (coordinator, port, store) =
            make_stack(Some(Arc::clone(&hooks) as Arc<dyn CoordinatorHooks>));
        coordinator.initialize().await.unwrap();
        coordinator
            .register_task("sync", Arc::new(FailingHandler))
            .await
            .unwrap();
        coordinator.schedule_task(TaskOptions::new("sync")).await.unwrap();

        let mut rx = coordinator.subscribe_executions().await.unwrap();
        coordinator.execute_task_now("sync").await.unwrap();

        // The attempt and the failure are both on the record.
        let stored = store.load("sync").await.unwrap().unwrap();
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.failure_count, 1);

        // The cache mirrors the store.
        let cached = &coordinator.scheduled_tasks().await.unwrap()[0];
        assert_eq!(cached.execution_count, 1);
        assert_eq!(cached.failure_count, 1);

        // The handler error reached the port's completion signal.
        let result = port.task_result("sync").await.unwrap().unwrap();
        assert!(result.contains("boom"), "got: {result}");

        // No execution event for a failed run.
        assert!(rx.try_recv().is_err());
        assert_eq!(*hooks.failed.lock().unwrap(), vec!["sync"]);
        assert!(hooks.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_bookkeeping_failure_prevents_the_run() {
        let port = Arc::new(MemorySchedulerPort::new());
        let store = Arc::new(SaveFailStore::new());
        let coordinator = TaskCoordinator::new(TaskCoordinatorOptions {
            scheduler: Arc::clone(&port) as Arc<dyn SchedulerPort>,
            store: Arc::clone(&store) as Arc<dyn TaskStore>,
            hooks: None,
            config: None,
        });
        coordinator.initialize().await.unwrap();

        let handler = Arc::new(CountingHandler { runs: AtomicU64::new(0) });
        coordinator
            .register_task("sync", Arc::clone(&handler) as Arc<dyn TaskHandler>)
            .await
            .unwrap();
        coordinator.schedule_task(TaskOptions::new("sync")).await.unwrap();

        store.fail_save.store(true, Ordering::SeqCst);
        coordinator.execute_task_now("sync").await.unwrap();

        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
        let result = port.task_result("sync").await.unwrap().unwrap();
        assert!(result.contains("recordExecution"), "got: {result}");
    }
}
