use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::events::ExecutionEvents;
use crate::registry::{TaskHandler, TaskRegistry};
use crate::router::ExecutionRouter;
use crate::types::{
    now_millis, CoordinatorHooks, ErrorContext, ExecutionSink, ScheduledTask, SchedulerPort,
    TaskOptions, TaskStore,
};
use crate::validate::validate;

// ─── TaskCoordinatorOptions ─────────────────────────────────────────────────

pub struct TaskCoordinatorOptions {
    pub scheduler: Arc<dyn SchedulerPort>,
    pub store: Arc<dyn TaskStore>,
    pub hooks: Option<Arc<dyn CoordinatorHooks>>,
    pub config: Option<CoordinatorConfig>,
}

// ─── Shared state ───────────────────────────────────────────────────────────

pub(crate) struct State {
    pub(crate) initialized: bool,
    pub(crate) registry: TaskRegistry,
    pub(crate) scheduled: Vec<ScheduledTask>,
    pub(crate) events: ExecutionEvents,
}

pub(crate) struct Shared {
    pub(crate) scheduler: Arc<dyn SchedulerPort>,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) hooks: Option<Arc<dyn CoordinatorHooks>>,
    pub(crate) config: CoordinatorConfig,
    pub(crate) state: Mutex<State>,
}

// ─── TaskCoordinator ────────────────────────────────────────────────────────

pub struct TaskCoordinator {
    shared: Arc<Shared>,
}

impl TaskCoordinator {
    pub fn new(opts: TaskCoordinatorOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                scheduler: opts.scheduler,
                store: opts.store,
                hooks: opts.hooks,
                config: opts.config.unwrap_or_default(),
                state: Mutex::new(State {
                    initialized: false,
                    registry: TaskRegistry::new(),
                    scheduled: Vec::new(),
                    events: ExecutionEvents::new(),
                }),
            }),
        }
    }

    // ─── Registry pass-throughs ──────────────────────────────────────────

    /// Callable in any state: handlers must exist before `initialize`
    /// restores jobs the platform may fire at any moment.
    pub async fn register_task(
        &self,
        task_id: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), CoordinatorError> {
        let mut state = self.shared.state.lock().await;
        state.registry.register(task_id, handler)
    }

    pub async fn unregister_task(&self, task_id: &str) {
        let mut state = self.shared.state.lock().await;
        state.registry.unregister(task_id);
    }

    pub async fn registered_task_count(&self) -> usize {
        let state = self.shared.state.lock().await;
        state.registry.count()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Idempotent: once ready, returns `Ok` without touching the scheduler
    /// port again. On failure the coordinator stays uninitialized and the
    /// call can be retried.
    pub async fn initialize(&self) -> Result<(), CoordinatorError> {
        let mut state = self.shared.state.lock().await;
        if state.initialized {
            return Ok(());
        }

        self.shared
            .scheduler
            .initialize()
            .await
            .map_err(|err| CoordinatorError::scheduler("initialize", err))?;

        let router: Arc<dyn ExecutionSink> =
            Arc::new(ExecutionRouter::new(Arc::clone(&self.shared)));
        self.shared.scheduler.set_execution_sink(Some(router)).await;

        let records = self
            .shared
            .store
            .load_all()
            .await
            .map_err(|err| CoordinatorError::store("loadAll", err))?;

        let now = now_millis();
        let max_age_ms = self.shared.config.stale_record_age_ms();
        let prune = self.shared.config.prune_stale_records();
        let mut cache = Vec::new();
        for record in records {
            if record.is_active {
                cache.push(record);
            } else if prune && is_stale(&record, max_age_ms, now) {
                match self.shared.store.remove(&record.id).await {
                    Ok(()) => {
                        if let Some(ref hooks) = self.shared.hooks {
                            hooks.on_record_pruned(&record.id);
                        }
                    }
                    Err(err) => {
                        if let Some(ref hooks) = self.shared.hooks {
                            hooks.on_unhandled_error(
                                err.as_ref(),
                                &ErrorContext {
                                    operation: "pruneStaleRecords".to_string(),
                                    task_id: Some(record.id.clone()),
                                },
                            );
                        }
                    }
                }
            }
        }

        state.scheduled = cache;
        state.initialized = true;
        Ok(())
    }

    /// Always succeeds. Local state only: jobs already handed to the
    /// platform keep their schedule.
    pub async fn reset(&self) {
        {
            let mut state = self.shared.state.lock().await;
            state.registry.clear();
            state.scheduled.clear();
            state.events.close();
            state.initialized = false;
        }
        self.shared.scheduler.set_execution_sink(None).await;
    }

    // ─── Scheduling ──────────────────────────────────────────────────────

    /// Submits to the platform first, then persists the record. A store
    /// failure after submission leaves the platform job in place; the
    /// record surfaces again through an out-of-band
    /// `SchedulerPort::get_scheduled_tasks` re-query.
    pub async fn schedule_task(
        &self,
        options: TaskOptions,
    ) -> Result<ScheduledTask, CoordinatorError> {
        let mut state = self.shared.state.lock().await;
        if !state.initialized {
            return Err(CoordinatorError::NotInitialized);
        }
        if !state.registry.contains(&options.id) {
            return Err(CoordinatorError::TaskNotRegistered(options.id));
        }
        validate(&options)?;

        self.shared
            .scheduler
            .schedule_task(&options)
            .await
            .map_err(|err| CoordinatorError::scheduler("scheduleTask", err))?;

        let record = ScheduledTask {
            id: options.id.clone(),
            options,
            is_active: true,
            last_executed: None,
            execution_count: 0,
            failure_count: 0,
            scheduled_at: now_millis(),
        };

        self.shared
            .store
            .save(&record)
            .await
            .map_err(|err| CoordinatorError::store("save", err))?;

        match state.scheduled.iter_mut().find(|t| t.id == record.id) {
            Some(slot) => *slot = record.clone(),
            None => state.scheduled.push(record.clone()),
        }

        Ok(record)
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<(), CoordinatorError> {
        let mut state = self.shared.state.lock().await;
        if !state.initialized {
            return Err(CoordinatorError::NotInitialized);
        }

        self.shared
            .scheduler
            .cancel_task(task_id)
            .await
            .map_err(|err| CoordinatorError::scheduler("cancelTask", err))?;

        self.shared
            .store
            .mark_inactive(task_id)
            .await
            .map_err(|err| CoordinatorError::store("markInactive", err))?;

        state.scheduled.retain(|t| t.id != task_id);
        Ok(())
    }

    pub async fn cancel_all_tasks(&self) -> Result<(), CoordinatorError> {
        let mut state = self.shared.state.lock().await;
        if !state.initialized {
            return Err(CoordinatorError::NotInitialized);
        }

        self.shared
            .scheduler
            .cancel_all_tasks()
            .await
            .map_err(|err| CoordinatorError::scheduler("cancelAllTasks", err))?;

        self.shared
            .store
            .clear_all()
            .await
            .map_err(|err| CoordinatorError::store("clearAll", err))?;

        state.scheduled.clear();
        Ok(())
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// Snapshot of the local cache in insertion order; never re-queries the
    /// platform.
    pub async fn scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, CoordinatorError> {
        let state = self.shared.state.lock().await;
        if !state.initialized {
            return Err(CoordinatorError::NotInitialized);
        }
        Ok(state.scheduled.clone())
    }

    pub async fn is_task_scheduled(&self, task_id: &str) -> Result<bool, CoordinatorError> {
        let state = self.shared.state.lock().await;
        if !state.initialized {
            return Err(CoordinatorError::NotInitialized);
        }
        Ok(state.scheduled.iter().any(|t| t.id == task_id && t.is_active))
    }

    // ─── Immediate execution ─────────────────────────────────────────────

    pub async fn execute_task_now(&self, task_id: &str) -> Result<(), CoordinatorError> {
        {
            let state = self.shared.state.lock().await;
            if !state.initialized {
                return Err(CoordinatorError::NotInitialized);
            }
            if !state.registry.contains(task_id) {
                return Err(CoordinatorError::TaskNotRegistered(task_id.to_string()));
            }
        }

        // Lock released: the port dispatches back into the router, which
        // takes the same lock for its bookkeeping.
        self.shared
            .scheduler
            .execute_task_now(task_id)
            .await
            .map_err(|err| CoordinatorError::scheduler("executeTaskNow", err))
    }

    // ─── Execution results ───────────────────────────────────────────────

    pub async fn task_results(&self) -> Result<HashMap<String, String>, CoordinatorError> {
        self.ensure_initialized().await?;
        self.shared
            .scheduler
            .task_results()
            .await
            .map_err(|err| CoordinatorError::scheduler("getTaskResults", err))
    }

    pub async fn task_result(&self, task_id: &str) -> Result<Option<String>, CoordinatorError> {
        self.ensure_initialized().await?;
        self.shared
            .scheduler
            .task_result(task_id)
            .await
            .map_err(|err| CoordinatorError::scheduler("getTaskResult", err))
    }

    pub async fn clear_task_results(&self) -> Result<(), CoordinatorError> {
        self.ensure_initialized().await?;
        self.shared
            .scheduler
            .clear_task_results()
            .await
            .map_err(|err| CoordinatorError::scheduler("clearTaskResults", err))
    }

    pub async fn ping(&self) -> Result<(), CoordinatorError> {
        self.ensure_initialized().await?;
        self.shared
            .scheduler
            .ping()
            .await
            .map_err(|err| CoordinatorError::scheduler("ping", err))
    }

    // ─── Events ──────────────────────────────────────────────────────────

    /// Receiver of successfully executed task ids. Dropping it
    /// unsubscribes; `reset` ends all receivers.
    pub async fn subscribe_executions(
        &self,
    ) -> Result<broadcast::Receiver<String>, CoordinatorError> {
        let mut state = self.shared.state.lock().await;
        if !state.initialized {
            return Err(CoordinatorError::NotInitialized);
        }
        Ok(state.events.subscribe())
    }

    // ─── Private ─────────────────────────────────────────────────────────

    async fn ensure_initialized(&self) -> Result<(), CoordinatorError> {
        let state = self.shared.state.lock().await;
        if state.initialized {
            Ok(())
        } else {
            Err(CoordinatorError::NotInitialized)
        }
    }
}

/// Returns `true` if the inactive record is strictly older than
/// `max_age_ms` at time `now` (ms). Age is measured from the last
/// execution, falling back to the time the task was scheduled. Active
/// records never match.
fn is_stale(task: &ScheduledTask, max_age_ms: u64, now: u64) -> bool {
    if task.is_active {
        return false;
    }
    let basis = task.last_executed.unwrap_or(task.scheduled_at);
    now.saturating_sub(basis) > max_age_ms
}

// ─── Tests ──────────────────────────────────────────────────────────────────
