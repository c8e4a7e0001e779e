use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::types::{
    now_millis, ExecutionRequest, ExecutionSink, ScheduledTask, SchedulerPort, TaskOptions,
    TaskStore,
};

// ─── MemoryTaskStore ────────────────────────────────────────────────────────

pub struct MemoryTaskStore {
    records: RwLock<HashMap<String, ScheduledTask>>,
    order: RwLock<Vec<String>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(
        &self,
        task: &ScheduledTask,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut records = self.records.write().unwrap();
        let mut order = self.order.write().unwrap();
        if !records.contains_key(&task.id) {
            order.push(task.id.clone());
        }
        records.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn load(
        &self,
        task_id: &str,
    ) -> Result<Option<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>> {
        let records = self.records.read().unwrap();
        Ok(records.get(task_id).cloned())
    }

    async fn load_all(
        &self,
    ) -> Result<Vec<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>> {
        let records = self.records.read().unwrap();
        let order = self.order.read().unwrap();
        Ok(order.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn remove(
        &self,
        task_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut records = self.records.write().unwrap();
        let mut order = self.order.write().unwrap();
        records.remove(task_id);
        order.retain(|id| id != task_id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut records = self.records.write().unwrap();
        let mut order = self.order.write().unwrap();
        records.clear();
        order.clear();
        Ok(())
    }
}

// ─── MemorySchedulerPort ────────────────────────────────────────────────────

/// A single-process scheduler port. Jobs never fire on their own; tests and
/// dev tooling drive them through `execute_task_now`.
pub struct MemorySchedulerPort {
    jobs: RwLock<HashMap<String, ScheduledTask>>,
    results: RwLock<HashMap<String, String>>,
    sink: RwLock<Option<Arc<dyn ExecutionSink>>>,
    initialize_calls: AtomicU64,
}

impl MemorySchedulerPort {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            sink: RwLock::new(None),
            initialize_calls: AtomicU64::new(0),
        }
    }

    /// Number of times `initialize` has been called on this port.
    pub fn initialize_calls(&self) -> u64 {
        self.initialize_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemorySchedulerPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerPort for MemorySchedulerPort {
    async fn initialize(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn schedule_task(
        &self,
        options: &TaskOptions,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let record = ScheduledTask {
            id: options.id.clone(),
            options: options.clone(),
            is_active: true,
            last_executed: None,
            execution_count: 0,
            failure_count: 0,
            scheduled_at: now_millis(),
        };
        let mut jobs = self.jobs.write().unwrap();
        jobs.insert(record.id.clone(), record);
        Ok(())
    }

    async fn cancel_task(
        &self,
        task_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut jobs = self.jobs.write().unwrap();
        jobs.remove(task_id);
        Ok(())
    }

    async fn cancel_all_tasks(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut jobs = self.jobs.write().unwrap();
        jobs.clear();
        Ok(())
    }

    async fn get_scheduled_tasks(
        &self,
    ) -> Result<Vec<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.values().cloned().collect())
    }

    async fn is_task_scheduled(
        &self,
        task_id: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.contains_key(task_id))
    }

    async fn execute_task_now(
        &self,
        task_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = {
            let jobs = self.jobs.read().unwrap();
            match jobs.get(task_id) {
                Some(job) => job.options.data.clone(),
                None => return Err(format!("no scheduled task with id '{task_id}'").into()),
            }
        };
        let sink = {
            let sink = self.sink.read().unwrap();
            sink.clone()
        };
        let sink = match sink {
            Some(sink) => sink,
            None => return Err("no execution sink installed".into()),
        };

        let outcome = sink
            .dispatch(ExecutionRequest {
                task_id: task_id.to_string(),
                data,
            })
            .await;

        let result = match &outcome {
            Ok(()) => "success".to_string(),
            Err(err) => err.to_string(),
        };
        let mut results = self.results.write().unwrap();
        results.insert(task_id.to_string(), result);

        // The ack is for the submission; the handler outcome only lands in
        // the result map.
        Ok(())
    }

    async fn task_results(
        &self,
    ) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
        let results = self.results.read().unwrap();
        Ok(results.clone())
    }

    async fn task_result(
        &self,
        task_id: &str,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let results = self.results.read().unwrap();
        Ok(results.get(task_id).cloned())
    }

    async fn clear_task_results(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut results = self.results.write().unwrap();
        results.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    async fn set_execution_sink(&self, sink: Option<Arc<dyn ExecutionSink>>) {
        let mut slot = self.sink.write().unwrap();
        *slot = sink;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
