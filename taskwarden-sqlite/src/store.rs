use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use taskwarden_core::types::{ScheduledTask, TaskOptions, TaskStore};

fn table_name(prefix: &str) -> String {
    format!("{prefix}_scheduled_tasks")
}

/// SQLite-backed persistent store for scheduled task records.
///
/// Uses `sqlx::SqlitePool` and implements the `TaskStore` trait from
/// `taskwarden-core`. A single file outlives the process, which is the whole
/// point: records written here are what `initialize` restores after a
/// restart.
pub struct SqliteTaskStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteTaskStore {
    /// Create a new store with the given connection pool and optional table prefix.
    ///
    /// If `prefix` is `None`, falls back to the `TASKWARDEN_SQLITE_PREFIX`
    /// env var, then to `"taskwarden"`.
    pub fn new(pool: SqlitePool, prefix: Option<&str>) -> Self {
        let resolved = prefix
            .map(|s| s.to_string())
            .or_else(|| std::env::var("TASKWARDEN_SQLITE_PREFIX").ok())
            .unwrap_or_else(|| "taskwarden".to_string());
        Self {
            pool,
            table: table_name(&resolved),
        }
    }

    /// Run the initial migration to create the table and its index.
    pub async fn migrate(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let table = &self.table;

        let migration = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
              task_id TEXT PRIMARY KEY,
              options TEXT NOT NULL,
              is_active INTEGER NOT NULL,
              last_executed BIGINT,
              execution_count INTEGER NOT NULL,
              failure_count INTEGER NOT NULL,
              scheduled_at BIGINT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS {table}_scheduled_at_idx
              ON {table}(scheduled_at, task_id);
            "#
        );

        sqlx::query(&migration).execute(&self.pool).await?;
        Ok(())
    }

    /// Convert a database row into a `ScheduledTask`.
    fn row_to_task(row: &SqliteRow) -> Result<ScheduledTask, serde_json::Error> {
        let options_json: String = row.get("options");
        let options: TaskOptions = serde_json::from_str(&options_json)?;

        let last_executed: Option<i64> = row.get("last_executed");
        let execution_count: i64 = row.get("execution_count");
        let failure_count: i64 = row.get("failure_count");
        let scheduled_at: i64 = row.get("scheduled_at");

        Ok(ScheduledTask {
            id: row.get("task_id"),
            options,
            is_active: row.get("is_active"),
            last_executed: last_executed.map(|v| v as u64),
            execution_count: execution_count as u32,
            failure_count: failure_count as u32,
            scheduled_at: scheduled_at as u64,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn save(
        &self,
        task: &ScheduledTask,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let table = &self.table;

        let options_json = serde_json::to_string(&task.options)?;
        let last_executed = task.last_executed.map(|v| v as i64);
        let execution_count = task.execution_count as i64;
        let failure_count = task.failure_count as i64;
        let scheduled_at = task.scheduled_at as i64;

        let sql = format!(
            r#"
            INSERT INTO {table} (
                task_id, options, is_active, last_executed,
                execution_count, failure_count, scheduled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(task_id) DO UPDATE SET
                options = excluded.options,
                is_active = excluded.is_active,
                last_executed = excluded.last_executed,
                execution_count = excluded.execution_count,
                failure_count = excluded.failure_count,
                scheduled_at = excluded.scheduled_at
            "#
        );

        sqlx::query(&sql)
            .bind(&task.id)
            .bind(&options_json)
            .bind(task.is_active)
            .bind(last_executed)
            .bind(execution_count)
            .bind(failure_count)
            .bind(scheduled_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load(
        &self,
        task_id: &str,
    ) -> Result<Option<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>> {
        let table = &self.table;
        let sql = format!("SELECT * FROM {table} WHERE task_id = ?1");

        let row = sqlx::query(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    async fn load_all(
        &self,
    ) -> Result<Vec<ScheduledTask>, Box<dyn std::error::Error + Send + Sync>> {
        let table = &self.table;
        let sql = format!("SELECT * FROM {table} ORDER BY scheduled_at ASC, task_id ASC");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(Self::row_to_task(row)?);
        }
        Ok(tasks)
    }

    async fn remove(
        &self,
        task_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let table = &self.table;
        let sql = format!("DELETE FROM {table} WHERE task_id = ?1");

        sqlx::query(&sql).bind(task_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let table = &self.table;
        let sql = format!("DELETE FROM {table}");

        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}
