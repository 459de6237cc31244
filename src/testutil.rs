//! Shared in-memory [`TaskStore`] fake used by the unit tests across
//! `readiness`, `dispatcher`, and `escalation`, and by `main` as the
//! default store when no external roadmap backend is configured.
//!
//! The real task/roadmap store is an external collaborator;
//! this is not it, just the minimum in-memory stand-in the engine needs
//! to be exercised end to end.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Task, TaskStatus};
use crate::ports::{NewTask, TaskFilter, TaskStore, TaskStoreError};

pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new(tasks: Vec<Task>) -> Arc<Self> {
        Arc::new(Self { tasks: RwLock::new(tasks.into_iter().map(|t| (t.id.clone(), t)).collect()) })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub async fn snapshot(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, TaskStoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().filter(|t| filter.status.is_none_or(|s| t.status == s)).cloned().collect())
    }

    async fn get_task(&self, id: &str) -> Result<Task, TaskStoreError> {
        self.tasks.read().await.get(id).cloned().ok_or_else(|| TaskStoreError::NotFound(id.to_string()))
    }

    async fn get_dependencies(&self, id: &str) -> Result<Vec<Task>, TaskStoreError> {
        let task = self.get_task(id).await?;
        let mut deps = Vec::with_capacity(task.dependencies.len());
        for dep_id in &task.dependencies {
            deps.push(self.get_task(dep_id).await?);
        }
        Ok(deps)
    }

    async fn transition(
        &self,
        id: &str,
        status: TaskStatus,
        metadata: Option<HashMap<String, Value>>,
        correlation: Option<String>,
        actor: &str,
    ) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id).ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        task.status = status;
        if let Some(metadata) = metadata {
            task.metadata.extend(metadata);
        }
        if let Some(correlation) = correlation {
            task.metadata.insert("correlation_id".to_string(), Value::String(correlation));
        }
        task.metadata.insert("last_actor".to_string(), Value::String(actor.to_string()));
        Ok(())
    }

    async fn create_task(&self, spec: NewTask) -> Result<Task, TaskStoreError> {
        let mut task = Task::new(spec.id.clone(), spec.title, spec.task_type)
            .with_complexity(spec.complexity)
            .with_dependencies(spec.dependencies);
        task.metadata.extend(spec.metadata);
        self.tasks.write().await.insert(spec.id, task.clone());
        Ok(task)
    }

    async fn assign_task(&self, id: &str, agent_id: &str, correlation: Option<String>) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id).ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        task.metadata.insert("assigned_agent".to_string(), Value::String(agent_id.to_string()));
        if let Some(correlation) = correlation {
            task.metadata.insert("correlation_id".to_string(), Value::String(correlation));
        }
        Ok(())
    }
}
