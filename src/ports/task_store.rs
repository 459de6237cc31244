//! Task store port: the external roadmap/task persistence layer.
//!
//! Deliberately out of scope — this module only pins down the
//! minimum contract the dispatch engine needs, so the engine can be
//! exercised against an in-memory fake (see `crate::testutil`) without
//! pulling in the real YAML/markdown-backed store.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::{Task, TaskStatus};

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task store backend error: {0}")]
    Backend(String),
}

/// A fresh task specification for [`TaskStore::create_task`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub task_type: crate::domain::TaskType,
    pub complexity: u8,
    pub dependencies: Vec<String>,
    pub metadata: HashMap<String, Value>,
}

/// Optional filter for [`TaskStore::get_tasks`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

/// Minimum contract the dispatch engine needs from the persistent
/// task/roadmap store.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, TaskStoreError>;
    async fn get_task(&self, id: &str) -> Result<Task, TaskStoreError>;
    async fn get_dependencies(&self, id: &str) -> Result<Vec<Task>, TaskStoreError>;
    async fn transition(
        &self,
        id: &str,
        status: TaskStatus,
        metadata: Option<HashMap<String, Value>>,
        correlation: Option<String>,
        actor: &str,
    ) -> Result<(), TaskStoreError>;
    async fn create_task(&self, spec: NewTask) -> Result<Task, TaskStoreError>;
    async fn assign_task(
        &self,
        id: &str,
        agent_id: &str,
        correlation: Option<String>,
    ) -> Result<(), TaskStoreError>;
}
