//! Task domain model.
//!
//! Tasks are owned by the external roadmap/task store (see
//! [`crate::ports::task_store`]); this module only defines the shape the
//! dispatch engine observes and mutates through that store's interface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Coarse task granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Epic,
    Story,
    Task,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Task => "task",
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    NeedsReview,
    NeedsImprovement,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::NeedsReview => "needs_review",
            Self::NeedsImprovement => "needs_improvement",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// A task as observed from the external task store.
///
/// The dispatch engine never owns this type's storage; it reads it via
/// [`crate::ports::task_store::TaskStore`] and writes transitions back
/// through the same port. `metadata` carries a free-form bag of extras
/// (reasoning overrides, required files, retry bookkeeping).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Estimated complexity, 1-10.
    pub complexity: u8,
    pub dependencies: Vec<String>,
    pub metadata: HashMap<String, Value>,
    pub exit_criteria: Vec<String>,
    pub required_files: Vec<String>,
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub failure_count: u32,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            task_type,
            status: TaskStatus::Pending,
            complexity: 3,
            dependencies: Vec::new(),
            metadata: HashMap::new(),
            exit_criteria: Vec::new(),
            required_files: Vec::new(),
            last_attempt_time: None,
            last_error: None,
            failure_count: 0,
        }
    }

    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity.clamp(1, 10);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Combined text the classifier and routing heuristics scan for
    /// keywords: title + description, lowercased.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.description).to_lowercase()
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn metadata_bool(&self, key: &str) -> Option<bool> {
        self.metadata.get(key).and_then(Value::as_bool)
    }

    /// Whether this task is tagged as a verification/validation task.
    pub fn is_verification_task(&self) -> bool {
        let text = self.searchable_text();
        text.contains("verify")
            || text.contains("validation")
            || self.metadata_str("type") == Some("verification")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_complexity_into_range() {
        let task = Task::new("t1", "Title", TaskType::Task).with_complexity(99);
        assert_eq!(task.complexity, 10);
        let task = Task::new("t1", "Title", TaskType::Task).with_complexity(0);
        assert_eq!(task.complexity, 1);
    }

    #[test]
    fn detects_verification_tasks_by_title_or_metadata() {
        let task = Task::new("t1", "Verify the output", TaskType::Task);
        assert!(task.is_verification_task());

        let mut task = Task::new("t2", "Something else", TaskType::Task);
        task.metadata
            .insert("type".into(), Value::String("verification".into()));
        assert!(task.is_verification_task());

        let task = Task::new("t3", "Write docs", TaskType::Task);
        assert!(!task.is_verification_task());
    }
}
