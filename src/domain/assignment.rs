//! Assignment domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reasoning::ReasoningLevel;

/// Optional per-dispatch worker configuration hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub model: Option<String>,
    pub reasoning_level: Option<ReasoningLevel>,
    pub preset: Option<String>,
}

/// A live binding of a task to an agent. Created on dispatch, removed on
/// completion; a busy agent has exactly one open assignment pointing
/// back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: String,
    pub agent_id: String,
    pub assigned_at: DateTime<Utc>,
    pub estimated_duration_secs: u64,
    pub worker_config: Option<WorkerConfig>,
}
