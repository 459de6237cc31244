//! Readiness verdict domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of readiness blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
    Dependency,
    MissingFile,
    Backoff,
    RecentFailure,
    VerificationUnready,
}

/// A single reason a task cannot be dispatched right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocker {
    pub kind: BlockerKind,
    pub description: String,
    pub blocked_until: Option<DateTime<Utc>>,
    pub blocked_by: Option<String>,
}

impl Blocker {
    pub fn new(kind: BlockerKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            blocked_until: None,
            blocked_by: None,
        }
    }

    pub fn with_blocked_until(mut self, at: DateTime<Utc>) -> Self {
        self.blocked_until = Some(at);
        self
    }

    pub fn with_blocked_by(mut self, id: impl Into<String>) -> Self {
        self.blocked_by = Some(id.into());
        self
    }
}

/// The Readiness Gate's verdict for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessVerdict {
    pub ready: bool,
    pub score: u8,
    pub blockers: Vec<Blocker>,
    pub next_check_time: Option<DateTime<Utc>>,
}

impl ReadinessVerdict {
    pub fn ready() -> Self {
        Self {
            ready: true,
            score: 100,
            blockers: Vec::new(),
            next_check_time: None,
        }
    }
}
