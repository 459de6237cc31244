//! Agent domain model.
//!
//! Grounded in this crate's `domain/models/agent.rs` (tiered agent
//! templates with status enums and builder-style constructors), reshaped
//! around a fixed roster: one architect coordinator plus N engineers,
//! with coordinator promotion/demotion and cooldown bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of worker an agent slot was provisioned as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Architect,
    Engineer,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Engineer => "engineer",
        }
    }

    pub fn alternate(&self) -> Self {
        match self {
            Self::Architect => Self::Engineer,
            Self::Engineer => Self::Architect,
        }
    }
}

/// The role currently assigned to an agent. Distinct from [`AgentType`]:
/// an engineer can be promoted to carry the `architect` role while its
/// `agent_type` (and thus its worker-invocation command) stays `engineer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Architect,
    Engineer,
    Qa,
    Reviewer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Engineer => "engineer",
            Self::Qa => "qa",
            Self::Reviewer => "reviewer",
        }
    }
}

/// Current availability of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Failed,
}

/// A roster slot in the Agent Pool.
///
/// Created once at pool init (one architect, N engineers) and mutated only
/// by the Agent Pool for the lifetime of the process; agents are never
/// destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub agent_type: AgentType,
    pub role: AgentRole,
    pub base_role: AgentRole,
    pub status: AgentStatus,
    pub current_task_id: Option<String>,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Running mean of completion duration, in seconds.
    pub avg_duration_secs: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub promoted_at: Option<DateTime<Utc>>,
    /// Insertion order, used as the tie-break in load-balanced routing.
    pub insertion_order: u32,
}

impl Agent {
    pub fn new(id: impl Into<String>, agent_type: AgentType, role: AgentRole, insertion_order: u32) -> Self {
        Self {
            id: id.into(),
            agent_type,
            role,
            base_role: role,
            status: AgentStatus::Idle,
            current_task_id: None,
            completed_tasks: 0,
            failed_tasks: 0,
            avg_duration_secs: 0.0,
            last_used_at: None,
            cooldown_until: None,
            promoted_at: None,
            insertion_order,
        }
    }

    /// Self-healing cooldown predicate: observing a lapsed
    /// cooldown clears it and reverts status to idle. Returns whether the
    /// agent is *currently* on cooldown, after applying that self-heal.
    pub fn is_on_cooldown(&mut self, now: DateTime<Utc>) -> bool {
        if let Some(until) = self.cooldown_until {
            if until <= now {
                self.clear_cooldown();
                return false;
            }
            return true;
        }
        false
    }

    pub fn clear_cooldown(&mut self) {
        if self.cooldown_until.is_some() {
            self.cooldown_until = None;
            if self.status == AgentStatus::Failed {
                self.status = AgentStatus::Idle;
            }
        }
    }

    pub fn set_cooldown(&mut self, now: DateTime<Utc>, seconds: i64) {
        self.status = AgentStatus::Failed;
        self.cooldown_until = Some(now + chrono::Duration::milliseconds(seconds * 1000));
        self.current_task_id = None;
    }

    pub fn is_idle(&mut self, now: DateTime<Utc>) -> bool {
        !self.is_on_cooldown(now) && self.status == AgentStatus::Idle
    }

    pub fn record_completion(&mut self, success: bool, duration_secs: f64) {
        if success {
            let n = self.completed_tasks as f64;
            self.avg_duration_secs = if n == 0.0 {
                duration_secs
            } else {
                (self.avg_duration_secs * n + duration_secs) / (n + 1.0)
            };
            self.completed_tasks += 1;
            self.status = AgentStatus::Idle;
        } else {
            self.failed_tasks += 1;
        }
        self.current_task_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_self_heals_once_expired() {
        let mut agent = Agent::new("a1", AgentType::Engineer, AgentRole::Engineer, 0);
        let now = Utc::now();
        agent.set_cooldown(now, 5);
        assert!(agent.is_on_cooldown(now));
        assert!(agent.is_on_cooldown(now + chrono::Duration::seconds(4)));
        assert!(!agent.is_on_cooldown(now + chrono::Duration::seconds(6)));
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.cooldown_until.is_none());
    }

    #[test]
    fn running_average_blends_durations() {
        let mut agent = Agent::new("a1", AgentType::Engineer, AgentRole::Engineer, 0);
        agent.record_completion(true, 10.0);
        agent.record_completion(true, 20.0);
        assert_eq!(agent.avg_duration_secs, 15.0);
        assert_eq!(agent.completed_tasks, 2);
    }
}
