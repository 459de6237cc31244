//! Fleet event model.
//!
//! Grounded in this crate's `services/event_bus.rs`: a typed event enum
//! carried over a broadcast channel with a monotonically increasing
//! sequence number, rather than stringly-typed event names. Each variant
//! below corresponds to one event this engine emits for observability
//! wiring, so external subscribers can match on the enum instead of
//! parsing strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonically increasing sequence number assigned by whichever
/// component publishes an event (mirrors this crate's `SequenceNumber`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

/// An event plus its publication metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sequence: SequenceNumber,
    pub emitted_at: DateTime<Utc>,
    pub event: FleetEvent,
}

impl Envelope {
    pub fn new(sequence: u64, event: FleetEvent) -> Self {
        Self { sequence: SequenceNumber(sequence), emitted_at: Utc::now(), event }
    }
}

/// Every event the dispatch/supervision engine emits,
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    /// `agent:fallback` — a fallback agent type served a task whose
    /// preferred type was unavailable.
    AgentFallback { task_id: String, preferred: String, used: String },
    /// `agent:error` — a worker invocation failed.
    AgentError { agent_id: String, task_id: String, message: String },
    /// `agent:cooldown` — an agent entered a cooldown window.
    AgentCooldown { agent_id: String, seconds: i64 },
    /// `agent:cooldown_cleared` — a cooldown lapsed and was cleared.
    AgentCooldownCleared { agent_id: String },
    /// `coordinator:promoted` — the candidate engineer took the architect
    /// role.
    CoordinatorPromoted { agent_id: String, reason: String },
    /// `coordinator:demoted` — the candidate engineer returned to its
    /// base role.
    CoordinatorDemoted { agent_id: String },
    /// `task:assigned` — a task was bound to an agent.
    TaskAssigned { task_id: String, agent_id: String },
    /// `task:completed` — a task's assignment resolved (success or
    /// failure).
    TaskCompleted { task_id: String, agent_id: String, success: bool },
    /// `process:started` — a worker child process was registered with the
    /// supervisor.
    ProcessStarted { pid: u32, task_id: String },
    /// `process:completed` — a worker child process exited normally.
    ProcessCompleted { pid: u32, elapsed_secs: f64 },
    /// `process:killed` — a worker child process was killed.
    ProcessKilled { pid: u32, reason: String },
    /// `zombies:killed` — the supervisor's periodic sweep killed one or
    /// more timed-out processes.
    ZombiesKilled { count: usize },
    /// `monitoring-started` — a monitor (escalation or rollback) began its
    /// loop.
    MonitoringStarted { monitor: String },
    /// `monitoring-stopped` — a monitor finished its in-flight scan and
    /// stopped.
    MonitoringStopped { monitor: String },
    /// `health-check` — a rollback-monitor health sample was recorded.
    HealthCheck { error_rate: f64, failures: u32 },
    /// `rollback-executed` — the rollback monitor restored the previous
    /// active worker.
    RollbackExecuted { reason: String },
    /// `rollback-failed` — a rollback attempt itself failed.
    RollbackFailed { reason: String },
    /// `escalation-triggered` — the rollback monitor escalated instead of
    /// rolling back.
    EscalationTriggered { reason: String },
    /// `kill-switch-activated` — the `DISABLE_NEW` live flag was set.
    KillSwitchActivated { reason: String },
    /// `kill-switch-reset` — the `DISABLE_NEW` live flag was cleared.
    KillSwitchReset,
}
