//! Domain models: the data shapes every other module in this crate
//! operates on.
//!
//! These types carry no behavior beyond small invariant-preserving
//! helpers; the components in the crate root (`pool`, `supervisor`,
//! `dispatcher`, ...) own the actual state transitions.

pub mod agent;
pub mod assignment;
pub mod context;
pub mod events;
pub mod ledger;
pub mod outcome;
pub mod readiness;
pub mod reasoning;
pub mod task;

pub use agent::{Agent, AgentRole, AgentStatus, AgentType};
pub use assignment::{Assignment, WorkerConfig};
pub use context::DispatchContext;
pub use events::{Envelope, FleetEvent, SequenceNumber};
pub use ledger::{LedgerEntry, GENESIS_HASH};
pub use outcome::{ExecutionOutcome, FailureKind, UsageStats};
pub use readiness::{Blocker, BlockerKind, ReadinessVerdict};
pub use reasoning::{OverrideSource, ReasoningDecision, ReasoningLevel, Signal};
pub use task::{Task, TaskStatus, TaskType};
