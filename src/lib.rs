//! Dispatch and supervision engine for a heterogeneous AI worker fleet.
//!
//! Wires one architect and N engineer workers against a task store that
//! lives outside this crate: a [`dispatcher::Dispatcher`]
//! pulls ready tasks, an [`pool::AgentPool`] assigns and runs them under
//! a [`supervisor::ResourceSupervisor`] spawn ceiling, a [`verifier::Verifier`]
//! gates completions, and a [`ledger::PhaseLedger`] records every phase
//! transition in a tamper-evident hash chain. The [`escalation::EscalationMonitor`]
//! and [`rollback::RollbackMonitor`] run alongside as independent
//! background sweeps.

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod escalation;
pub mod ledger;
pub mod logging;
pub mod pool;
pub mod ports;
pub mod readiness;
pub mod rollback;
pub mod supervisor;
pub mod verifier;
pub mod worker;

pub mod testutil;
