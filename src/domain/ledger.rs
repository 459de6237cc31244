//! Phase Ledger entry domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Literal previous-hash value for the first entry in a ledger.
pub const GENESIS_HASH: &str = "genesis";

/// One append-only, hash-chained record of a task's phase transition.
///
/// Field order matters: [`LedgerEntry::canonical_json`] serialises a fixed
/// subset of these fields in a fixed key order, and that exact byte
/// sequence is what gets hashed. `persona_hash` is carried for
/// observability but deliberately excluded from the hash input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub entry_hash: String,
    pub task_id: String,
    pub from_phase: Option<String>,
    pub to_phase: String,
    pub evidence_artifacts: Vec<String>,
    pub evidence_validated: bool,
    pub agent_type: Option<String>,
    pub duration_ms: Option<u64>,
    pub persona_hash: Option<String>,
}

impl LedgerEntry {
    /// The exact key order prescribed for the hash input:
    /// `entry_id, timestamp, previous_hash, task_id, from_phase, to_phase,
    /// evidence_artifacts, evidence_validated, agent_type, duration_ms`.
    /// `entry_hash` and `persona_hash` are excluded.
    ///
    /// Built by hand rather than via `serde_json::json!` because a plain
    /// `serde_json::Map` (without the `preserve_order` feature) sorts
    /// keys alphabetically, which would silently break the fixed
    /// ordering this hash depends on.
    pub fn canonical_json(&self) -> String {
        format!(
            "{{\"entry_id\":{},\"timestamp\":{},\"previous_hash\":{},\"task_id\":{},\"from_phase\":{},\"to_phase\":{},\"evidence_artifacts\":{},\"evidence_validated\":{},\"agent_type\":{},\"duration_ms\":{}}}",
            serde_json::to_string(&self.entry_id).expect("uuid serializes"),
            serde_json::to_string(&self.timestamp).expect("timestamp serializes"),
            serde_json::to_string(&self.previous_hash).expect("string serializes"),
            serde_json::to_string(&self.task_id).expect("string serializes"),
            serde_json::to_string(&self.from_phase).expect("option serializes"),
            serde_json::to_string(&self.to_phase).expect("string serializes"),
            serde_json::to_string(&self.evidence_artifacts).expect("vec serializes"),
            serde_json::to_string(&self.evidence_validated).expect("bool serializes"),
            serde_json::to_string(&self.agent_type).expect("option serializes"),
            serde_json::to_string(&self.duration_ms).expect("option serializes"),
        )
    }
}
