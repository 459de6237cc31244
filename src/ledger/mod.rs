//! Phase Ledger: an append-only, hash-chained JSONL
//! audit log of task phase transitions.
//!
//! Grounded in `other_examples`'s `compute_sha256` helper
//! (`Sha256::new() -> update -> finalize -> format!("{:x}", ..)`) for the
//! hashing step, and in this crate's single-writer-per-component shape,
//! via a `tokio::sync::Mutex` guarding the in-memory chain tip.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{LedgerEntry, GENESIS_HASH};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger entry is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Optional extra fields for [`PhaseLedger::append_transition`].
#[derive(Debug, Clone, Default)]
pub struct AppendMeta {
    pub agent_type: Option<String>,
    pub duration_ms: Option<u64>,
    pub persona_hash: Option<String>,
}

/// Result of [`PhaseLedger::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    pub valid: bool,
    pub broken_chain_at: Option<usize>,
    pub tampered_entries: Vec<usize>,
}

struct ChainTip {
    last_entry_hash: String,
    count: u64,
}

/// Single-writer append-only ledger backed by a JSONL file.
pub struct PhaseLedger {
    path: PathBuf,
    tip: Mutex<ChainTip>,
}

impl PhaseLedger {
    /// Open (creating if absent) the ledger file at `path`, recovering
    /// the chain tip from whatever entries already exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let entries = Self::read_all(&path).await?;
        let tip = match entries.last() {
            Some(last) => ChainTip { last_entry_hash: last.entry_hash.clone(), count: entries.len() as u64 },
            None => ChainTip { last_entry_hash: GENESIS_HASH.to_string(), count: 0 },
        };
        Ok(Self { path, tip: Mutex::new(tip) })
    }

    /// Record one phase transition.
    pub async fn append_transition(
        &self,
        task_id: impl Into<String>,
        from_phase: Option<String>,
        to_phase: impl Into<String>,
        evidence_artifacts: Vec<String>,
        evidence_validated: bool,
        meta: Option<AppendMeta>,
    ) -> Result<LedgerEntry, LedgerError> {
        let meta = meta.unwrap_or_default();
        let mut tip = self.tip.lock().await;

        let mut entry = LedgerEntry {
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            previous_hash: tip.last_entry_hash.clone(),
            entry_hash: String::new(),
            task_id: task_id.into(),
            from_phase,
            to_phase: to_phase.into(),
            evidence_artifacts,
            evidence_validated,
            agent_type: meta.agent_type,
            duration_ms: meta.duration_ms,
            persona_hash: meta.persona_hash,
        };
        entry.entry_hash = hash_canonical(&entry.canonical_json());

        append_line(&self.path, &entry).await?;
        tip.last_entry_hash = entry.entry_hash.clone();
        tip.count += 1;

        Ok(entry)
    }

    /// Walk the full chain checking link integrity and per-entry hash
    /// recomputation.
    pub async fn verify(&self) -> Result<VerificationResult, LedgerError> {
        let entries = Self::read_all(&self.path).await?;
        let mut broken_chain_at = None;
        let mut tampered_entries = Vec::new();
        let mut expected_previous = GENESIS_HASH.to_string();

        for (i, entry) in entries.iter().enumerate() {
            if entry.previous_hash != expected_previous && broken_chain_at.is_none() {
                broken_chain_at = Some(i);
            }
            let recomputed = hash_canonical(&entry.canonical_json());
            if recomputed != entry.entry_hash {
                tampered_entries.push(i);
            }
            expected_previous = entry.entry_hash.clone();
        }

        Ok(VerificationResult {
            valid: broken_chain_at.is_none() && tampered_entries.is_empty(),
            broken_chain_at,
            tampered_entries,
        })
    }

    pub async fn get_task_history(&self, task_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = Self::read_all(&self.path).await?;
        Ok(entries.into_iter().filter(|e| e.task_id == task_id).collect())
    }

    pub async fn get_current_phase(&self, task_id: &str) -> Result<Option<String>, LedgerError> {
        let history = self.get_task_history(task_id).await?;
        Ok(history.last().map(|e| e.to_phase.clone()))
    }

    async fn read_all(path: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut entries = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

fn hash_canonical(canonical_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn append_line(path: &Path, entry: &LedgerEntry) -> Result<(), LedgerError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger_at(name: &str) -> (PhaseLedger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let ledger = PhaseLedger::open(path).await.unwrap();
        (ledger, dir)
    }

    #[tokio::test]
    async fn genesis_entry_chains_from_literal_genesis_hash() {
        let (ledger, _dir) = ledger_at("ledger.jsonl").await;
        let entry = ledger
            .append_transition("t1", None, "in_progress", vec![], false, None)
            .await
            .unwrap();
        assert_eq!(entry.previous_hash, GENESIS_HASH);
    }

    #[tokio::test]
    async fn chain_of_n_transitions_verifies_valid() {
        let (ledger, _dir) = ledger_at("ledger.jsonl").await;
        for i in 0..5 {
            ledger
                .append_transition("t1", Some(format!("phase-{i}")), format!("phase-{}", i + 1), vec![], true, None)
                .await
                .unwrap();
        }
        let result = ledger.verify().await.unwrap();
        assert!(result.valid);
        assert!(result.broken_chain_at.is_none());
        assert!(result.tampered_entries.is_empty());
    }

    #[tokio::test]
    async fn tampering_a_field_is_detected_at_the_right_index() {
        let (ledger, dir) = ledger_at("ledger.jsonl").await;
        for i in 0..3 {
            ledger
                .append_transition("t1", Some(format!("phase-{i}")), format!("phase-{}", i + 1), vec![], true, None)
                .await
                .unwrap();
        }

        let path = dir.path().join("ledger.jsonl");
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
        let mut tampered: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        tampered["to_phase"] = serde_json::Value::String("tampered".to_string());
        lines[1] = tampered.to_string();
        tokio::fs::write(&path, lines.join("\n") + "\n").await.unwrap();

        let result = ledger.verify().await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.tampered_entries, vec![1]);
        assert!(result.broken_chain_at.is_none());
    }

    #[tokio::test]
    async fn task_history_and_current_phase_filter_by_task_id() {
        let (ledger, _dir) = ledger_at("ledger.jsonl").await;
        ledger.append_transition("t1", None, "in_progress", vec![], false, None).await.unwrap();
        ledger.append_transition("t2", None, "in_progress", vec![], false, None).await.unwrap();
        ledger.append_transition("t1", Some("in_progress".into()), "done", vec![], true, None).await.unwrap();

        let history = ledger.get_task_history("t1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(ledger.get_current_phase("t1").await.unwrap(), Some("done".to_string()));
        assert_eq!(ledger.get_current_phase("t3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_ledger_verifies_as_valid() {
        let (ledger, _dir) = ledger_at("ledger.jsonl").await;
        let result = ledger.verify().await.unwrap();
        assert!(result.valid);
    }
}
