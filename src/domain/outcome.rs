//! Execution outcome domain model.

use serde::{Deserialize, Serialize};

/// Classification of a transient worker failure, derived from textual
/// patterns in the worker's combined stdout/stderr. The regex set behind
/// this classification is reproduced verbatim in [`crate::worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimit,
    ContextLimit,
    Other,
}

/// Token/cost usage scraped from worker output, when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
}

/// The result of one worker invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub raw_output: String,
    pub elapsed_secs: f64,
    pub failure_kind: Option<FailureKind>,
    pub retry_after_secs: Option<i64>,
    pub usage: Option<UsageStats>,
}

impl ExecutionOutcome {
    pub fn success(raw_output: impl Into<String>, elapsed_secs: f64) -> Self {
        Self {
            success: true,
            raw_output: raw_output.into(),
            elapsed_secs,
            failure_kind: None,
            retry_after_secs: None,
            usage: None,
        }
    }

    pub fn failure(
        raw_output: impl Into<String>,
        elapsed_secs: f64,
        failure_kind: FailureKind,
        retry_after_secs: Option<i64>,
    ) -> Self {
        Self {
            success: false,
            raw_output: raw_output.into(),
            elapsed_secs,
            failure_kind: Some(failure_kind),
            retry_after_secs,
            usage: None,
        }
    }
}
