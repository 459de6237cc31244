//! Reasoning decision domain model.

use serde::{Deserialize, Serialize};

/// Reasoning depth the Dispatcher should ask a worker to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Where a reasoning decision came from, when it wasn't purely computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideSource {
    Metadata,
    Manual,
    Status,
}

/// One weighted signal that contributed to a reasoning score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub weight: f64,
}

impl Signal {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// The classifier's verdict for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningDecision {
    pub level: ReasoningLevel,
    pub score: f64,
    pub confidence: f64,
    pub signals: Vec<Signal>,
    pub override_source: Option<OverrideSource>,
}
