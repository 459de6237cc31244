//! Reasoning Classifier: a pure function from task + context
//! to a [`ReasoningDecision`].
//!
//! Grounded in this crate's `services/overseers/traits.rs` style of
//! small pure scoring helpers composed into one verdict, and in
//! `services/priority_calculator.rs` for the weighted-accumulation
//! shape. The weight table itself is reproduced verbatim — these are
//! calibrated constants, not something to "clean up".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{DispatchContext, OverrideSource, ReasoningDecision, ReasoningLevel, Signal, Task, TaskStatus, TaskType};

const OVERRIDE_KEYS: &[&str] = &[
    "reasoning_level",
    "reasoningLevel",
    "reasoning",
    "reasoning_mode",
    "reasoningMode",
];
const FORCE_HIGH_KEYS: &[&str] = &["requires_reasoning", "needs_reasoning", "force_reasoning"];

static ARCHITECTURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)architect|strategy|strategic").unwrap());
static ANALYSIS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)analy[sz]e|investigat").unwrap());
static REFACTOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)refactor|rewrite").unwrap());
static DOCS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)documentation|docs?\b|readme").unwrap());
static TRIVIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btrivial\b|\bhygiene\b|typo|formatting").unwrap());

/// Classify a task's required reasoning depth. Purely
/// syntactic: no I/O, no randomness, same inputs always produce the
/// same [`ReasoningDecision`].
pub fn classify(task: &Task, context: &DispatchContext) -> ReasoningDecision {
    if let Some(decision) = override_decision(task) {
        return decision;
    }

    let mut signals: Vec<Signal> = Vec::new();
    let mut score = 0.0;

    score_complexity(task, &mut signals, &mut score);
    score_status(task, &mut signals, &mut score);
    score_type(task, &mut signals, &mut score);
    score_keywords(task, &mut signals, &mut score);
    score_context(context, &mut signals, &mut score);
    score_metadata_risk(task, &mut signals, &mut score);

    let level = if score >= 2.0 {
        ReasoningLevel::High
    } else if score >= 0.75 {
        ReasoningLevel::Medium
    } else if score >= -1.0 {
        ReasoningLevel::Low
    } else {
        ReasoningLevel::Minimal
    };

    let confidence = if signals.is_empty() {
        0.4
    } else {
        let total_abs_weight: f64 = signals.iter().map(|s| s.weight.abs()).sum();
        (0.35 + total_abs_weight * 0.08 + signals.len() as f64 * 0.03).clamp(0.35, 0.95)
    };

    ReasoningDecision {
        level,
        score,
        confidence,
        signals,
        override_source: None,
    }
}

fn override_decision(task: &Task) -> Option<ReasoningDecision> {
    for key in OVERRIDE_KEYS {
        if let Some(raw) = task.metadata_str(key) {
            if let Some(level) = ReasoningLevel::parse_str(raw) {
                return Some(ReasoningDecision {
                    level,
                    score: 0.0,
                    confidence: 0.95,
                    signals: vec![Signal::new(format!("override:{key}"), 0.0)],
                    override_source: Some(OverrideSource::Metadata),
                });
            }
        }
    }
    for key in FORCE_HIGH_KEYS {
        if task.metadata_bool(key) == Some(true) {
            return Some(ReasoningDecision {
                level: ReasoningLevel::High,
                score: 0.0,
                confidence: 0.95,
                signals: vec![Signal::new(format!("override:{key}"), 0.0)],
                override_source: Some(OverrideSource::Metadata),
            });
        }
    }
    None
}

fn push(signals: &mut Vec<Signal>, score: &mut f64, name: &str, weight: f64) {
    signals.push(Signal::new(name, weight));
    *score += weight;
}

fn score_complexity(task: &Task, signals: &mut Vec<Signal>, score: &mut f64) {
    match task.complexity {
        c if c >= 8 => push(signals, score, "complexity>=8", 1.6),
        7 => push(signals, score, "complexity=7", 1.0),
        c if c <= 2 => push(signals, score, "complexity<=2", -0.9),
        3 => push(signals, score, "complexity=3", -0.6),
        _ => {}
    }
}

fn score_status(task: &Task, signals: &mut Vec<Signal>, score: &mut f64) {
    match task.status {
        TaskStatus::NeedsReview => push(signals, score, "status:needs_review", 1.4),
        TaskStatus::NeedsImprovement => push(signals, score, "status:needs_improvement", 0.7),
        TaskStatus::Blocked => push(signals, score, "status:blocked", 0.4),
        _ => {}
    }
}

fn score_type(task: &Task, signals: &mut Vec<Signal>, score: &mut f64) {
    match task.task_type {
        TaskType::Epic => push(signals, score, "type:epic", 1.4),
        TaskType::Story => push(signals, score, "type:story", 0.2),
        TaskType::Task => {}
    }
}

fn score_keywords(task: &Task, signals: &mut Vec<Signal>, score: &mut f64) {
    let text = task.searchable_text();
    if ARCHITECTURE_RE.is_match(&text) {
        push(signals, score, "keyword:architecture", 1.2);
    } else if ANALYSIS_RE.is_match(&text) {
        push(signals, score, "keyword:analysis", 0.9);
    } else if REFACTOR_RE.is_match(&text) {
        push(signals, score, "keyword:refactor", 0.6);
    } else if DOCS_RE.is_match(&text) {
        push(signals, score, "keyword:documentation", -0.6);
    } else if TRIVIAL_RE.is_match(&text) {
        push(signals, score, "keyword:trivial", -0.7);
    }
}

fn score_context(context: &DispatchContext, signals: &mut Vec<Signal>, score: &mut f64) {
    match context.relevant_decisions {
        n if n >= 4 => push(signals, score, "decisions>=4", 0.9),
        2..=3 => push(signals, score, "decisions:2-3", 0.4),
        _ => {}
    }
    match context.relevant_constraints {
        n if n >= 4 => push(signals, score, "constraints>=4", 0.8),
        2..=3 => push(signals, score, "constraints:2-3", 0.4),
        _ => {}
    }
    match context.quality_issues_in_area {
        n if n >= 4 => push(signals, score, "quality_issues>=4", 0.8),
        1..=3 => push(signals, score, "quality_issues:1-3", 0.5),
        _ => {}
    }
    match context.files_in_context {
        n if n >= 6 => push(signals, score, "files>=6", 0.6),
        3..=5 => push(signals, score, "files:3-5", 0.3),
        _ => {}
    }
    match context.related_high_complexity_tasks {
        n if n >= 2 => push(signals, score, "related_complex>=2", 0.7),
        1 => push(signals, score, "related_complex=1", 0.3),
        _ => {}
    }
    if context.related_blocked_task {
        push(signals, score, "related_blocked_task", 0.4);
    }
    if let Some(phase) = &context.project_phase {
        let phase = phase.to_lowercase();
        if phase.contains("architecture") || phase.contains("discovery") {
            push(signals, score, "project_phase", 0.4);
        }
    }
    if context.quality_trend_declining {
        push(signals, score, "quality_trend_declining", 0.3);
    }
}

fn score_metadata_risk(task: &Task, signals: &mut Vec<Signal>, score: &mut f64) {
    if let Some(risk) = task.metadata_str("risk") {
        match risk.to_lowercase().as_str() {
            "high" | "critical" => push(signals, score, "risk:high", 0.8),
            "medium" => push(signals, score, "risk:medium", 0.4),
            "low" => push(signals, score, "risk:low", -0.3),
            _ => {}
        }
    }
    if task.metadata_bool("requires_research") == Some(true)
        || task.metadata_bool("deep_analysis") == Some(true)
    {
        push(signals, score, "metadata:requires_research", 0.6);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn override_metadata_short_circuits_scoring() {
        let mut task = Task::new("t1", "Anything", TaskType::Task);
        task.metadata.insert("reasoning_level".into(), json!("high"));
        let decision = classify(&task, &DispatchContext::default());
        assert_eq!(decision.level, ReasoningLevel::High);
        assert_eq!(decision.confidence, 0.95);
        assert_eq!(decision.override_source, Some(OverrideSource::Metadata));
    }

    #[test]
    fn force_reasoning_flag_returns_high() {
        let mut task = Task::new("t1", "Anything", TaskType::Task);
        task.metadata.insert("force_reasoning".into(), json!(true));
        let decision = classify(&task, &DispatchContext::default());
        assert_eq!(decision.level, ReasoningLevel::High);
    }

    #[test]
    fn high_complexity_epic_scores_high() {
        let task = Task::new("t1", "Design the new architecture", TaskType::Epic).with_complexity(9);
        let decision = classify(&task, &DispatchContext::default());
        assert_eq!(decision.level, ReasoningLevel::High);
    }

    #[test]
    fn trivial_low_complexity_scores_minimal() {
        let task = Task::new("t1", "Fix typo in README", TaskType::Task).with_complexity(1);
        let decision = classify(&task, &DispatchContext::default());
        assert_eq!(decision.level, ReasoningLevel::Minimal);
    }

    #[test]
    fn no_signals_has_default_confidence() {
        let task = Task::new("t1", "Do the thing", TaskType::Task).with_complexity(5);
        let decision = classify(&task, &DispatchContext::default());
        assert!(decision.signals.is_empty());
        assert_eq!(decision.confidence, 0.4);
    }
}
