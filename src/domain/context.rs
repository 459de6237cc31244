//! Dispatch context: the planner-supplied signals the Reasoning
//! Classifier and Agent Pool's recommendation heuristic read alongside
//! the task itself. Distinct from [`crate::domain::Task`]
//! because these counts describe the surrounding project state, not the
//! task record.

/// Project-state signals surrounding one dispatch decision.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub relevant_decisions: usize,
    pub relevant_constraints: usize,
    pub quality_issues_in_area: usize,
    pub files_in_context: usize,
    pub related_high_complexity_tasks: usize,
    pub related_blocked_task: bool,
    pub project_phase: Option<String>,
    pub quality_trend_declining: bool,
}
