//! Readiness Gate: per-task check combining dependency,
//! required-file, backoff, recent-failure, and verification-readiness
//! blockers.
//!
//! Grounded in this crate's `services/overseers/traits.rs`
//! `has_blocking_failures` pattern: accumulate independent checks into
//! one ordered blocker list rather than short-circuiting on the first
//! failure, so a caller sees every reason a task isn't ready.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::{Blocker, BlockerKind, ReadinessVerdict, Task, TaskStatus};
use crate::ports::TaskStore;

/// Evaluates a task's readiness against the task store and workspace
/// filesystem.
pub struct ReadinessGate {
    task_store: Arc<dyn TaskStore>,
    workspace_root: PathBuf,
}

impl ReadinessGate {
    pub fn new(task_store: Arc<dyn TaskStore>, workspace_root: impl Into<PathBuf>) -> Self {
        Self { task_store, workspace_root: workspace_root.into() }
    }

    /// Combine every blocker source for `task` into one verdict.
    pub async fn check(&self, task: &Task) -> ReadinessVerdict {
        let now = Utc::now();
        let mut blockers = Vec::new();

        let deps_done = self.dependency_check(task, &mut blockers).await;
        self.required_files_check(task, &mut blockers);
        self.backoff_check(task, now, &mut blockers);
        self.recent_failure_check(task, now, &mut blockers);
        self.verification_check(task, deps_done, &mut blockers);

        if blockers.is_empty() {
            return ReadinessVerdict::ready();
        }

        let next_check_time = blockers
            .iter()
            .filter_map(|b| b.blocked_until)
            .min()
            .unwrap_or_else(|| now + chrono::Duration::minutes(5));
        let score = 100u8.saturating_sub((blockers.len() as u8).saturating_mul(20));

        ReadinessVerdict { ready: false, score, blockers, next_check_time: Some(next_check_time) }
    }

    /// Returns whether every dependency exists and is `done`.
    async fn dependency_check(&self, task: &Task, blockers: &mut Vec<Blocker>) -> bool {
        let mut all_done = true;
        for dep_id in &task.dependencies {
            match self.task_store.get_task(dep_id).await {
                Ok(dep) if dep.status == TaskStatus::Done => {}
                Ok(_) => {
                    all_done = false;
                    blockers.push(
                        Blocker::new(BlockerKind::Dependency, format!("dependency {dep_id} is not done"))
                            .with_blocked_by(dep_id.clone()),
                    );
                }
                Err(_) => {
                    all_done = false;
                    blockers.push(
                        Blocker::new(BlockerKind::Dependency, format!("dependency {dep_id} not found"))
                            .with_blocked_by(dep_id.clone()),
                    );
                }
            }
        }
        all_done
    }

    fn required_files_check(&self, task: &Task, blockers: &mut Vec<Blocker>) {
        for rel in &task.required_files {
            let path = resolve_workspace_path(&self.workspace_root, rel);
            if !path.exists() {
                blockers.push(Blocker::new(
                    BlockerKind::MissingFile,
                    format!("required file missing: {rel}"),
                ));
            }
        }
    }

    fn backoff_check(&self, task: &Task, now: DateTime<Utc>, blockers: &mut Vec<Blocker>) {
        if task.failure_count == 0 {
            return;
        }
        let Some(last_attempt) = task.last_attempt_time else {
            return;
        };
        let backoff_minutes = 2f64.powi(task.failure_count.min(6) as i32);
        let backoff_until = last_attempt + chrono::Duration::seconds((backoff_minutes * 60.0) as i64);
        if now < backoff_until {
            blockers.push(
                Blocker::new(
                    BlockerKind::Backoff,
                    format!("backing off after {} failures", task.failure_count),
                )
                .with_blocked_until(backoff_until),
            );
        }
    }

    fn recent_failure_check(&self, task: &Task, now: DateTime<Utc>, blockers: &mut Vec<Blocker>) {
        if task.metadata_bool("should_retry") == Some(false) {
            blockers.push(Blocker::new(BlockerKind::RecentFailure, "should_retry is false"));
            return;
        }
        if task.last_error.is_none() {
            return;
        }
        let Some(last_attempt) = task.last_attempt_time else {
            return;
        };
        let window_end = last_attempt + chrono::Duration::minutes(5);
        if now < window_end {
            blockers.push(
                Blocker::new(BlockerKind::RecentFailure, "last error within the retry window")
                    .with_blocked_until(window_end),
            );
        }
    }

    fn verification_check(&self, task: &Task, deps_done: bool, blockers: &mut Vec<Blocker>) {
        if !task.is_verification_task() {
            return;
        }
        if task.dependencies.is_empty() || !deps_done {
            blockers.push(Blocker::new(
                BlockerKind::VerificationUnready,
                "verification task has no completed dependency to verify",
            ));
        }
    }
}

fn resolve_workspace_path(workspace_root: &Path, rel: &str) -> PathBuf {
    let candidate = Path::new(rel);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workspace_root.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;
    use crate::testutil::InMemoryTaskStore;

    #[tokio::test]
    async fn ready_task_with_no_blockers() {
        let store = InMemoryTaskStore::new(vec![]);
        let gate = ReadinessGate::new(store, "/tmp/workspace");
        let task = Task::new("t1", "Do the thing", TaskType::Task);
        let verdict = gate.check(&task).await;
        assert!(verdict.ready);
        assert!(verdict.blockers.is_empty());
    }

    #[tokio::test]
    async fn blocks_on_incomplete_dependency() {
        let dep = Task::new("dep", "Dependency", TaskType::Task).with_status(TaskStatus::InProgress);
        let store = InMemoryTaskStore::new(vec![dep]);
        let gate = ReadinessGate::new(store, "/tmp/workspace");
        let task = Task::new("t1", "Depends on dep", TaskType::Task).with_dependencies(vec!["dep".to_string()]);
        let verdict = gate.check(&task).await;
        assert!(!verdict.ready);
        assert!(verdict.blockers.iter().any(|b| b.kind == BlockerKind::Dependency));
    }

    #[tokio::test]
    async fn blocks_during_backoff_window() {
        let store = InMemoryTaskStore::new(vec![]);
        let gate = ReadinessGate::new(store, "/tmp/workspace");
        let mut task = Task::new("t1", "Retry me", TaskType::Task);
        task.failure_count = 2;
        task.last_attempt_time = Some(Utc::now());
        let verdict = gate.check(&task).await;
        assert!(!verdict.ready);
        assert!(verdict.blockers.iter().any(|b| b.kind == BlockerKind::Backoff));
    }

    #[tokio::test]
    async fn verification_task_without_done_dependency_is_unready() {
        let store = InMemoryTaskStore::new(vec![]);
        let gate = ReadinessGate::new(store, "/tmp/workspace");
        let task = Task::new("t1", "Verify the deployment", TaskType::Task);
        let verdict = gate.check(&task).await;
        assert!(!verdict.ready);
        assert!(verdict.blockers.iter().any(|b| b.kind == BlockerKind::VerificationUnready));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::testutil::InMemoryTaskStore;
    use proptest::prelude::*;
    use test_strategy::proptest;

    fn backoff_until(gate: &ReadinessGate, failure_count: u32, now: DateTime<Utc>, last_attempt: DateTime<Utc>) -> DateTime<Utc> {
        let mut task = Task::new("t1", "Retry me", crate::domain::TaskType::Task);
        task.failure_count = failure_count;
        task.last_attempt_time = Some(last_attempt);
        let mut blockers = Vec::new();
        gate.backoff_check(&task, now, &mut blockers);
        blockers[0].blocked_until.expect("a failing task must carry a backoff deadline")
    }

    #[proptest]
    fn p6_backoff_window_is_monotonic_and_capped_at_64_minutes(
        #[strategy(1u32..20)] lower_failure_count: u32,
        #[strategy(1u32..20)] delta: u32,
    ) {
        let higher_failure_count = lower_failure_count + delta;
        let store = InMemoryTaskStore::new(vec![]);
        let gate = ReadinessGate::new(store, "/tmp/workspace");
        let now = Utc::now();
        let last_attempt = now - chrono::Duration::seconds(1);

        let lower_until = backoff_until(&gate, lower_failure_count, now, last_attempt);
        let higher_until = backoff_until(&gate, higher_failure_count, now, last_attempt);

        if lower_failure_count.min(6) == higher_failure_count.min(6) {
            prop_assert_eq!(lower_until, higher_until);
        } else {
            prop_assert!(higher_until > lower_until);
        }

        let cap_secs = (2f64.powi(6) * 60.0) as i64;
        prop_assert!((higher_until - last_attempt).num_seconds() <= cap_secs);
    }
}
