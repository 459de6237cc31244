//! Dispatcher: one scheduling tick over ready tasks, gluing
//! the Readiness Gate, Reasoning Classifier, Agent Pool, Resource
//! Supervisor, Verifier, and Phase Ledger together.
//!
//! Grounded in this crate's `services/swarm_orchestrator.rs`'s `tick()`
//! shape: pull candidates, filter by readiness, dispatch what fits under
//! the resource ceiling, and never let one worker's crash escape its own
//! agent's state.

use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::classifier;
use crate::domain::{DispatchContext, FailureKind, Task, TaskStatus, TaskType};
use crate::ledger::{AppendMeta, PhaseLedger};
use crate::pool::{AgentPool, AssignOptions, CompletionMeta, PoolError};
use crate::ports::{TaskFilter, TaskStore};
use crate::readiness::ReadinessGate;
use crate::supervisor::ResourceSupervisor;
use crate::verifier::{IntegrityInputs, Verifier};

/// Why a candidate task was not dispatched this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotReady,
    NoAgentAvailable,
    AtCapacity,
}

/// What happened to a task that was actually dispatched this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Skipped(SkipReason),
    Succeeded { gates_passed: bool },
    RateLimited,
    ContextLimited,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TickResult {
    pub task_id: String,
    pub outcome: DispatchOutcome,
}

pub struct Dispatcher {
    task_store: Arc<dyn TaskStore>,
    pool: Arc<AgentPool>,
    supervisor: Arc<ResourceSupervisor>,
    readiness: ReadinessGate,
    verifier: Verifier,
    ledger: Arc<PhaseLedger>,
    working_dir: PathBuf,
    sandbox_mode: String,
}

impl Dispatcher {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        pool: Arc<AgentPool>,
        supervisor: Arc<ResourceSupervisor>,
        readiness: ReadinessGate,
        verifier: Verifier,
        ledger: Arc<PhaseLedger>,
        working_dir: PathBuf,
        sandbox_mode: impl Into<String>,
    ) -> Self {
        Self { task_store, pool, supervisor, readiness, verifier, ledger, working_dir, sandbox_mode: sandbox_mode.into() }
    }

    /// Run one scheduling tick.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Vec<TickResult> {
        let candidates = match self.candidate_tasks().await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %err, "failed to load candidate tasks");
                return Vec::new();
            }
        };

        let mut ordered = Vec::with_capacity(candidates.len());
        for task in candidates {
            let verdict = self.readiness.check(&task).await;
            ordered.push((verdict.score, verdict.ready, task));
        }
        ordered.sort_by(|a, b| b.0.cmp(&a.0));

        let mut results = Vec::with_capacity(ordered.len());
        for (_, ready, task) in ordered {
            if !ready {
                results.push(TickResult { task_id: task.id.clone(), outcome: DispatchOutcome::Skipped(SkipReason::NotReady) });
                continue;
            }
            let outcome = self.dispatch_one(&task).await;
            results.push(TickResult { task_id: task.id, outcome });
        }
        results
    }

    async fn candidate_tasks(&self) -> Result<Vec<Task>, crate::ports::TaskStoreError> {
        let mut tasks = self.task_store.get_tasks(TaskFilter { status: Some(TaskStatus::Pending) }).await?;
        tasks.extend(self.task_store.get_tasks(TaskFilter { status: Some(TaskStatus::NeedsImprovement) }).await?);
        Ok(tasks)
    }

    async fn dispatch_one(&self, task: &Task) -> DispatchOutcome {
        let context = DispatchContext::default();
        let decision = classifier::classify(task, &context);

        let assignment = match self.pool.assign(task, &context, &AssignOptions::default()).await {
            Ok(assignment) => assignment,
            Err(PoolError::NoAgentAvailable) => return DispatchOutcome::Skipped(SkipReason::NoAgentAvailable),
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "unexpected pool error while assigning");
                return DispatchOutcome::Skipped(SkipReason::NoAgentAvailable);
            }
        };

        if !self.supervisor.can_spawn().await {
            if let Err(err) = self.pool.release(&task.id).await {
                warn!(task_id = %task.id, error = %err, "failed to release assignment after capacity refusal");
            }
            return DispatchOutcome::Skipped(SkipReason::AtCapacity);
        }

        let prompt = format!("{}\n\n{}", task.title, task.description);
        // Only the `architect` roster slot carries `AgentType::Architect`;
        // a promoted engineer keeps its engineer invocation command (see
        // domain::Agent's doc comment).
        let is_architect = assignment.agent_id == "architect";
        let outcome = if is_architect {
            self.pool
                .execute_with_architect(&assignment.agent_id, &task.id, &prompt, &self.working_dir, &self.supervisor)
                .await
        } else {
            let worker_config = crate::domain::WorkerConfig { reasoning_level: Some(decision.level), ..Default::default() };
            self.pool
                .execute_with_engineer(
                    &assignment.agent_id,
                    &task.id,
                    &prompt,
                    &self.working_dir,
                    &self.sandbox_mode,
                    Some(&worker_config),
                    &self.supervisor,
                )
                .await
        };

        match outcome.failure_kind {
            None => self.handle_success(task, &assignment.agent_id, &outcome).await,
            Some(FailureKind::RateLimit) => {
                let _ = self
                    .pool
                    .complete(
                        &task.id,
                        false,
                        outcome.elapsed_secs,
                        Some(CompletionMeta { failure_kind: Some(FailureKind::RateLimit), retry_after_secs: outcome.retry_after_secs }),
                    )
                    .await;
                self.record_failure(task, "rate limited", false).await;
                DispatchOutcome::RateLimited
            }
            Some(FailureKind::ContextLimit) => {
                let _ = self.pool.complete(&task.id, false, outcome.elapsed_secs, None).await;
                self.record_failure(task, "context limit exceeded", true).await;
                DispatchOutcome::ContextLimited
            }
            Some(FailureKind::Other) => {
                let _ = self.pool.complete(&task.id, false, outcome.elapsed_secs, None).await;
                self.record_failure(task, &outcome.raw_output, false).await;
                DispatchOutcome::Failed
            }
        }
    }

    async fn handle_success(&self, task: &Task, agent_id: &str, outcome: &crate::domain::ExecutionOutcome) -> DispatchOutcome {
        let changed_files = metadata_string_list(task, "changed_files");
        let integrity_inputs = integrity_inputs_from_metadata(task);
        let report = self.verifier.verify(&changed_files, &integrity_inputs).await;

        let _ = self.pool.complete(&task.id, true, outcome.elapsed_secs, None).await;

        let to_phase = if report.passed { TaskStatus::Done } else { TaskStatus::NeedsImprovement };
        if let Err(err) = self
            .task_store
            .transition(&task.id, to_phase, None, None, "dispatcher")
            .await
        {
            warn!(task_id = %task.id, error = %err, "failed to transition task after verification");
        }

        if let Err(err) = self
            .ledger
            .append_transition(
                task.id.clone(),
                Some(task.status.as_str().to_string()),
                to_phase.as_str().to_string(),
                changed_files,
                report.passed,
                Some(AppendMeta { agent_type: Some(agent_id.to_string()), duration_ms: Some((outcome.elapsed_secs * 1000.0) as u64), persona_hash: None }),
            )
            .await
        {
            warn!(task_id = %task.id, error = %err, "failed to append ledger entry");
        }

        info!(task_id = %task.id, gates_passed = report.passed, "dispatch tick completed for task");
        DispatchOutcome::Succeeded { gates_passed: report.passed }
    }

    async fn record_failure(&self, task: &Task, error_message: &str, needs_context_compaction: bool) {
        let mut metadata = HashMap::new();
        metadata.insert("last_error".to_string(), Value::String(error_message.to_string()));
        metadata.insert("failure_count".to_string(), Value::from(task.failure_count + 1));
        if needs_context_compaction {
            metadata.insert("context_compaction_needed".to_string(), Value::Bool(true));
        }

        if let Err(err) = self
            .task_store
            .transition(&task.id, TaskStatus::Pending, Some(metadata), None, "dispatcher")
            .await
        {
            warn!(task_id = %task.id, error = %err, "failed to record failure metadata");
        }

        if let Err(err) = self
            .ledger
            .append_transition(task.id.clone(), Some(task.status.as_str().to_string()), "pending", vec![], false, None)
            .await
        {
            warn!(task_id = %task.id, error = %err, "failed to append ledger entry for failure");
        }
    }
}

fn metadata_string_list(task: &Task, key: &str) -> Vec<String> {
    task.metadata
        .get(key)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn integrity_inputs_from_metadata(task: &Task) -> IntegrityInputs {
    IntegrityInputs {
        changed_lines_coverage: task.metadata.get("changed_lines_coverage").and_then(Value::as_f64).unwrap_or(0.0),
        touched_files_delta_coverage: task.metadata.get("touched_files_delta_coverage").and_then(Value::as_f64).unwrap_or(0.0),
        failing_test_proof_declared: task.metadata_bool("failing_test_proof_declared").unwrap_or(false),
        failing_test_proof_provided: task.metadata_bool("failing_test_proof_provided").unwrap_or(false),
        mutation_smoke_passed: task.metadata.get("mutation_smoke_passed").and_then(Value::as_bool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ToolRunResult, ToolRunnerError};
    use crate::supervisor::SupervisorConfig;
    use crate::testutil::InMemoryTaskStore;
    use crate::verifier::{IntegrityChecker, IntegrityConfig};
    use async_trait::async_trait;

    struct AlwaysPassRunner;

    #[async_trait]
    impl crate::ports::ToolRunner for AlwaysPassRunner {
        async fn run(&self, _tool_name: &str, _inputs: &HashMap<String, String>) -> Result<ToolRunResult, ToolRunnerError> {
            Ok(ToolRunResult { success: true, output: String::new() })
        }
    }

    async fn build_dispatcher(tasks: Vec<Task>) -> (Dispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryTaskStore::new(tasks);
        let pool = Arc::new(AgentPool::new(2));
        let supervisor = Arc::new(ResourceSupervisor::new(SupervisorConfig { max_concurrent: 10, ..Default::default() }));
        let readiness = ReadinessGate::new(store.clone(), dir.path().to_path_buf());
        let runner = Arc::new(AlwaysPassRunner);
        let verifier = Verifier::new(runner, IntegrityChecker::new(IntegrityConfig::default()));
        let ledger = Arc::new(PhaseLedger::open(dir.path().join("ledger.jsonl")).await.unwrap());
        let dispatcher = Dispatcher::new(store, pool, supervisor, readiness, verifier, ledger, dir.path().to_path_buf(), "workspace-write");
        (dispatcher, dir)
    }

    #[tokio::test]
    async fn blocked_task_is_skipped_as_not_ready() {
        let task = Task::new("t1", "Depends on missing", TaskType::Task).with_dependencies(vec!["ghost".to_string()]);
        let (dispatcher, _dir) = build_dispatcher(vec![task]).await;
        let results = dispatcher.run_once().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, DispatchOutcome::Skipped(SkipReason::NotReady));
    }

    #[tokio::test]
    async fn exhausted_pool_skips_remaining_ready_tasks() {
        let mut tasks = Vec::new();
        for i in 0..5 {
            tasks.push(Task::new(format!("t{i}"), "Independent work", TaskType::Task));
        }
        let (dispatcher, _dir) = build_dispatcher(tasks).await;
        let results = dispatcher.run_once().await;
        let no_agent_skips = results
            .iter()
            .filter(|r| r.outcome == DispatchOutcome::Skipped(SkipReason::NoAgentAvailable))
            .count();
        assert!(no_agent_skips > 0, "expected some tasks to exhaust the 2-engineer roster");
    }
}
