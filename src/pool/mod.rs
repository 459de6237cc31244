//! Agent Pool: roster, routing, load balancing, cooldowns,
//! coordinator promotion, and worker invocation.
//!
//! Grounded in this crate's `domain/models/agent.rs` for the roster
//! shape and `infrastructure/substrates/claude_code.rs` for the
//! spawn-capture-classify execution loop; the broadcast event channel
//! follows `services/event_bus.rs`.

use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::domain::{
    Agent, AgentRole, AgentStatus, AgentType, Assignment, DispatchContext, Envelope,
    ExecutionOutcome, FailureKind, FleetEvent, ReasoningLevel, Task, TaskStatus, TaskType,
    WorkerConfig,
};
use crate::supervisor::{ResourceSupervisor, WorkerRecord};
use crate::worker;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no agent available for this task")]
    NoAgentAvailable,
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("no open assignment for task: {0}")]
    NoAssignment(String),
    #[error("coordinator is not eligible for promotion")]
    NotEligibleForPromotion,
    #[error("coordinator is not eligible for demotion")]
    NotEligibleForDemotion,
}

/// Routing hints accepted by [`AgentPool::assign`].
#[derive(Debug, Clone, Default)]
pub struct AssignOptions {
    pub force_type: Option<AgentType>,
    pub prefer_type: Option<AgentType>,
    pub avoid: Vec<AgentType>,
}

/// Outcome metadata passed to [`AgentPool::complete`] on failure.
#[derive(Debug, Clone, Default)]
pub struct CompletionMeta {
    pub failure_kind: Option<FailureKind>,
    pub retry_after_secs: Option<i64>,
}

/// Aggregate pool metrics.
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub total: usize,
    pub busy: usize,
    pub idle: usize,
    pub completed: u64,
    pub failed: u64,
    pub avg_duration_secs: f64,
    pub architect_usage_ratio: f64,
    pub engineer_usage_ratio: f64,
}

struct Roster {
    agents: Vec<Agent>,
    assignments: HashMap<String, Assignment>,
}

/// One architect plus N engineers, with coordinator promotion/demotion,
/// cooldown-aware routing, and worker-process execution.
pub struct AgentPool {
    roster: Arc<RwLock<Roster>>,
    candidate_id: String,
    promoted: AtomicBool,
    event_tx: broadcast::Sender<Envelope>,
    sequence: Arc<AtomicU64>,
    execution_timeout: Duration,
}

/// Assign the next sequence number and publish an event. Free function so
/// it can be shared with tasks spawned off the pool (e.g. auto-reset) that
/// only hold a clone of the sender and counter, not `&AgentPool`.
fn emit_envelope(tx: &broadcast::Sender<Envelope>, sequence: &AtomicU64, event: FleetEvent) {
    let seq = sequence.fetch_add(1, Ordering::SeqCst);
    let _ = tx.send(Envelope::new(seq, event));
}

/// Default wall-clock ceiling on one worker execution call, distinct from
/// the Resource Supervisor's own sweep timeout.
const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

impl AgentPool {
    /// Initialise the roster: one architect (`architect`), `engineer_count`
    /// engineers with roles cycling `engineer, qa, engineer, ...`. The
    /// first engineer is the sole coordinator-promotion candidate.
    pub fn new(engineer_count: u32) -> Self {
        let mut agents = Vec::with_capacity(1 + engineer_count as usize);
        agents.push(Agent::new("architect", AgentType::Architect, AgentRole::Architect, 0));

        let mut candidate_id = String::new();
        for i in 0..engineer_count {
            let id = format!("engineer-{}", i + 1);
            let role = if i % 2 == 0 { AgentRole::Engineer } else { AgentRole::Qa };
            if i == 0 {
                candidate_id = id.clone();
            }
            agents.push(Agent::new(id, AgentType::Engineer, role, i + 1));
        }

        let (event_tx, _) = broadcast::channel(256);
        Self {
            roster: Arc::new(RwLock::new(Roster { agents, assignments: HashMap::new() })),
            candidate_id,
            promoted: AtomicBool::new(false),
            event_tx,
            sequence: Arc::new(AtomicU64::new(0)),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    /// Override the default 30-minute execution-call timeout.
    #[must_use]
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: FleetEvent) {
        emit_envelope(&self.event_tx, &self.sequence, event);
    }

    /// Check (and lazily clear) an agent's cooldown, emitting
    /// `AgentCooldownCleared` the moment it lapses. Returns whether the
    /// agent is still on cooldown.
    fn check_cooldown(&self, agent: &mut Agent, now: chrono::DateTime<Utc>) -> bool {
        let had_cooldown = agent.cooldown_until.is_some();
        let on_cooldown = agent.is_on_cooldown(now);
        if had_cooldown && !on_cooldown {
            self.emit(FleetEvent::AgentCooldownCleared { agent_id: agent.id.clone() });
        }
        on_cooldown
    }

    /// Purely syntactic agent-type recommendation. Distinct from the Reasoning Classifier, which
    /// picks a *reasoning depth*, not a worker type.
    pub async fn recommend(&self, task: &Task, context: &DispatchContext) -> AgentType {
        if self.promoted.load(Ordering::SeqCst) {
            return AgentType::Engineer;
        }
        if task.status == TaskStatus::NeedsReview {
            return AgentType::Architect;
        }
        if task.status == TaskStatus::NeedsImprovement {
            return AgentType::Engineer;
        }
        if task.complexity >= 8 {
            return AgentType::Architect;
        }
        if task.task_type == TaskType::Epic {
            return AgentType::Architect;
        }
        let text = task.searchable_text();
        if task.title.to_lowercase().contains("review") {
            return AgentType::Architect;
        }
        const STRATEGY_KEYWORDS: [&str; 5] =
            ["design", "architecture", "methodology", "approach", "strategy"];
        if STRATEGY_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            return AgentType::Architect;
        }
        if context.relevant_decisions > 3 || context.relevant_constraints > 2 {
            return AgentType::Architect;
        }
        if context.quality_issues_in_area > 3 {
            return AgentType::Architect;
        }
        AgentType::Engineer
    }

    /// Route a task to an agent.
    #[instrument(skip(self, task, context))]
    pub async fn assign(
        &self,
        task: &Task,
        context: &DispatchContext,
        options: &AssignOptions,
    ) -> Result<Assignment, PoolError> {
        let preferred = options
            .force_type
            .or(options.prefer_type)
            .unwrap_or(self.recommend(task, context).await);

        let mut search_order = vec![preferred, preferred.alternate()];
        search_order.retain(|t| !options.avoid.contains(t));
        search_order.dedup();

        let now = Utc::now();
        let mut roster = self.roster.write().await;

        for agent in roster.agents.iter_mut() {
            self.check_cooldown(agent, now);
        }

        for (i, &candidate_type) in search_order.iter().enumerate() {
            let Some(agent) = pick_lowest_load(&mut roster.agents, candidate_type, now) else {
                continue;
            };
            let agent_id = agent.id.clone();
            agent.status = AgentStatus::Busy;
            agent.current_task_id = Some(task.id.clone());
            agent.last_used_at = Some(now);

            if i > 0 {
                self.emit(FleetEvent::AgentFallback {
                    task_id: task.id.clone(),
                    preferred: preferred.as_str().to_string(),
                    used: candidate_type.as_str().to_string(),
                });
            }

            let estimated_duration_secs = estimate_duration(task, candidate_type, agent.avg_duration_secs);
            let assignment = Assignment {
                task_id: task.id.clone(),
                agent_id: agent_id.clone(),
                assigned_at: now,
                estimated_duration_secs,
                worker_config: None,
            };
            roster.assignments.insert(task.id.clone(), assignment.clone());

            self.emit(FleetEvent::TaskAssigned {
                task_id: task.id.clone(),
                agent_id,
            });
            return Ok(assignment);
        }

        Err(PoolError::NoAgentAvailable)
    }

    /// Promote the coordinator candidate to carry the `architect` role.
    pub async fn promote_coordinator(&self, reason: &str) -> Result<(), PoolError> {
        let now = Utc::now();
        let mut roster = self.roster.write().await;
        if self.promoted.load(Ordering::SeqCst) {
            return Err(PoolError::NotEligibleForPromotion);
        }

        let architect_unavailable = {
            let architect = find_agent_mut(&mut roster.agents, "architect")
                .ok_or_else(|| PoolError::UnknownAgent("architect".to_string()))?;
            self.check_cooldown(architect, now) || architect.status != AgentStatus::Idle
        };
        if !architect_unavailable {
            return Err(PoolError::NotEligibleForPromotion);
        }

        let candidate_id = self.candidate_id.clone();
        let candidate = find_agent_mut(&mut roster.agents, &candidate_id)
            .ok_or_else(|| PoolError::UnknownAgent(candidate_id.clone()))?;
        if self.check_cooldown(candidate, now) || candidate.status != AgentStatus::Idle {
            return Err(PoolError::NotEligibleForPromotion);
        }
        candidate.role = AgentRole::Architect;
        candidate.promoted_at = Some(now);
        self.promoted.store(true, Ordering::SeqCst);

        info!(candidate_id, reason, "coordinator promoted");
        self.emit(FleetEvent::CoordinatorPromoted {
            agent_id: candidate_id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Demote the candidate back to its base role.
    pub async fn demote_coordinator(&self) -> Result<(), PoolError> {
        if !self.promoted.load(Ordering::SeqCst) {
            return Err(PoolError::NotEligibleForDemotion);
        }
        let now = Utc::now();
        let mut roster = self.roster.write().await;
        let architect_ready = {
            let architect = find_agent_mut(&mut roster.agents, "architect")
                .ok_or_else(|| PoolError::UnknownAgent("architect".to_string()))?;
            !self.check_cooldown(architect, now) && architect.status == AgentStatus::Idle
        };
        if !architect_ready {
            return Err(PoolError::NotEligibleForDemotion);
        }

        let candidate_id = self.candidate_id.clone();
        let candidate = find_agent_mut(&mut roster.agents, &candidate_id)
            .ok_or_else(|| PoolError::UnknownAgent(candidate_id.clone()))?;
        candidate.role = candidate.base_role;
        candidate.promoted_at = None;
        self.promoted.store(false, Ordering::SeqCst);

        self.emit(FleetEvent::CoordinatorDemoted { agent_id: candidate_id });
        Ok(())
    }

    /// Release a task's assignment without recording a completion outcome.
    /// The agent returns to idle as if it was never assigned.
    pub async fn release(&self, task_id: &str) -> Result<(), PoolError> {
        let mut roster = self.roster.write().await;
        let assignment = roster
            .assignments
            .remove(task_id)
            .ok_or_else(|| PoolError::NoAssignment(task_id.to_string()))?;
        if let Some(agent) = find_agent_mut(&mut roster.agents, &assignment.agent_id) {
            agent.status = AgentStatus::Idle;
            agent.current_task_id = None;
        }
        Ok(())
    }

    /// Resolve a task's assignment.
    pub async fn complete(
        &self,
        task_id: &str,
        success: bool,
        duration_secs: f64,
        meta: Option<CompletionMeta>,
    ) -> Result<(), PoolError> {
        let now = Utc::now();
        let (agent_id, cooldown_secs) = {
            let mut roster = self.roster.write().await;
            let assignment = roster
                .assignments
                .remove(task_id)
                .ok_or_else(|| PoolError::NoAssignment(task_id.to_string()))?;
            let agent_id = assignment.agent_id.clone();

            let mut cooldown_secs = None;
            {
                let agent = find_agent_mut(&mut roster.agents, &agent_id)
                    .ok_or_else(|| PoolError::UnknownAgent(agent_id.clone()))?;
                agent.record_completion(success, duration_secs);

                if !success {
                    let is_rate_limit = meta
                        .as_ref()
                        .map(|m| m.failure_kind == Some(FailureKind::RateLimit))
                        .unwrap_or(false);
                    if is_rate_limit {
                        let retry_after = meta.as_ref().and_then(|m| m.retry_after_secs).unwrap_or(0);
                        let secs = retry_after.max(5);
                        agent.set_cooldown(now, secs);
                        cooldown_secs = Some(secs);
                    } else {
                        agent.status = AgentStatus::Failed;
                    }
                }
            }
            (agent_id, cooldown_secs)
        };

        if let Some(secs) = cooldown_secs {
            self.emit(FleetEvent::AgentCooldown { agent_id: agent_id.clone(), seconds: secs });
        } else if !success {
            self.schedule_auto_reset(agent_id.clone());
        }

        self.emit(FleetEvent::TaskCompleted {
            task_id: task_id.to_string(),
            agent_id,
            success,
        });
        Ok(())
    }

    fn schedule_auto_reset(&self, agent_id: String) {
        let roster = Arc::clone(&self.roster);
        let event_tx = self.event_tx.clone();
        let sequence = Arc::clone(&self.sequence);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            let mut roster = roster.write().await;
            if let Some(agent) = find_agent_mut(&mut roster.agents, &agent_id) {
                if agent.status == AgentStatus::Failed && agent.cooldown_until.is_none() {
                    agent.status = AgentStatus::Idle;
                    emit_envelope(
                        &event_tx,
                        &sequence,
                        FleetEvent::AgentCooldownCleared { agent_id: agent_id.clone() },
                    );
                }
            }
        });
    }

    pub async fn metrics(&self) -> PoolMetrics {
        let roster = self.roster.read().await;
        let total = roster.agents.len();
        let busy = roster.agents.iter().filter(|a| a.status == AgentStatus::Busy).count();
        let completed: u64 = roster.agents.iter().map(|a| a.completed_tasks).sum();
        let failed: u64 = roster.agents.iter().map(|a| a.failed_tasks).sum();
        let architect_completed: u64 = roster
            .agents
            .iter()
            .filter(|a| a.agent_type == AgentType::Architect)
            .map(|a| a.completed_tasks)
            .sum();
        let engineer_completed = completed.saturating_sub(architect_completed);
        let avg_duration_secs = if total == 0 {
            0.0
        } else {
            roster.agents.iter().map(|a| a.avg_duration_secs).sum::<f64>() / total as f64
        };

        PoolMetrics {
            total,
            busy,
            idle: total - busy,
            completed,
            failed,
            avg_duration_secs,
            architect_usage_ratio: ratio(architect_completed, completed),
            engineer_usage_ratio: ratio(engineer_completed, completed),
        }
    }

    /// Invoke the architect worker for a task already assigned to
    /// `agent_id`.
    pub async fn execute_with_architect(
        &self,
        agent_id: &str,
        task_id: &str,
        prompt: &str,
        working_dir: &Path,
        supervisor: &Arc<ResourceSupervisor>,
    ) -> ExecutionOutcome {
        let cmd = worker::architect_command(prompt, working_dir);
        self.run_worker(agent_id, task_id, "architect", None, cmd, supervisor).await
    }

    /// Invoke the engineer worker for a task already assigned to
    /// `agent_id`.
    pub async fn execute_with_engineer(
        &self,
        agent_id: &str,
        task_id: &str,
        prompt: &str,
        working_dir: &Path,
        sandbox_mode: &str,
        worker_config: Option<&WorkerConfig>,
        supervisor: &Arc<ResourceSupervisor>,
    ) -> ExecutionOutcome {
        let model = worker_config.and_then(|c| c.model.as_deref());
        let reasoning = worker_config.and_then(|c| c.reasoning_level);
        let cmd = worker::engineer_command(prompt, sandbox_mode, model, reasoning, working_dir);
        self.run_worker(agent_id, task_id, "engineer", model.map(str::to_string), cmd, supervisor)
            .await
    }

    async fn run_worker(
        &self,
        agent_id: &str,
        task_id: &str,
        provider: &str,
        model: Option<String>,
        mut cmd: tokio::process::Command,
        supervisor: &Arc<ResourceSupervisor>,
    ) -> ExecutionOutcome {
        let start = Utc::now();
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.emit(FleetEvent::AgentError {
                    agent_id: agent_id.to_string(),
                    task_id: task_id.to_string(),
                    message: err.to_string(),
                });
                return ExecutionOutcome::failure(err.to_string(), 0.0, FailureKind::Other, None);
            }
        };
        let Some(pid) = child.id() else {
            return ExecutionOutcome::failure("worker exited before spawn completed", 0.0, FailureKind::Other, None);
        };

        let record = WorkerRecord {
            pid,
            task_id: task_id.to_string(),
            provider: provider.to_string(),
            model,
            start_time: start,
        };
        if supervisor.register(record).await.is_err() {
            return ExecutionOutcome::failure("rejected: supervisor shutting down", 0.0, FailureKind::Other, None);
        }

        let waited = timeout(self.execution_timeout, child.wait_with_output()).await;
        supervisor.unregister(pid).await;
        let elapsed_secs = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;

        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                self.emit(FleetEvent::AgentError {
                    agent_id: agent_id.to_string(),
                    task_id: task_id.to_string(),
                    message: err.to_string(),
                });
                return ExecutionOutcome::failure(err.to_string(), elapsed_secs, FailureKind::Other, None);
            }
            Err(_) => {
                warn!(agent_id, task_id, pid, "worker execution call timed out, killing process group");
                kill_process_group(pid);
                let message = format!("execution call timed out after {:?}", self.execution_timeout);
                self.emit(FleetEvent::AgentError {
                    agent_id: agent_id.to_string(),
                    task_id: task_id.to_string(),
                    message: message.clone(),
                });
                return ExecutionOutcome::failure(message, elapsed_secs, FailureKind::Other, None);
            }
        };

        let combined = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        if output.status.success() {
            let mut outcome = ExecutionOutcome::success(combined.clone(), elapsed_secs);
            outcome.usage = worker::parse_usage(&combined);
            outcome
        } else {
            let failure_kind = worker::classify_failure(&combined);
            let retry_after_secs = worker::parse_retry_after(&combined);
            warn!(agent_id, task_id, ?failure_kind, "worker invocation failed");
            self.emit(FleetEvent::AgentError {
                agent_id: agent_id.to_string(),
                task_id: task_id.to_string(),
                message: combined.clone(),
            });
            let mut outcome = ExecutionOutcome::failure(combined, elapsed_secs, failure_kind, retry_after_secs);
            outcome.usage = worker::parse_usage(&outcome.raw_output);
            outcome
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn find_agent_mut<'a>(agents: &'a mut [Agent], id: &str) -> Option<&'a mut Agent> {
    agents.iter_mut().find(|a| a.id == id)
}

/// Pick the idle, non-cooldown agent of `agent_type` with the lowest
/// completed-task count, tie-broken by insertion order.
fn pick_lowest_load(
    agents: &mut [Agent],
    agent_type: AgentType,
    now: chrono::DateTime<Utc>,
) -> Option<&mut Agent> {
    let mut best: Option<(usize, u64, u32)> = None;
    for (i, agent) in agents.iter_mut().enumerate() {
        if agent.agent_type != agent_type || !agent.is_idle(now) {
            continue;
        }
        let key = (agent.completed_tasks, agent.insertion_order);
        let replace = match best {
            None => true,
            Some((_, c, o)) => key < (c, o),
        };
        if replace {
            best = Some((i, key.0, key.1));
        }
    }
    best.map(move |(i, _, _)| &mut agents[i])
}

/// Duration estimate in seconds.
fn estimate_duration(task: &Task, agent_type: AgentType, agent_avg_duration_secs: f64) -> u64 {
    let base_minutes = f64::from(task.complexity) * 5.0;
    let blended_minutes = if agent_avg_duration_secs > 0.0 {
        (base_minutes + agent_avg_duration_secs / 60.0) / 2.0
    } else {
        base_minutes
    };
    let multiplier = match agent_type {
        AgentType::Architect => 1.3,
        AgentType::Engineer => 0.8,
    };
    (blended_minutes * multiplier * 60.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;

    fn task(complexity: u8) -> Task {
        Task::new("t1", "Implement feature", TaskType::Task).with_complexity(complexity)
    }

    #[tokio::test]
    async fn roster_init_cycles_engineer_qa_roles() {
        let pool = AgentPool::new(3);
        let roster = pool.roster.read().await;
        assert_eq!(roster.agents.len(), 4);
        assert_eq!(roster.agents[0].id, "architect");
        assert_eq!(roster.agents[1].role, AgentRole::Engineer);
        assert_eq!(roster.agents[2].role, AgentRole::Qa);
        assert_eq!(roster.agents[3].role, AgentRole::Engineer);
    }

    #[tokio::test]
    async fn assign_picks_lowest_load_engineer() {
        let pool = AgentPool::new(2);
        let assignment = pool
            .assign(&task(3), &DispatchContext::default(), &AssignOptions::default())
            .await
            .unwrap();
        assert_eq!(assignment.agent_id, "engineer-1");
    }

    #[tokio::test]
    async fn assign_falls_back_and_emits_event() {
        let pool = AgentPool::new(0);
        let mut rx = pool.subscribe();
        let assignment = pool
            .assign(
                &task(9),
                &DispatchContext::default(),
                &AssignOptions { force_type: Some(AgentType::Architect), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(assignment.agent_id, "architect");

        let second = pool.assign(&task(9), &DispatchContext::default(), &AssignOptions {
            force_type: Some(AgentType::Architect),
            ..Default::default()
        }).await;
        assert!(matches!(second, Err(PoolError::NoAgentAvailable)));
        let _ = rx.try_recv();
    }

    #[tokio::test]
    async fn recommend_prefers_architect_for_high_complexity_epic() {
        let pool = AgentPool::new(1);
        let epic = Task::new("t1", "Plan rollout", TaskType::Epic).with_complexity(9);
        assert_eq!(pool.recommend(&epic, &DispatchContext::default()).await, AgentType::Architect);
    }

    #[tokio::test]
    async fn recommend_prefers_engineer_once_promoted() {
        let pool = AgentPool::new(1);
        {
            let mut roster = pool.roster.write().await;
            let architect = find_agent_mut(&mut roster.agents, "architect").unwrap();
            architect.status = AgentStatus::Failed;
        }
        pool.promote_coordinator("architect unavailable").await.unwrap();
        let epic = Task::new("t1", "Plan rollout", TaskType::Epic).with_complexity(9);
        assert_eq!(pool.recommend(&epic, &DispatchContext::default()).await, AgentType::Engineer);
    }

    #[tokio::test]
    async fn promote_requires_architect_unavailable() {
        let pool = AgentPool::new(1);
        let result = pool.promote_coordinator("test").await;
        assert!(matches!(result, Err(PoolError::NotEligibleForPromotion)));
    }

    #[tokio::test]
    async fn complete_success_restores_idle_and_updates_average() {
        let pool = AgentPool::new(1);
        pool.assign(&task(3), &DispatchContext::default(), &AssignOptions::default())
            .await
            .unwrap();
        pool.complete("t1", true, 42.0, None).await.unwrap();
        let roster = pool.roster.read().await;
        let agent = roster.agents.iter().find(|a| a.id == "engineer-1").unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.completed_tasks, 1);
        assert_eq!(agent.avg_duration_secs, 42.0);
    }

    #[tokio::test]
    async fn complete_rate_limit_failure_applies_cooldown() {
        let pool = AgentPool::new(1);
        pool.assign(&task(3), &DispatchContext::default(), &AssignOptions::default())
            .await
            .unwrap();
        pool.complete(
            "t1",
            false,
            0.0,
            Some(CompletionMeta { failure_kind: Some(FailureKind::RateLimit), retry_after_secs: Some(90) }),
        )
        .await
        .unwrap();
        let roster = pool.roster.read().await;
        let agent = roster.agents.iter().find(|a| a.id == "engineer-1").unwrap();
        assert_eq!(agent.status, AgentStatus::Failed);
        assert!(agent.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn release_returns_agent_to_idle_without_counting_completion() {
        let pool = AgentPool::new(1);
        pool.assign(&task(3), &DispatchContext::default(), &AssignOptions::default())
            .await
            .unwrap();
        pool.release("t1").await.unwrap();
        let roster = pool.roster.read().await;
        let agent = roster.agents.iter().find(|a| a.id == "engineer-1").unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.completed_tasks, 0);
        assert_eq!(agent.failed_tasks, 0);
    }

    #[test]
    fn duration_estimate_applies_type_multiplier() {
        let t = task(4);
        let architect_secs = estimate_duration(&t, AgentType::Architect, 0.0);
        let engineer_secs = estimate_duration(&t, AgentType::Engineer, 0.0);
        assert_eq!(architect_secs, (20.0 * 1.3 * 60.0).round() as u64);
        assert_eq!(engineer_secs, (20.0 * 0.8 * 60.0).round() as u64);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::domain::TaskType;
    use proptest::prelude::*;
    use test_strategy::proptest;

    fn task(complexity: u8) -> Task {
        Task::new("t1", "Implement feature", TaskType::Task).with_complexity(complexity)
    }

    #[proptest]
    fn p1_routing_picks_minimum_completed_ties_broken_by_insertion_order(
        #[strategy(proptest::collection::vec((0u64..50, 0u32..20), 1..8))] specs: Vec<(u64, u32)>,
    ) {
        let now = Utc::now();
        let mut agents: Vec<Agent> = specs
            .iter()
            .enumerate()
            .map(|(i, &(completed, order))| {
                let mut agent = Agent::new(format!("e{i}"), AgentType::Engineer, AgentRole::Engineer, order);
                agent.completed_tasks = completed;
                agent
            })
            .collect();

        let picked = pick_lowest_load(&mut agents, AgentType::Engineer, now)
            .map(|a| (a.completed_tasks, a.insertion_order));
        let expected = specs.iter().copied().min();
        prop_assert_eq!(picked, expected);
    }

    #[proptest]
    fn p2_cooldown_exclusion_never_returns_an_agent_still_on_cooldown(
        #[strategy(proptest::collection::vec(-60i64..60, 1..8))] cooldown_offsets_secs: Vec<i64>,
    ) {
        let now = Utc::now();
        let mut agents: Vec<Agent> = cooldown_offsets_secs
            .iter()
            .enumerate()
            .map(|(i, &offset_secs)| {
                let mut agent = Agent::new(format!("e{i}"), AgentType::Engineer, AgentRole::Engineer, i as u32);
                agent.cooldown_until = Some(now + chrono::Duration::seconds(offset_secs));
                agent
            })
            .collect();

        let still_on_cooldown: std::collections::HashSet<String> = agents
            .iter()
            .filter(|a| a.cooldown_until.map(|until| until > now).unwrap_or(false))
            .map(|a| a.id.clone())
            .collect();

        if let Some(picked) = pick_lowest_load(&mut agents, AgentType::Engineer, now) {
            prop_assert!(!still_on_cooldown.contains(&picked.id));
        }
    }

    #[proptest]
    fn p3_coordinator_uniqueness_holds_across_a_random_promote_demote_sequence(
        #[strategy(proptest::collection::vec(proptest::bool::ANY, 1..12))] attempt_promote: Vec<bool>,
    ) {
        tokio_test::block_on(async {
            let pool = AgentPool::new(2);
            for do_promote in attempt_promote {
                {
                    let mut roster = pool.roster.write().await;
                    let architect = find_agent_mut(&mut roster.agents, "architect").unwrap();
                    if do_promote {
                        architect.status = AgentStatus::Failed;
                    } else {
                        architect.status = AgentStatus::Idle;
                        architect.cooldown_until = None;
                    }
                }
                if do_promote {
                    let _ = pool.promote_coordinator("fuzz").await;
                } else {
                    let _ = pool.demote_coordinator().await;
                }

                let roster = pool.roster.read().await;
                let architect_count = roster.agents.iter().filter(|a| a.role == AgentRole::Architect).count();
                assert_eq!(architect_count, 1, "exactly one agent must carry the architect role at all times");
            }
        });
    }

    #[proptest]
    fn p10_rate_limit_cooldown_applies_max_5_retry_after_seconds(
        #[strategy(0i64..10_000)] retry_after_secs: i64,
    ) {
        tokio_test::block_on(async {
            let pool = AgentPool::new(1);
            pool.assign(&task(3), &DispatchContext::default(), &AssignOptions::default())
                .await
                .unwrap();
            let before = Utc::now();
            pool.complete(
                "t1",
                false,
                0.0,
                Some(CompletionMeta { failure_kind: Some(FailureKind::RateLimit), retry_after_secs: Some(retry_after_secs) }),
            )
            .await
            .unwrap();

            let roster = pool.roster.read().await;
            let agent = roster.agents.iter().find(|a| a.id == "engineer-1").unwrap();
            assert_eq!(agent.status, AgentStatus::Failed);
            assert!(agent.current_task_id.is_none());
            assert!(!roster.assignments.contains_key("t1"));

            let expected_secs = retry_after_secs.max(5);
            let cooldown_until = agent.cooldown_until.expect("cooldown should be set after a rate-limited completion");
            let expected_at = before + chrono::Duration::seconds(expected_secs);
            let drift_ms = (cooldown_until - expected_at).num_milliseconds().abs();
            assert!(drift_ms < 2000, "cooldown_until drifted {drift_ms}ms from expected");
        });
    }
}
