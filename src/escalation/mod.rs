//! Blocker-Escalation Monitor: periodic scan over blocked
//! tasks, two-tier follow-up escalation.
//!
//! Grounded in this crate's `application/resource_monitor.rs` shutdown
//! shape: a `tokio::select!` loop over an interval tick and a shutdown
//! broadcast, `await`-ing any in-flight scan before returning.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;
use tracing::{info, warn};

use crate::domain::{Envelope, FleetEvent, TaskStatus, TaskType};
use crate::ports::{NewTask, TaskStore, TaskStoreError};

const L1_THRESHOLD: chrono::Duration = chrono::Duration::hours(4);
const L2_THRESHOLD: chrono::Duration = chrono::Duration::hours(24);

/// Bookkeeping for one task currently `blocked`.
#[derive(Debug, Clone)]
struct BlockerRecord {
    blocked_at: DateTime<Utc>,
    escalation_level: u8,
    last_escalated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct EscalationConfig {
    pub scan_interval: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self { scan_interval: Duration::from_secs(5 * 60) }
    }
}

pub struct EscalationMonitor {
    task_store: Arc<dyn TaskStore>,
    config: EscalationConfig,
    records: Mutex<HashMap<String, BlockerRecord>>,
    event_tx: broadcast::Sender<Envelope>,
    sequence: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl EscalationMonitor {
    pub fn new(task_store: Arc<dyn TaskStore>, config: EscalationConfig) -> Self {
        let (event_tx, _) = broadcast::channel(128);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            task_store,
            config,
            records: Mutex::new(HashMap::new()),
            event_tx,
            sequence: AtomicU64::new(0),
            shutdown_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: FleetEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let _ = self.event_tx.send(Envelope::new(seq, event));
    }

    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let scan_interval = self.config.scan_interval;

        tokio::spawn(async move {
            let mut ticker = interval(scan_interval);
            monitor.emit(FleetEvent::MonitoringStarted { monitor: "escalation".to_string() });
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = monitor.scan_once().await {
                            warn!(error = %err, "escalation scan failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        monitor.emit(FleetEvent::MonitoringStopped { monitor: "escalation".to_string() });
                        break;
                    }
                }
            }
        })
    }

    /// Graceful stop: cancel the interval, let any in-flight scan finish
    /// (handled by the `select!` arm above already owning the future to
    /// completion before the next tick).
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn scan_once(&self) -> Result<(), TaskStoreError> {
        let now = Utc::now();
        let blocked_tasks = self
            .task_store
            .get_tasks(crate::ports::TaskFilter { status: Some(TaskStatus::Blocked) })
            .await?;
        let blocked_ids: Vec<String> = blocked_tasks.iter().map(|t| t.id.clone()).collect();

        let mut records = self.records.lock().await;

        records.retain(|task_id, record| {
            let still_blocked = blocked_ids.contains(task_id);
            if !still_blocked {
                let cleared_after = now - record.blocked_at;
                info!(
                    task_id,
                    final_level = record.escalation_level,
                    blocked_for_secs = cleared_after.num_seconds(),
                    "blocker cleared"
                );
            }
            still_blocked
        });

        for task_id in &blocked_ids {
            records.entry(task_id.clone()).or_insert(BlockerRecord {
                blocked_at: now,
                escalation_level: 0,
                last_escalated_at: None,
            });
        }

        for task_id in &blocked_ids {
            let record = records.get_mut(task_id).expect("just inserted above");
            let blocked_for = now - record.blocked_at;

            if blocked_for >= L2_THRESHOLD && record.escalation_level < 2 {
                self.create_follow_up(task_id, 2, "Director", 10).await?;
                record.escalation_level = 2;
                record.last_escalated_at = Some(now);
            } else if blocked_for >= L1_THRESHOLD && record.escalation_level < 1 {
                self.create_follow_up(task_id, 1, "Atlas", 7).await?;
                record.escalation_level = 1;
                record.last_escalated_at = Some(now);
            }
        }

        Ok(())
    }

    async fn create_follow_up(
        &self,
        task_id: &str,
        level: u8,
        assignee: &str,
        complexity: u8,
    ) -> Result<(), TaskStoreError> {
        let follow_up_id = format!("BLOCKER-{task_id}-L{level}");
        let mut metadata = HashMap::new();
        metadata.insert("original_task_id".to_string(), serde_json::json!(task_id));
        metadata.insert("assignee".to_string(), serde_json::json!(assignee));
        metadata.insert("escalation_level".to_string(), serde_json::json!(level));

        self.task_store
            .create_task(NewTask {
                id: follow_up_id.clone(),
                title: format!("Escalation L{level}: {task_id} blocked"),
                description: format!("Task {task_id} has been blocked past the L{level} threshold."),
                task_type: TaskType::Task,
                complexity,
                dependencies: vec![],
                metadata,
            })
            .await?;

        warn!(task_id, follow_up_id, level, assignee, "escalated blocked task");
        self.emit(FleetEvent::EscalationTriggered {
            reason: format!("{task_id} blocked past L{level} threshold, assigned to {assignee}"),
        });
        Ok(())
    }
}
