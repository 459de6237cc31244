//! Resource Supervisor: gates spawning, tracks live workers,
//! kills zombies.
//!
//! Grounded in this crate's `application/resource_monitor.rs`: an
//! `Arc<RwLock<_>>`-guarded table, a broadcast event channel, a
//! `tokio::time::interval` sweep loop selecting against a shutdown
//! broadcast. The table here tracks spawned worker *processes* rather
//! than CPU/memory samples; platform memory sampling lives in
//! [`memory`].

pub mod memory;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;
use tracing::{info, instrument, warn};

use crate::domain::{Envelope, FleetEvent};
use memory::sample_memory_usage;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor is shutting down")]
    ShuttingDown,
}

/// Static limits the supervisor enforces.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_concurrent: usize,
    pub max_memory_percent: f64,
    pub check_interval: Duration,
    pub process_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_memory_percent: 90.0,
            check_interval: Duration::from_secs(30),
            process_timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// A tracked worker process.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub pid: u32,
    pub task_id: String,
    pub provider: String,
    pub model: Option<String>,
    pub start_time: DateTime<Utc>,
}

struct Inner {
    records: Mutex<HashMap<u32, WorkerRecord>>,
    shutting_down: AtomicBool,
}

/// Tracks every spawned worker child, enforces concurrent-process and
/// memory ceilings, kills zombies.
pub struct ResourceSupervisor {
    config: SupervisorConfig,
    inner: Arc<Inner>,
    event_tx: broadcast::Sender<Envelope>,
    sequence: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl ResourceSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            inner: Arc::new(Inner {
                records: Mutex::new(HashMap::new()),
                shutting_down: AtomicBool::new(false),
            }),
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

    /// Whether another worker process may be spawned right now.
    pub async fn can_spawn(&self) -> bool {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        let count = self.inner.records.lock().await.len();
        if count >= self.config.max_concurrent {
            return false;
        }
        sample_memory_usage().used_percent <= self.config.max_memory_percent
    }

    /// Register a newly spawned worker. If the supervisor is shutting
    /// down, the record is killed immediately and never tracked.
    #[instrument(skip(self), fields(pid = record.pid, task_id = %record.task_id))]
    pub async fn register(&self, record: WorkerRecord) -> Result<(), SupervisorError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            kill_pid(record.pid, "shutting_down");
            return Err(SupervisorError::ShuttingDown);
        }
        let pid = record.pid;
        let task_id = record.task_id.clone();
        self.inner.records.lock().await.insert(pid, record);
        self.emit(FleetEvent::ProcessStarted { pid, task_id });
        Ok(())
    }

    /// Remove a live record and emit a completion event with elapsed
    /// time.
    pub async fn unregister(&self, pid: u32) -> Option<WorkerRecord> {
        let record = self.inner.records.lock().await.remove(&pid);
        if let Some(record) = &record {
            let elapsed = (Utc::now() - record.start_time).num_milliseconds() as f64 / 1000.0;
            self.emit(FleetEvent::ProcessCompleted { pid, elapsed_secs: elapsed });
        }
        record
    }

    /// Kill a tracked worker. A kill that raises is logged but does not
    /// prevent record removal.
    pub async fn kill(&self, pid: u32, reason: &str) {
        self.inner.records.lock().await.remove(&pid);
        kill_pid(pid, reason);
        self.emit(FleetEvent::ProcessKilled {
            pid,
            reason: reason.to_string(),
        });
    }

    /// Spawn the background sweep task. Any record older than
    /// `process_timeout` is killed with reason `timeout`.
    pub fn start_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let supervisor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let check_interval = self.config.check_interval;
        let process_timeout = self.config.process_timeout;

        tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            info!(
                check_interval_secs = check_interval.as_secs(),
                process_timeout_secs = process_timeout.as_secs(),
                "resource supervisor sweep started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        supervisor.sweep_once(process_timeout).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("resource supervisor sweep stopping");
                        break;
                    }
                }
            }
        })
    }

    async fn sweep_once(&self, process_timeout: Duration) {
        let now = Utc::now();
        let timed_out: Vec<u32> = {
            let records = self.inner.records.lock().await;
            records
                .values()
                .filter(|r| {
                    (now - r.start_time).num_milliseconds() as u64
                        > process_timeout.as_millis() as u64
                })
                .map(|r| r.pid)
                .collect()
        };
        if timed_out.is_empty() {
            return;
        }
        for pid in &timed_out {
            self.kill(*pid, "timeout").await;
        }
        warn!(count = timed_out.len(), "killed timed-out worker processes");
        self.emit(FleetEvent::ZombiesKilled { count: timed_out.len() });
    }

    /// Stop the sweep, kill every remaining record, clear the table.
    /// Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        let pids: Vec<u32> = self.inner.records.lock().await.keys().copied().collect();
        for pid in pids {
            self.kill(pid, "shutdown").await;
        }
    }

    pub async fn tracked_count(&self) -> usize {
        self.inner.records.lock().await.len()
    }
}

/// SIGTERM the worker's process group immediately, then SIGKILL it after a
/// 5s grace period if any member is still alive. Workers are spawned with
/// `process_group(0)` (see `crate::worker`), so the tracked pid is also
/// its group's pgid and `killpg` reaches forked grandchildren too.
fn kill_pid(pid: u32, reason: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let nix_pid = Pid::from_raw(pid as i32);
        if killpg(nix_pid, Signal::SIGTERM).is_err() {
            // Already gone; nothing further to do.
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            if kill(nix_pid, None).is_ok() {
                let _ = killpg(nix_pid, Signal::SIGKILL);
            }
        });
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
    tracing::debug!(pid, reason, "signaled worker process group");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32, task_id: &str, start_time: DateTime<Utc>) -> WorkerRecord {
        WorkerRecord {
            pid,
            task_id: task_id.to_string(),
            provider: "engineer".to_string(),
            model: None,
            start_time,
        }
    }

    #[tokio::test]
    async fn can_spawn_refuses_once_ceiling_reached() {
        let supervisor = ResourceSupervisor::new(SupervisorConfig {
            max_concurrent: 1,
            ..SupervisorConfig::default()
        });
        assert!(supervisor.can_spawn().await);
        supervisor
            .register(record(999_990, "t1", Utc::now()))
            .await
            .unwrap();
        assert!(!supervisor.can_spawn().await);
    }

    #[tokio::test]
    async fn unregister_removes_and_returns_record() {
        let supervisor = ResourceSupervisor::new(SupervisorConfig::default());
        supervisor
            .register(record(999_991, "t1", Utc::now()))
            .await
            .unwrap();
        assert_eq!(supervisor.tracked_count().await, 1);
        let removed = supervisor.unregister(999_991).await;
        assert!(removed.is_some());
        assert_eq!(supervisor.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_clears_table() {
        let supervisor = ResourceSupervisor::new(SupervisorConfig::default());
        supervisor
            .register(record(999_992, "t1", Utc::now()))
            .await
            .unwrap();
        supervisor.shutdown().await;
        supervisor.shutdown().await;
        assert_eq!(supervisor.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn register_after_shutdown_is_rejected() {
        let supervisor = ResourceSupervisor::new(SupervisorConfig::default());
        supervisor.shutdown().await;
        let result = supervisor.register(record(999_993, "t1", Utc::now())).await;
        assert!(matches!(result, Err(SupervisorError::ShuttingDown)));
    }

    #[tokio::test]
    async fn sweep_kills_processes_past_timeout() {
        let supervisor = Arc::new(ResourceSupervisor::new(SupervisorConfig {
            process_timeout: Duration::from_millis(10),
            ..SupervisorConfig::default()
        }));
        supervisor
            .register(record(999_994, "t1", Utc::now() - chrono::Duration::seconds(5)))
            .await
            .unwrap();
        supervisor.sweep_once(Duration::from_millis(10)).await;
        assert_eq!(supervisor.tracked_count().await, 0);
    }
}
