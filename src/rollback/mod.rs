//! Rollback Monitor: post-promotion health observer that
//! rolls back or trips the kill switch.
//!
//! Grounded in this crate's `application/resource_monitor.rs` polling
//! loop shape (reused already in `crate::escalation`) and in the
//! consecutive-failure/rolling-window pattern from
//! `infrastructure/mcp/health_monitor.rs` for the last-N-checks
//! decision window.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;
use tracing::{info, warn};

use crate::domain::{Envelope, FleetEvent};
use crate::ledger::{AppendMeta, LedgerError, PhaseLedger};
use crate::ports::{LiveFlags, WorkerHealth, WorkerManager};

/// Synthetic task id the monitor's actions are recorded against in the
/// Phase Ledger — there is no real task behind a rollback/escalation.
const AUDIT_TASK_ID: &str = "rollback-monitor";

#[derive(Debug, Clone)]
pub struct RollbackConfig {
    pub enabled: bool,
    pub grace_window: Duration,
    pub check_interval: Duration,
    pub window_size: usize,
    pub error_rate_threshold: f64,
    pub consecutive_failure_threshold: u32,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_window: Duration::from_secs(10 * 60),
            check_interval: Duration::from_secs(30),
            window_size: 5,
            error_rate_threshold: 0.2,
            consecutive_failure_threshold: 2,
        }
    }
}

/// One recorded health sample.
#[derive(Debug, Clone)]
struct HealthSample {
    error_rate: f64,
    had_failure: bool,
}

/// The monitor's decision for a given window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackDecision {
    Healthy,
    Degrade,
    Rollback,
    Escalate,
}

fn decide(window: &VecDeque<HealthSample>, config: &RollbackConfig) -> RollbackDecision {
    if window.len() < 2 {
        return RollbackDecision::Healthy;
    }

    let failures = window.iter().filter(|s| s.had_failure).count();
    let avg_error_rate: f64 = window.iter().map(|s| s.error_rate).sum::<f64>() / window.len() as f64;

    if avg_error_rate > config.error_rate_threshold && failures >= 3 {
        return RollbackDecision::Rollback;
    }

    let threshold = config.consecutive_failure_threshold as usize;
    if threshold > 0 && window.len() >= threshold && window.iter().rev().take(threshold).all(|s| s.had_failure) {
        return RollbackDecision::Escalate;
    }

    if failures > 0 || avg_error_rate > 0.05 {
        return RollbackDecision::Degrade;
    }

    RollbackDecision::Healthy
}

pub struct RollbackMonitor {
    worker_manager: Arc<dyn WorkerManager>,
    live_flags: Arc<dyn LiveFlags>,
    ledger: Arc<PhaseLedger>,
    config: RollbackConfig,
    window: Mutex<VecDeque<HealthSample>>,
    event_tx: broadcast::Sender<Envelope>,
    sequence: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl RollbackMonitor {
    pub fn new(
        worker_manager: Arc<dyn WorkerManager>,
        live_flags: Arc<dyn LiveFlags>,
        ledger: Arc<PhaseLedger>,
        config: RollbackConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(128);
        let (shutdown_tx, _) = broadcast::channel(1);
        let window_capacity = config.window_size.max(1);
        Self {
            worker_manager,
            live_flags,
            ledger,
            config,
            window: Mutex::new(VecDeque::with_capacity(window_capacity)),
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

    /// Begin monitoring after a fresh promotion. No-op (with a single info
    /// log) when the monitor is disabled wholesale.
    pub fn start(self: &Arc<Self>, previous_worker: String) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if !self.config.enabled {
            info!("rollback monitor disabled, skipping post-promotion observation");
            return tokio::spawn(async {});
        }

        tokio::spawn(async move {
            monitor.emit(FleetEvent::MonitoringStarted { monitor: "rollback".to_string() });
            let mut ticker = interval(monitor.config.check_interval);
            let deadline = tokio::time::Instant::now() + monitor.config.grace_window;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if tokio::time::Instant::now() >= deadline {
                            break;
                        }
                        match monitor.check_once(&previous_worker).await {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => warn!(error = %err, "rollback monitor check failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            monitor.emit(FleetEvent::MonitoringStopped { monitor: "rollback".to_string() });
        })
    }

    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Record one health sample and act on the resulting decision.
    /// Returns `true` when the monitor should stop (rollback/escalate
    /// dispatched).
    async fn check_once(&self, previous_worker: &str) -> Result<bool, LedgerError> {
        if !self.config.enabled {
            return Ok(true);
        }

        let health = self.worker_manager.health().await;
        let sample = sample_from_health(&health);
        self.emit(FleetEvent::HealthCheck { error_rate: sample.error_rate, failures: health.failure_count });

        let decision = {
            let mut window = self.window.lock().await;
            if window.len() == self.config.window_size {
                window.pop_front();
            }
            window.push_back(sample);
            decide(&window, &self.config)
        };

        match decision {
            RollbackDecision::Rollback => {
                self.rollback(previous_worker).await?;
                Ok(true)
            }
            RollbackDecision::Escalate => {
                self.escalate("consecutive health check failures").await?;
                Ok(true)
            }
            RollbackDecision::Degrade => {
                warn!("rollback monitor observed degraded health");
                Ok(false)
            }
            RollbackDecision::Healthy => Ok(false),
        }
    }

    async fn rollback(&self, previous_worker: &str) -> Result<(), LedgerError> {
        match self.worker_manager.switch_to_active(previous_worker).await {
            Ok(()) => {
                info!(previous_worker, "rolled back to previous worker");
                self.emit(FleetEvent::RollbackExecuted { reason: "health window breached rollback threshold".to_string() });
                self.ledger
                    .append_transition(AUDIT_TASK_ID, Some("active".to_string()), "rolled_back", vec![], true, Some(AppendMeta::default()))
                    .await?;
            }
            Err(err) => {
                warn!(error = %err, "rollback attempt failed");
                self.emit(FleetEvent::RollbackFailed { reason: err.to_string() });
            }
        }
        Ok(())
    }

    async fn escalate(&self, reason: &str) -> Result<(), LedgerError> {
        self.live_flags.activate_kill_switch().await;
        info!(reason, "rollback monitor activated kill switch");
        self.emit(FleetEvent::KillSwitchActivated { reason: reason.to_string() });
        self.emit(FleetEvent::EscalationTriggered { reason: reason.to_string() });
        self.ledger
            .append_transition(AUDIT_TASK_ID, Some("active".to_string()), "kill_switch_activated", vec![], true, Some(AppendMeta::default()))
            .await?;
        Ok(())
    }

    /// Clear the kill switch.
    pub async fn reset_kill_switch(&self) -> Result<(), LedgerError> {
        if !self.config.enabled {
            info!("rollback monitor disabled, reset_kill_switch is a no-op");
            return Ok(());
        }
        self.live_flags.reset_kill_switch().await;
        self.emit(FleetEvent::KillSwitchReset);
        self.ledger
            .append_transition(AUDIT_TASK_ID, Some("kill_switch_activated".to_string()), "kill_switch_reset", vec![], true, Some(AppendMeta::default()))
            .await?;
        Ok(())
    }
}

fn sample_from_health(health: &WorkerHealth) -> HealthSample {
    HealthSample {
        error_rate: health.error_rate.min(1.0),
        had_failure: health.failure_count > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(rates: &[f64]) -> VecDeque<HealthSample> {
        rates.iter().map(|&r| HealthSample { error_rate: r, had_failure: r > 0.0 }).collect()
    }

    #[test]
    fn fewer_than_two_checks_is_healthy() {
        let config = RollbackConfig::default();
        let window = window_of(&[0.3]);
        assert_eq!(decide(&window, &config), RollbackDecision::Healthy);
    }

    #[test]
    fn high_average_error_rate_with_enough_failures_rolls_back() {
        let config = RollbackConfig::default();
        let window = window_of(&[0.3, 0.25, 0.4, 0.35, 0.3]);
        assert_eq!(decide(&window, &config), RollbackDecision::Rollback);
    }

    #[test]
    fn two_consecutive_failures_escalate() {
        let config = RollbackConfig::default();
        let window = window_of(&[0.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(decide(&window, &config), RollbackDecision::Escalate);
    }

    #[test]
    fn single_failure_below_thresholds_degrades() {
        let config = RollbackConfig::default();
        let window = window_of(&[0.0, 0.3]);
        assert_eq!(decide(&window, &config), RollbackDecision::Degrade);
    }

    #[test]
    fn clean_window_is_healthy() {
        let config = RollbackConfig::default();
        let window = window_of(&[0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(decide(&window, &config), RollbackDecision::Healthy);
    }

    #[tokio::test]
    async fn disabled_monitor_makes_reset_a_no_op() {
        use crate::ports::{InMemoryLiveFlags, InMemoryWorkerManager};
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(PhaseLedger::open(dir.path().join("ledger.jsonl")).await.unwrap());
        let flags = Arc::new(InMemoryLiveFlags::default());
        let manager = Arc::new(InMemoryWorkerManager::new("worker-a"));
        let mut config = RollbackConfig::default();
        config.enabled = false;
        let monitor = RollbackMonitor::new(manager, flags.clone(), ledger, config);

        monitor.reset_kill_switch().await.unwrap();
        assert!(!flags.is_kill_switch_active().await);
    }

    #[tokio::test]
    async fn escalation_sets_kill_switch_and_records_ledger_entry() {
        use crate::ports::{InMemoryLiveFlags, InMemoryWorkerManager};
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(PhaseLedger::open(dir.path().join("ledger.jsonl")).await.unwrap());
        let flags = Arc::new(InMemoryLiveFlags::default());
        let manager = Arc::new(InMemoryWorkerManager::new("worker-a"));
        let monitor = RollbackMonitor::new(manager, flags.clone(), ledger.clone(), RollbackConfig::default());

        monitor.escalate("test escalation").await.unwrap();
        assert!(flags.is_kill_switch_active().await);
        let history = ledger.get_task_history(AUDIT_TASK_ID).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to_phase, "kill_switch_activated");
    }

    #[tokio::test]
    async fn rollback_switches_active_worker_and_records_ledger_entry() {
        use crate::ports::{InMemoryLiveFlags, InMemoryWorkerManager};
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(PhaseLedger::open(dir.path().join("ledger.jsonl")).await.unwrap());
        let flags = Arc::new(InMemoryLiveFlags::default());
        let manager = Arc::new(InMemoryWorkerManager::new("worker-b"));
        let monitor = RollbackMonitor::new(manager.clone(), flags, ledger.clone(), RollbackConfig::default());

        monitor.rollback("worker-a").await.unwrap();
        assert_eq!(manager.current().await, "worker-a");
        let history = ledger.get_task_history(AUDIT_TASK_ID).await.unwrap();
        assert_eq!(history[0].to_phase, "rolled_back");
    }
}
