//! Worker manager port: the collaborator that actually knows
//! how to switch the fleet's active worker back to a previous one.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum WorkerManagerError {
    #[error("no previous worker recorded to roll back to")]
    NoPrevious,
    #[error("switch failed: {0}")]
    SwitchFailed(String),
}

/// Minimal contract the Rollback Monitor needs: query the active worker's
/// health and switch back to whichever worker preceded the current one.
#[async_trait]
pub trait WorkerManager: Send + Sync {
    async fn health(&self) -> WorkerHealth;
    async fn switch_to_active(&self, previous: &str) -> Result<(), WorkerManagerError>;
    async fn current(&self) -> String;
}

/// Health signal returned by the active worker's `health` RPC.
#[derive(Debug, Clone, Default)]
pub struct WorkerHealth {
    pub error_rate: f64,
    pub failure_count: u32,
    pub memory_mb: u64,
    pub uptime_secs: u64,
}

/// In-memory worker manager for tests and single-process deployments
/// without an external promotion service.
pub struct InMemoryWorkerManager {
    current: RwLock<String>,
    previous: RwLock<Option<String>>,
    health: RwLock<WorkerHealth>,
}

impl InMemoryWorkerManager {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(initial.into()),
            previous: RwLock::new(None),
            health: RwLock::new(WorkerHealth::default()),
        }
    }

    pub async fn promote(&self, new_active: impl Into<String>) {
        let mut current = self.current.write().await;
        let mut previous = self.previous.write().await;
        *previous = Some(current.clone());
        *current = new_active.into();
    }

    pub async fn set_health(&self, health: WorkerHealth) {
        *self.health.write().await = health;
    }
}

#[async_trait]
impl WorkerManager for InMemoryWorkerManager {
    async fn health(&self) -> WorkerHealth {
        self.health.read().await.clone()
    }

    async fn switch_to_active(&self, previous: &str) -> Result<(), WorkerManagerError> {
        let mut current = self.current.write().await;
        *current = previous.to_string();
        Ok(())
    }

    async fn current(&self) -> String {
        self.current.read().await.clone()
    }
}
