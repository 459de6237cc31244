//! Live flags port: a key-value store for toggles like the
//! `DISABLE_NEW` kill switch.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait LiveFlags: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str);
    async fn clear(&self, key: &str);

    async fn is_kill_switch_active(&self) -> bool {
        self.get("DISABLE_NEW").await.as_deref() == Some("1")
    }

    async fn activate_kill_switch(&self) {
        self.set("DISABLE_NEW", "1").await;
    }

    async fn reset_kill_switch(&self) {
        self.clear("DISABLE_NEW").await;
    }
}

/// In-process live flags store. Suitable as the engine's default when no
/// external flag service is wired in (e.g. single-process deployments).
#[derive(Default)]
pub struct InMemoryLiveFlags {
    flags: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl LiveFlags for InMemoryLiveFlags {
    async fn get(&self, key: &str) -> Option<String> {
        self.flags.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) {
        self.flags.write().await.insert(key.to_string(), value.to_string());
    }

    async fn clear(&self, key: &str) {
        self.flags.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kill_switch_round_trips() {
        let flags = InMemoryLiveFlags::default();
        assert!(!flags.is_kill_switch_active().await);
        flags.activate_kill_switch().await;
        assert!(flags.is_kill_switch_active().await);
        flags.reset_kill_switch().await;
        assert!(!flags.is_kill_switch_active().await);
    }
}
