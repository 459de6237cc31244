//! Engine configuration, grounded in this crate's
//! `infrastructure/config/loader.rs` hierarchical-merge pattern: defaults,
//! then a project YAML file, then environment variables, highest priority
//! last.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LogConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("engineer_count must be at least 1, got {0}")]
    InvalidEngineerCount(u32),
    #[error("rollback window_size must be at least 2, got {0}")]
    InvalidRollbackWindow(usize),
    #[error("error_rate_threshold must be in (0.0, 1.0], got {0}")]
    InvalidErrorRateThreshold(f64),
}

/// Resource Supervisor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub max_concurrent: u32,
    pub max_memory_percent: f64,
    #[serde(with = "humantime_secs")]
    pub process_timeout_secs: u64,
    #[serde(with = "humantime_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 6,
            max_memory_percent: 90.0,
            process_timeout_secs: 15 * 60,
            sweep_interval_secs: 60,
        }
    }
}

/// Agent Pool knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub engineer_count: u32,
    #[serde(with = "humantime_secs")]
    pub auto_reset_delay_secs: u64,
    /// Wall-clock ceiling on one worker execution call, independent of the
    /// Resource Supervisor's sweep.
    #[serde(with = "humantime_secs")]
    pub execution_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { engineer_count: 4, auto_reset_delay_secs: 30, execution_timeout_secs: 30 * 60 }
    }
}

/// Verifier / Integrity Checker knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    pub coverage_target: f64,
    pub touched_files_delta_target: f64,
    pub mutation_smoke_enabled: bool,
    #[serde(with = "humantime_secs")]
    pub gate_timeout_secs: u64,
    /// Shell command line for each of [`crate::verifier::GATE_ORDER`],
    /// keyed by gate name. A gate with no entry here is reported as
    /// `Unconfigured` by [`crate::ports::ShellToolRunner`] and treated as
    /// a pass.
    #[serde(default)]
    pub gate_commands: std::collections::HashMap<String, String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            coverage_target: 0.05,
            touched_files_delta_target: 0.05,
            mutation_smoke_enabled: false,
            gate_timeout_secs: 10 * 60,
            gate_commands: std::collections::HashMap::new(),
        }
    }
}

/// Blocker-Escalation Monitor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(with = "humantime_secs")]
    pub scan_interval_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self { scan_interval_secs: 5 * 60 }
    }
}

/// Rollback Monitor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackConfig {
    pub enabled: bool,
    #[serde(with = "humantime_secs")]
    pub grace_window_secs: u64,
    #[serde(with = "humantime_secs")]
    pub check_interval_secs: u64,
    pub window_size: usize,
    pub error_rate_threshold: f64,
    pub consecutive_failure_threshold: u32,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_window_secs: 10 * 60,
            check_interval_secs: 30,
            window_size: 5,
            error_rate_threshold: 0.2,
            consecutive_failure_threshold: 2,
        }
    }
}

/// Phase Ledger knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub path: std::path::PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { path: std::path::PathBuf::from(".fleet-dispatch/ledger.jsonl") }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub rollback: RollbackConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

impl EngineConfig {
    /// Load configuration, merging defaults, an optional project YAML
    /// file, and `FLEET_`-prefixed environment variables (highest
    /// priority), exactly like this crate's `ConfigLoader::load`.
    pub fn load(config_path: impl AsRef<std::path::Path>) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(config_path.as_ref()))
            .merge(Env::prefixed("FLEET_").split("__"))
            .extract()
            .context("failed to extract engine configuration from figment")?;
        validate(&config)?;
        Ok(config)
    }
}

impl From<&SupervisorConfig> for crate::supervisor::SupervisorConfig {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent as usize,
            max_memory_percent: config.max_memory_percent,
            check_interval: std::time::Duration::from_secs(config.sweep_interval_secs),
            process_timeout: std::time::Duration::from_secs(config.process_timeout_secs),
        }
    }
}

impl From<&EscalationConfig> for crate::escalation::EscalationConfig {
    fn from(config: &EscalationConfig) -> Self {
        Self { scan_interval: std::time::Duration::from_secs(config.scan_interval_secs) }
    }
}

impl From<&RollbackConfig> for crate::rollback::RollbackConfig {
    fn from(config: &RollbackConfig) -> Self {
        Self {
            enabled: config.enabled,
            grace_window: std::time::Duration::from_secs(config.grace_window_secs),
            check_interval: std::time::Duration::from_secs(config.check_interval_secs),
            window_size: config.window_size,
            error_rate_threshold: config.error_rate_threshold,
            consecutive_failure_threshold: config.consecutive_failure_threshold,
        }
    }
}

fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.pool.engineer_count == 0 {
        return Err(ConfigError::InvalidEngineerCount(config.pool.engineer_count));
    }
    if config.rollback.window_size < 2 {
        return Err(ConfigError::InvalidRollbackWindow(config.rollback.window_size));
    }
    if !(config.rollback.error_rate_threshold > 0.0 && config.rollback.error_rate_threshold <= 1.0) {
        return Err(ConfigError::InvalidErrorRateThreshold(config.rollback.error_rate_threshold));
    }
    Ok(())
}

/// Serialize `Duration`-shaped fields as plain seconds in YAML/env, since
/// figment's env provider doesn't parse nested duration structs.
mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        u64::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = EngineConfig::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn zero_engineers_is_rejected() {
        let mut config = EngineConfig::default();
        config.pool.engineer_count = 0;
        assert!(matches!(validate(&config), Err(ConfigError::InvalidEngineerCount(0))));
    }

    #[test]
    fn undersized_rollback_window_is_rejected() {
        let mut config = EngineConfig::default();
        config.rollback.window_size = 1;
        assert!(matches!(validate(&config), Err(ConfigError::InvalidRollbackWindow(1))));
    }

    #[test]
    fn rollback_config_converts_seconds_to_durations() {
        let config = EngineConfig::default();
        let runtime: crate::rollback::RollbackConfig = (&config.rollback).into();
        assert_eq!(runtime.grace_window, std::time::Duration::from_secs(config.rollback.grace_window_secs));
        assert_eq!(runtime.window_size, config.rollback.window_size);
    }
}
