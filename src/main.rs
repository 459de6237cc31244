//! Fleet Dispatch entry point.
//!
//! The task/roadmap store, the domain-expert review pipeline, and the
//! full task-management CLI are external collaborators this
//! binary doesn't provide; what's here is the minimum bootstrap that
//! wires the dispatch engine's components together and runs dispatch
//! ticks on an interval until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use fleet_dispatch::config::EngineConfig;
use fleet_dispatch::dispatcher::Dispatcher;
use fleet_dispatch::escalation::EscalationMonitor;
use fleet_dispatch::ledger::PhaseLedger;
use fleet_dispatch::logging;
use fleet_dispatch::pool::AgentPool;
use fleet_dispatch::ports::{InMemoryLiveFlags, InMemoryWorkerManager, ShellToolRunner};
use fleet_dispatch::readiness::ReadinessGate;
use fleet_dispatch::rollback::RollbackMonitor;
use fleet_dispatch::supervisor::ResourceSupervisor;
use fleet_dispatch::testutil::InMemoryTaskStore;
use fleet_dispatch::verifier::{IntegrityChecker, IntegrityConfig, Verifier};

#[derive(Parser, Debug)]
#[command(name = "fleet-dispatch", about = "Dispatch and supervision engine for a worker fleet")]
struct Args {
    /// Path to the engine's YAML configuration file. Missing keys fall
    /// back to built-in defaults; `FLEET_`-prefixed env vars win over
    /// both.
    #[arg(long, env = "FLEET_CONFIG", default_value = "fleet-dispatch.yaml")]
    config: PathBuf,

    /// Workspace root workers run in and required files are resolved
    /// against.
    #[arg(long, env = "FLEET_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Sandbox/permission mode passed through to the engineer worker
    /// command line.
    #[arg(long, env = "FLEET_SANDBOX_MODE", default_value = "workspace-write")]
    sandbox_mode: String,

    /// Interval between dispatch ticks.
    #[arg(long, default_value_t = 10)]
    tick_interval_secs: u64,

    /// Run a single dispatch tick and exit instead of looping.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = EngineConfig::load(&args.config).context("failed to load engine configuration")?;
    let _logger_guard = logging::init(&config.logging)?;

    info!(config_path = %args.config.display(), "fleet-dispatch starting");

    // No external roadmap store is wired in; this in-memory store keeps
    // the binary runnable standalone and is the extension point a real
    // deployment replaces with its own `TaskStore` implementation.
    let task_store = InMemoryTaskStore::empty();

    let pool = Arc::new(
        AgentPool::new(config.pool.engineer_count)
            .with_execution_timeout(Duration::from_secs(config.pool.execution_timeout_secs)),
    );
    let supervisor = Arc::new(ResourceSupervisor::new((&config.supervisor).into()));
    let sweep_handle = supervisor.start_sweep();
    let readiness = ReadinessGate::new(task_store.clone(), args.workspace.clone());

    let tool_runner = Arc::new(
        ShellToolRunner::new(config.verifier.gate_commands.clone(), Duration::from_secs(config.verifier.gate_timeout_secs))
            .with_working_dir(args.workspace.clone()),
    );
    let integrity = IntegrityChecker::new(IntegrityConfig {
        coverage_target: config.verifier.coverage_target,
        touched_files_delta_target: config.verifier.touched_files_delta_target,
        mutation_smoke_enabled: config.verifier.mutation_smoke_enabled,
    });
    let verifier = Verifier::new(tool_runner, integrity);

    let ledger = Arc::new(PhaseLedger::open(config.ledger.path.clone()).await.context("failed to open phase ledger")?);

    let dispatcher = Dispatcher::new(
        task_store.clone(),
        pool.clone(),
        supervisor.clone(),
        readiness,
        verifier,
        ledger.clone(),
        args.workspace.clone(),
        args.sandbox_mode.clone(),
    );

    let escalation = Arc::new(EscalationMonitor::new(task_store.clone(), (&config.escalation).into()));
    let escalation_handle = escalation.start();

    let worker_manager = Arc::new(InMemoryWorkerManager::new("architect"));
    let live_flags = Arc::new(InMemoryLiveFlags::default());
    let rollback = Arc::new(RollbackMonitor::new(worker_manager, live_flags, ledger.clone(), (&config.rollback).into()));
    let rollback_handle = rollback.start("architect".to_string());

    if args.once {
        let results = dispatcher.run_once().await;
        info!(ticks = results.len(), "dispatch tick completed");
    } else {
        run_loop(&dispatcher, args.tick_interval_secs).await;
    }

    escalation.stop().await;
    rollback.stop().await;
    supervisor.shutdown().await;
    let _ = escalation_handle.await;
    let _ = rollback_handle.await;
    let _ = sweep_handle.await;

    info!("fleet-dispatch shutting down");
    Ok(())
}

async fn run_loop(dispatcher: &Dispatcher, tick_interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(tick_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let results = dispatcher.run_once().await;
                if !results.is_empty() {
                    info!(ticks = results.len(), "dispatch tick completed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, shutting down");
                break;
            }
        }
    }
}
