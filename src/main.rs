//! # dispatchd — autonomous multi-agent orchestration control plane.
//!
//! Drives beads from open to closed state by binding ready work to
//! idle agents each dispatch cycle. See `SPEC_FULL.md` at the
//! workspace root for the full component contract.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use orchestrator::config::{Config, MaxHops};
use orchestrator::dispatcher::Dispatcher;
use orchestrator::events::EventBus;
use orchestrator::model::{Agent, Provider as ModelProvider, ProviderStatus};
use orchestrator::motivation::{IdleSystemMotivation, Motivation, MotivationEngine};
use orchestrator::readiness::AlwaysReady;
use orchestrator::store::{AgentRegistry, BeadStore, ProviderRegistry};
use orchestrator::worker::{EchoProvider, LocalWorkspace};
use orchestrator::workflow_engine::WorkflowEngine;

/// Autonomous multi-agent orchestration control plane: binds ready
/// beads to idle agents and drives their workflows to completion.
#[derive(Parser, Debug)]
#[command(name = "dispatchd")]
#[command(version)]
#[command(about = "Binds ready beads to idle agents and drives their workflows to completion")]
struct Cli {
    /// Path to the TOML configuration file. A missing file falls back
    /// to defaults rather than failing.
    #[arg(long, default_value = "dispatchd.toml")]
    config: PathBuf,

    /// Project id to dispatch for.
    #[arg(long, default_value = "default")]
    project: String,

    /// Root directory of the project's git checkout.
    #[arg(long, default_value = ".")]
    workspace_root: PathBuf,

    /// Run a single dispatch cycle and exit instead of looping on cadence.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Emit debug-level logs.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.config)?;
    config.validate().map_err(anyhow::Error::msg)?;

    let beads = BeadStore::new();
    let agents = AgentRegistry::new();
    let providers = ProviderRegistry::new();
    let workflows = WorkflowEngine::new();
    let events = EventBus::new();

    // A deterministic local default so the binary has something to
    // dispatch against without a configured LLM endpoint. Real
    // providers are registered the same way by deployment tooling.
    providers
        .register(ModelProvider::new("local-echo", "echo", "local://echo", "echo-1"))
        .await;
    providers
        .set_status("local-echo", ProviderStatus::Active)
        .await
        .context("activating the built-in echo provider")?;
    agents
        .register(Agent::new(
            "local-generalist",
            "Backend Engineer",
            "local-echo",
            cli.project.as_str(),
        ))
        .await;

    let max_hops = MaxHops::new(config.dispatch.max_hops);
    let dispatcher = Dispatcher::new(
        beads.clone(),
        agents,
        providers,
        workflows,
        events.clone(),
        Arc::new(AlwaysReady),
        config.dispatch.readiness_mode.into(),
        max_hops,
    );
    dispatcher
        .register_provider_client("local-echo", Arc::new(EchoProvider))
        .await;
    dispatcher
        .register_workspace(cli.project.clone(), Arc::new(LocalWorkspace::new(cli.workspace_root.clone())))
        .await;

    let mut motivations = MotivationEngine::new(beads.clone(), events.clone());
    motivations.register(Arc::new(IdleSystemMotivation {
        project_id: cli.project.clone(),
        store: beads.clone(),
    }) as Arc<dyn Motivation>);

    if cli.once {
        run_one_cycle(&motivations, &dispatcher, &cli.project).await;
        return Ok(());
    }

    let cadence = Duration::from_secs(config.dispatch.cadence_seconds);
    let mut ticker = tokio::time::interval(cadence);
    loop {
        ticker.tick().await;
        run_one_cycle(&motivations, &dispatcher, &cli.project).await;
    }
}

async fn run_one_cycle(motivations: &MotivationEngine, dispatcher: &Dispatcher, project: &str) {
    let created = motivations.tick().await;
    if !created.is_empty() {
        info!(count = created.len(), "motivation engine synthesized new beads");
    }
    match dispatcher.run_cycle(project).await {
        Ok(report) => info!(
            dispatched = report.dispatched.len(),
            escalated = report.escalated.len(),
            closed = report.closed.len(),
            applied_fixes = report.applied_fixes.len(),
            parked = report.parked,
            "dispatch cycle finished"
        ),
        Err(e) => warn!(error = %e, "dispatch cycle failed"),
    }
}

fn load_config(path: &PathBuf) -> Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Config::from_toml(&raw).context("parsing config file"),
        Err(_) => {
            info!(path = %path.display(), "no config file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
