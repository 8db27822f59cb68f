use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use coord::{storage::InMemoryStorage, time::SystemClock, LeaseConfig, LeaseCoordinator};
use fleet::{machiner::MachineRegistry, Agent, AgentConfig, AgentExit, Cli};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for ctrl-c; running until a worker stops");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = AgentConfig::from_cli(&cli).context("invalid configuration")?;

    // Single-process deployment: the agent hosts the machine records and
    // the lease coordinator itself.
    let machines = Arc::new(MachineRegistry::new());
    machines.add_machine(&config.machine);
    let coordinator = Arc::new(LeaseCoordinator::new(
        LeaseConfig {
            max_duration: config.lease_duration,
        },
        Arc::new(SystemClock::new()),
        Arc::new(InMemoryStorage::new()),
    ));

    let agent = Agent::start(&config, coordinator, machines).context("starting agent")?;
    match agent.run_until(shutdown_signal()).await {
        AgentExit::Shutdown => Ok(()),
        AgentExit::Terminate => {
            info!(machine = config.machine.id(), "machine is dead; agent will not restart");
            Ok(())
        }
        AgentExit::Failed { worker, error } => Err(anyhow!("worker {worker} failed: {error}")),
    }
}
