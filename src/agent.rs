//! Wires the workers of one machine agent together and supervises them.

use crate::{
    config::AgentConfig,
    machiner::{start_machiner_with, MachineAccess},
    network::{InterfaceAddrs, SystemInterfaces},
};
use coord::{
    api::{Dispatcher, FacadeConfig, LeadershipFacade},
    client::LeadershipClient,
    start_leadership_worker, Error, LeadershipStatus, LeaseCoordinator, Result, Worker,
};
use futures::future::{join_all, select_all};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Why a running agent came to a halt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentExit {
    /// Shut down on request.
    Shutdown,
    /// The machine is gone; the agent must not be restarted.
    Terminate,
    /// A worker failed; the agent may be restarted.
    Failed { worker: String, error: Error },
}

pub struct Agent {
    workers: Vec<Worker>,
    leadership: HashMap<String, LeadershipStatus>,
}

impl Agent {
    /// Starts the machiner plus one leadership worker per hosted unit. Each
    /// unit talks to the coordinator through its own authenticated facade.
    pub fn start(
        config: &AgentConfig,
        coordinator: Arc<LeaseCoordinator>,
        machines: Arc<dyn MachineAccess>,
    ) -> Result<Self> {
        Self::start_with(config, coordinator, machines, Arc::new(SystemInterfaces))
    }

    /// Like [`Agent::start`], with the host addresses taken from `interfaces`.
    pub fn start_with(
        config: &AgentConfig,
        coordinator: Arc<LeaseCoordinator>,
        machines: Arc<dyn MachineAccess>,
        interfaces: Arc<dyn InterfaceAddrs>,
    ) -> Result<Self> {
        let mut workers = vec![start_machiner_with(machines, config.machine.clone(), interfaces)];
        let mut leadership = HashMap::new();

        for unit in &config.units {
            let facade = LeadershipFacade::new(
                coordinator.clone(),
                unit.clone(),
                FacadeConfig {
                    claim_duration: config.lease_duration,
                },
            );
            let client = LeadershipClient::new(Arc::new(Dispatcher::new(facade)), unit.clone());
            let (worker, status) =
                start_leadership_worker(Arc::new(client), unit.service(), unit.name(), config.leadership())?;
            workers.push(worker);
            leadership.insert(unit.name().to_string(), status);
        }

        info!(machine = config.machine.id(), workers = workers.len(), "agent started");
        Ok(Self { workers, leadership })
    }

    /// Leadership flag of a hosted unit.
    pub fn leadership(&self, unit: &str) -> Option<LeadershipStatus> {
        self.leadership.get(unit).cloned()
    }

    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.iter().map(Worker::name).collect()
    }

    /// Runs until `shutdown` resolves or the first worker stops, then stops
    /// every worker.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> AgentExit {
        let first = {
            let exits = select_all(self.workers.iter().map(|worker| Box::pin(worker.wait())));
            tokio::select! {
                () = shutdown => None,
                (result, index, _) = exits => Some((index, result)),
            }
        };
        if first.is_none() {
            info!("agent shutting down");
        }

        let results = join_all(self.workers.iter().map(|worker| worker.stop())).await;
        if results.iter().any(|result| result.as_ref().is_err_and(Error::is_terminate)) {
            warn!("agent terminating permanently");
            return AgentExit::Terminate;
        }

        match first {
            Some((index, Err(err))) => {
                let worker = self.workers[index].name().to_string();
                error!(%worker, error = %err, "agent stopped after worker failure");
                AgentExit::Failed { worker, error: err }
            }
            Some((index, Ok(()))) => {
                warn!(worker = self.workers[index].name(), "worker exited unexpectedly");
                AgentExit::Shutdown
            }
            None => AgentExit::Shutdown,
        }
    }
}
