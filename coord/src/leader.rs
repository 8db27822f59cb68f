//! Leadership-aware worker.
//!
//! Keeps claiming a service's lease on a timer, renewing well before the
//! granted duration runs out, and publishes whether this unit is currently
//! leader. Any failed claim clears the flag before the handler returns.

use crate::{
    lease::LeaseCoordinator,
    watcher::NotifyWatcher,
    worker::{NotifyHandler, Worker},
    Error, Result,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(1);

/// Anything that can grant leadership leases: the coordinator itself, or a
/// remote client talking to it.
#[async_trait]
pub trait Claimer: Send + Sync {
    async fn claim_leadership(&self, service: &str, unit: &str, duration: Duration) -> Result<Duration>;

    async fn release_leadership(&self, service: &str, unit: &str) -> Result<()>;
}

#[async_trait]
impl Claimer for LeaseCoordinator {
    async fn claim_leadership(&self, service: &str, unit: &str, duration: Duration) -> Result<Duration> {
        LeaseCoordinator::claim_leadership(self, service, unit, duration).await
    }

    async fn release_leadership(&self, service: &str, unit: &str) -> Result<()> {
        LeaseCoordinator::release_leadership(self, service, unit).await
    }
}

#[derive(Debug, Clone)]
pub struct LeadershipWorkerConfig {
    /// Lease length asked for on every claim.
    pub requested_duration: Duration,
    /// How long to wait before claiming again after a refused claim.
    pub retry_interval: Duration,
}

impl Default for LeadershipWorkerConfig {
    fn default() -> Self {
        Self {
            requested_duration: Duration::from_secs(60),
            retry_interval: Duration::from_secs(5),
        }
    }
}

impl LeadershipWorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.requested_duration.is_zero() {
            return Err(Error::Invalid("requested lease duration must be positive".to_string()));
        }
        if self.retry_interval.is_zero() {
            return Err(Error::Invalid("claim retry interval must be positive".to_string()));
        }
        Ok(())
    }
}

/// Read side of a leadership worker's "is leader" flag.
#[derive(Debug, Clone)]
pub struct LeadershipStatus {
    rx: watch::Receiver<bool>,
}

impl LeadershipStatus {
    pub fn is_leader(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the flag equals `leader`. Returns `false` if the worker
    /// is gone before that happens.
    pub async fn wait_for(&mut self, leader: bool) -> bool {
        self.rx.wait_for(|current| *current == leader).await.is_ok()
    }
}

pub struct LeadershipTracker {
    claimer: Arc<dyn Claimer>,
    service: String,
    unit: String,
    config: LeadershipWorkerConfig,
    leader_tx: watch::Sender<bool>,
    next_claim: Duration,
}

impl LeadershipTracker {
    pub fn new(
        claimer: Arc<dyn Claimer>,
        service: impl Into<String>,
        unit: impl Into<String>,
        config: LeadershipWorkerConfig,
    ) -> Result<(Self, LeadershipStatus)> {
        config.validate()?;
        let (leader_tx, rx) = watch::channel(false);
        let next_claim = config.retry_interval;
        let tracker = Self {
            claimer,
            service: service.into(),
            unit: unit.into(),
            config,
            leader_tx,
            next_claim,
        };
        Ok((tracker, LeadershipStatus { rx }))
    }

    fn renew_interval(granted: Duration) -> Duration {
        (granted / 2).max(MIN_RENEW_INTERVAL)
    }
}

/// Starts a worker that keeps `unit` leader of `service` whenever it can.
pub fn start_leadership_worker(
    claimer: Arc<dyn Claimer>,
    service: &str,
    unit: &str,
    config: LeadershipWorkerConfig,
) -> Result<(Worker, LeadershipStatus)> {
    let (tracker, status) = LeadershipTracker::new(claimer, service, unit, config)?;
    let worker = Worker::start(format!("leadership:{service}:{unit}"), tracker);
    Ok((worker, status))
}

#[async_trait]
impl NotifyHandler for LeadershipTracker {
    async fn set_up(&mut self) -> Result<NotifyWatcher> {
        self.leader_tx.send_replace(false);
        Ok(NotifyWatcher::pending())
    }

    async fn handle(&mut self) -> Result<()> {
        let claimed = self
            .claimer
            .claim_leadership(&self.service, &self.unit, self.config.requested_duration)
            .await;

        match claimed {
            Ok(granted) => {
                self.next_claim = Self::renew_interval(granted);
                let was_leader = self.leader_tx.send_replace(true);
                if !was_leader {
                    info!(service = %self.service, unit = %self.unit, ?granted, "unit became leader");
                }
                Ok(())
            }
            Err(err) => {
                let was_leader = self.leader_tx.send_replace(false);
                self.next_claim = self.config.retry_interval;
                match err {
                    Error::LeaseHeld { holder, .. } => {
                        if was_leader {
                            warn!(service = %self.service, unit = %self.unit, %holder, "unit lost leadership");
                        } else {
                            debug!(service = %self.service, unit = %self.unit, %holder, "leadership held elsewhere");
                        }
                        Ok(())
                    }
                    err => {
                        if was_leader {
                            warn!(service = %self.service, unit = %self.unit, error = %err, "leadership could not be renewed");
                        }
                        Err(err.terminate_if_gone())
                    }
                }
            }
        }
    }

    async fn tear_down(&mut self) -> Result<()> {
        let was_leader = self.leader_tx.send_replace(false);
        if !was_leader {
            return Ok(());
        }
        match self.claimer.release_leadership(&self.service, &self.unit).await {
            Ok(()) | Err(Error::NotLeader { .. }) => {}
            Err(err) => {
                warn!(service = %self.service, unit = %self.unit, error = %err, "could not release leadership; it will expire");
            }
        }
        Ok(())
    }

    fn next_tick(&self) -> Option<Duration> {
        Some(self.next_claim)
    }
}
