//! Leadership leases.
//!
//! For every service at most one unit holds an unexpired lease. Leases are
//! layered on top of a [`Storage`]: each service has one lease record and one
//! settings record, and every mutation of either happens inside that
//! service's critical section. Different services never contend.
//!
//! Expiry is evaluated lazily against the injected [`Clock`] whenever a
//! record is consulted; nothing sweeps expired leases in the background.

use crate::{
    storage::Storage,
    time::{Clock, Timestamp},
    watcher::{Notifier, NotifyWatcher},
    Error, Result,
};
use dashmap::DashMap;
use futures::future::join_all;
use proto::Settings;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const LEASE_PREFIX: &str = "leadership/lease/";
const SETTINGS_PREFIX: &str = "leadership/settings/";

pub const DEFAULT_MAX_LEASE_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceLeadershipLease {
    pub service: String,
    /// Empty when nobody holds the lease.
    pub holder: String,
    pub expiry: Timestamp,
}

impl ServiceLeadershipLease {
    pub fn is_held_at(&self, now: Timestamp) -> bool {
        !self.holder.is_empty() && now < self.expiry
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
struct LeadershipSettings {
    service: String,
    settings: Settings,
}

#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Upper bound on any single grant; longer requests are capped.
    pub max_duration: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            max_duration: DEFAULT_MAX_LEASE_DURATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub service: String,
    pub unit: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimResult {
    pub service: String,
    pub granted: Result<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub service: String,
    pub unit: String,
}

#[derive(Debug)]
pub struct LeaseCoordinator {
    config: LeaseConfig,
    clock: Arc<dyn Clock>,
    storage: Arc<dyn Storage>,
    sections: DashMap<String, Arc<Mutex<()>>>,
    settings_feeds: DashMap<String, Notifier>,
}

fn lease_key(service: &str) -> String {
    format!("{LEASE_PREFIX}{service}")
}

fn settings_key(service: &str) -> String {
    format!("{SETTINGS_PREFIX}{service}")
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Invalid(format!("{what} must not be empty")));
    }
    Ok(())
}

impl LeaseCoordinator {
    pub fn new(config: LeaseConfig, clock: Arc<dyn Clock>, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            clock,
            storage,
            sections: DashMap::new(),
            settings_feeds: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Runs `op` inside the service's critical section. The section entry is
    /// dropped again once nobody holds or waits for it.
    async fn in_section<T>(&self, service: &str, op: impl Future<Output = Result<T>>) -> Result<T> {
        let section = self.sections.entry(service.to_string()).or_default().clone();
        let result = {
            let _guard = section.lock().await;
            op.await
        };
        drop(section);
        self.sections
            .remove_if(service, |_, section| Arc::strong_count(section) == 1);
        result
    }

    async fn load_lease(&self, service: &str) -> Result<Option<ServiceLeadershipLease>> {
        match self.storage.get(&lease_key(service)).await? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn store_lease(&self, lease: &ServiceLeadershipLease) -> Result<()> {
        let bytes = bincode::serialize(lease)?;
        self.storage.put(&lease_key(&lease.service), bytes).await
    }

    async fn load_settings(&self, service: &str) -> Result<LeadershipSettings> {
        match self.storage.get(&settings_key(service)).await? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(LeadershipSettings {
                service: service.to_string(),
                settings: Settings::new(),
            }),
        }
    }

    /// Grants or renews leadership of `service` to `unit`.
    ///
    /// A renewal never moves the expiry earlier. Returns how long the caller
    /// may consider itself leader from now, which is capped by
    /// [`LeaseConfig::max_duration`] for fresh grants.
    pub async fn claim_leadership(&self, service: &str, unit: &str, requested: Duration) -> Result<Duration> {
        require(service, "service")?;
        require(unit, "unit")?;
        if requested.is_zero() {
            return Err(Error::Invalid("claim duration must be positive".to_string()));
        }
        let granted = requested.min(self.config.max_duration);
        if granted.is_zero() {
            return Err(Error::Invalid("maximum lease duration must be positive".to_string()));
        }

        self.in_section(service, async {
            let now = self.clock.now();
            let expiry = match self.load_lease(service).await? {
                Some(lease) if lease.is_held_at(now) && lease.holder != unit => {
                    debug!(service, unit, holder = %lease.holder, "leadership claim refused");
                    return Err(Error::LeaseHeld {
                        service: service.to_string(),
                        holder: lease.holder,
                    });
                }
                Some(lease) if lease.is_held_at(now) => {
                    let expiry = now.saturating_add(granted).max(lease.expiry);
                    debug!(service, unit, %expiry, "leadership renewed");
                    expiry
                }
                _ => {
                    let expiry = now.saturating_add(granted);
                    info!(service, unit, %expiry, "leadership granted");
                    expiry
                }
            };

            self.store_lease(&ServiceLeadershipLease {
                service: service.to_string(),
                holder: unit.to_string(),
                expiry,
            })
            .await?;
            Ok(expiry.saturating_duration_since(now))
        })
        .await
    }

    /// Gives up leadership held by `unit`.
    ///
    /// Only the unit named on the lease record may release it. Once the lease
    /// is released or has lapsed, releasing it again succeeds without effect.
    /// Every other unit, including one releasing a service that was never
    /// led, gets [`Error::NotLeader`].
    pub async fn release_leadership(&self, service: &str, unit: &str) -> Result<()> {
        require(service, "service")?;
        require(unit, "unit")?;

        self.in_section(service, async {
            let now = self.clock.now();
            match self.load_lease(service).await? {
                Some(lease) if lease.holder == unit => {
                    if lease.is_held_at(now) {
                        // Expiring the record keeps the holder for repeated releases.
                        self.store_lease(&ServiceLeadershipLease { expiry: now, ..lease })
                            .await?;
                        info!(service, unit, "leadership released");
                    } else {
                        debug!(service, unit, "release of lapsed lease ignored");
                    }
                    Ok(())
                }
                _ => Err(Error::NotLeader {
                    service: service.to_string(),
                    unit: unit.to_string(),
                }),
            }
        })
        .await
    }

    /// Runs every claim; each outcome is independent of the others.
    pub async fn claim_leadership_bulk(&self, claims: &[ClaimRequest]) -> Vec<ClaimResult> {
        join_all(claims.iter().map(|claim| async move {
            ClaimResult {
                service: claim.service.clone(),
                granted: self
                    .claim_leadership(&claim.service, &claim.unit, claim.duration)
                    .await,
            }
        }))
        .await
    }

    pub async fn release_leadership_bulk(&self, releases: &[ReleaseRequest]) -> Vec<Result<()>> {
        join_all(
            releases
                .iter()
                .map(|release| self.release_leadership(&release.service, &release.unit)),
        )
        .await
    }

    /// Current unexpired lease of `service`, if any.
    pub async fn leadership_holder(&self, service: &str) -> Result<Option<ServiceLeadershipLease>> {
        require(service, "service")?;
        let now = self.clock.now();
        Ok(self
            .load_lease(service)
            .await?
            .filter(|lease| lease.is_held_at(now)))
    }

    pub async fn leadership_settings(&self, service: &str) -> Result<Settings> {
        require(service, "service")?;
        Ok(self.load_settings(service).await?.settings)
    }

    /// Merges `updates` into the service's settings. Only the current holder
    /// may do this. An empty value deletes its key.
    pub async fn merge_leadership_settings(&self, service: &str, unit: &str, updates: &Settings) -> Result<()> {
        require(service, "service")?;
        require(unit, "unit")?;

        self.in_section(service, async {
            let now = self.clock.now();
            let is_holder = self
                .load_lease(service)
                .await?
                .is_some_and(|lease| lease.is_held_at(now) && lease.holder == unit);
            if !is_holder {
                return Err(Error::NotLeader {
                    service: service.to_string(),
                    unit: unit.to_string(),
                });
            }

            let mut record = self.load_settings(service).await?;
            for (key, value) in updates {
                if value.is_empty() {
                    record.settings.remove(key);
                } else {
                    record.settings.insert(key.clone(), value.clone());
                }
            }
            let bytes = bincode::serialize(&record)?;
            self.storage.put(&settings_key(service), bytes).await?;
            info!(service, unit, keys = updates.len(), "leadership settings merged");

            if let Some(feed) = self.settings_feeds.get(service) {
                feed.notify();
            }
            self.settings_feeds
                .remove_if(service, |_, feed| feed.watcher_count() == 0);
            Ok(())
        })
        .await
    }

    /// Fires after every committed merge of the service's settings.
    pub fn watch_leadership_settings(&self, service: &str) -> NotifyWatcher {
        self.settings_feeds
            .entry(service.to_string())
            .or_default()
            .subscribe()
    }

    /// Number of services with a live critical section or settings feed.
    pub fn tracked_services(&self) -> usize {
        self.sections.len() + self.settings_feeds.len()
    }
}
