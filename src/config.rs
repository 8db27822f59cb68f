//! Agent configuration.
//!
//! Values come from `FLEET_*` environment variables, with command-line flags
//! taking precedence, and are validated before any worker starts.

use crate::cli::Cli;
use coord::LeadershipWorkerConfig;
use proto::{MachineTag, UnitTag};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LEASE_SECS: u64 = 60;
const DEFAULT_RETRY_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("machine id is required (--machine-id or FLEET_MACHINE_ID)")]
    MissingMachineId,

    #[error("invalid machine id {0:?}")]
    InvalidMachineId(String),

    #[error("invalid unit name {0:?}")]
    InvalidUnit(String),

    #[error("{0} must be positive")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub machine: MachineTag,
    pub units: Vec<UnitTag>,
    /// Lease length claimed for every hosted unit.
    pub lease_duration: Duration,
    pub retry_interval: Duration,
}

impl AgentConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let machine_id = cli
            .machine_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingMachineId)?;
        let machine =
            MachineTag::new(machine_id).map_err(|_| ConfigError::InvalidMachineId(machine_id.to_string()))?;

        let units = cli
            .units
            .iter()
            .map(|unit| unit.trim())
            .filter(|unit| !unit.is_empty())
            .map(|unit| UnitTag::new(unit).map_err(|_| ConfigError::InvalidUnit(unit.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let lease_secs = cli.lease_secs.unwrap_or(DEFAULT_LEASE_SECS);
        if lease_secs == 0 {
            return Err(ConfigError::ZeroDuration("lease duration"));
        }
        let retry_secs = cli.retry_secs.unwrap_or(DEFAULT_RETRY_SECS);
        if retry_secs == 0 {
            return Err(ConfigError::ZeroDuration("retry interval"));
        }

        Ok(Self {
            machine,
            units,
            lease_duration: Duration::from_secs(lease_secs),
            retry_interval: Duration::from_secs(retry_secs),
        })
    }

    pub fn leadership(&self) -> LeadershipWorkerConfig {
        LeadershipWorkerConfig {
            requested_duration: self.lease_duration,
            retry_interval: self.retry_interval,
        }
    }
}
