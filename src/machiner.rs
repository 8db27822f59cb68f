//! Machine agent's own lifecycle worker.
//!
//! Publishes the host's addresses and marks the agent's machine as started,
//! then watches it. Once the machine
//! is no longer alive it reports itself stopped, declares the machine dead
//! and ends with the terminate signal so the whole agent goes away.

use crate::network::{machine_addresses, InterfaceAddrs, MachineAddress, SystemInterfaces};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coord::{watcher::Notifier, Error, NotifyHandler, NotifyWatcher, Result, Worker};
use parking_lot::Mutex;
use proto::MachineTag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Life {
    Alive,
    Dying,
    Dead,
}

impl fmt::Display for Life {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Life::Alive => "alive",
            Life::Dying => "dying",
            Life::Dead => "dead",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineStatus {
    Pending,
    Started,
    Stopped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub status: MachineStatus,
    pub info: String,
    pub since: DateTime<Utc>,
}

/// What the machiner needs from the authoritative machine records.
#[async_trait]
pub trait MachineAccess: Send + Sync {
    async fn life(&self, machine: &MachineTag) -> Result<Life>;

    async fn set_status(&self, machine: &MachineTag, status: MachineStatus, info: &str) -> Result<()>;

    /// Replaces the addresses the machine's host reports for itself.
    async fn set_machine_addresses(&self, machine: &MachineTag, addresses: &[MachineAddress]) -> Result<()>;

    /// Moves the machine to `Dead`; a no-op if it already is.
    async fn ensure_dead(&self, machine: &MachineTag) -> Result<()>;

    /// Fires whenever the machine's life changes.
    async fn watch(&self, machine: &MachineTag) -> Result<NotifyWatcher>;
}

#[derive(Debug)]
struct MachineRecord {
    life: Life,
    status: StatusInfo,
    addresses: Vec<MachineAddress>,
}

/// In-process machine records.
#[derive(Debug, Default)]
pub struct MachineRegistry {
    machines: Mutex<HashMap<String, MachineRecord>>,
    notifiers: Mutex<HashMap<String, Notifier>>,
}

fn not_found(machine: &MachineTag) -> Error {
    Error::NotFound(format!("machine {}", machine.id()))
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn notifier(&self, id: &str) -> Notifier {
        self.notifiers.lock().entry(id.to_string()).or_default().clone()
    }

    /// Registers an alive machine with pending status. Re-adding an existing
    /// machine leaves it untouched.
    pub fn add_machine(&self, machine: &MachineTag) {
        self.machines
            .lock()
            .entry(machine.id().to_string())
            .or_insert_with(|| MachineRecord {
                life: Life::Alive,
                status: StatusInfo {
                    status: MachineStatus::Pending,
                    info: String::new(),
                    since: Utc::now(),
                },
                addresses: Vec::new(),
            });
    }

    /// Asks for the machine to go away: an alive machine becomes dying.
    pub fn destroy(&self, machine: &MachineTag) -> Result<()> {
        {
            let mut machines = self.machines.lock();
            let record = machines.get_mut(machine.id()).ok_or_else(|| not_found(machine))?;
            if record.life != Life::Alive {
                return Ok(());
            }
            record.life = Life::Dying;
        }
        info!(machine = machine.id(), "machine is dying");
        self.notifier(machine.id()).notify();
        Ok(())
    }

    /// Deletes the machine record outright.
    pub fn remove(&self, machine: &MachineTag) -> Result<()> {
        self.machines
            .lock()
            .remove(machine.id())
            .ok_or_else(|| not_found(machine))?;
        debug!(machine = machine.id(), "machine removed");
        self.notifier(machine.id()).notify();
        Ok(())
    }

    pub fn status(&self, machine: &MachineTag) -> Result<StatusInfo> {
        self.machines
            .lock()
            .get(machine.id())
            .map(|record| record.status.clone())
            .ok_or_else(|| not_found(machine))
    }

    pub fn machine_addresses(&self, machine: &MachineTag) -> Result<Vec<MachineAddress>> {
        self.machines
            .lock()
            .get(machine.id())
            .map(|record| record.addresses.clone())
            .ok_or_else(|| not_found(machine))
    }

    pub fn current_life(&self, machine: &MachineTag) -> Result<Life> {
        self.machines
            .lock()
            .get(machine.id())
            .map(|record| record.life)
            .ok_or_else(|| not_found(machine))
    }
}

#[async_trait]
impl MachineAccess for MachineRegistry {
    async fn life(&self, machine: &MachineTag) -> Result<Life> {
        self.current_life(machine)
    }

    async fn set_status(&self, machine: &MachineTag, status: MachineStatus, info: &str) -> Result<()> {
        let mut machines = self.machines.lock();
        let record = machines.get_mut(machine.id()).ok_or_else(|| not_found(machine))?;
        record.status = StatusInfo {
            status,
            info: info.to_string(),
            since: Utc::now(),
        };
        Ok(())
    }

    async fn set_machine_addresses(&self, machine: &MachineTag, addresses: &[MachineAddress]) -> Result<()> {
        let mut machines = self.machines.lock();
        let record = machines.get_mut(machine.id()).ok_or_else(|| not_found(machine))?;
        record.addresses = addresses.to_vec();
        Ok(())
    }

    async fn ensure_dead(&self, machine: &MachineTag) -> Result<()> {
        {
            let mut machines = self.machines.lock();
            let record = machines.get_mut(machine.id()).ok_or_else(|| not_found(machine))?;
            if record.life == Life::Dead {
                return Ok(());
            }
            record.life = Life::Dead;
        }
        self.notifier(machine.id()).notify();
        Ok(())
    }

    async fn watch(&self, machine: &MachineTag) -> Result<NotifyWatcher> {
        if !self.machines.lock().contains_key(machine.id()) {
            return Err(not_found(machine));
        }
        Ok(self.notifier(machine.id()).subscribe())
    }
}

pub struct Machiner {
    access: Arc<dyn MachineAccess>,
    machine: MachineTag,
    interfaces: Arc<dyn InterfaceAddrs>,
}

impl Machiner {
    pub fn new(access: Arc<dyn MachineAccess>, machine: MachineTag, interfaces: Arc<dyn InterfaceAddrs>) -> Self {
        Self {
            access,
            machine,
            interfaces,
        }
    }
}

/// Starts the machiner with the addresses the operating system reports.
pub fn start_machiner(access: Arc<dyn MachineAccess>, machine: MachineTag) -> Worker {
    start_machiner_with(access, machine, Arc::new(SystemInterfaces))
}

pub fn start_machiner_with(
    access: Arc<dyn MachineAccess>,
    machine: MachineTag,
    interfaces: Arc<dyn InterfaceAddrs>,
) -> Worker {
    let name = format!("machiner:{}", machine.id());
    Worker::start(name, Machiner::new(access, machine, interfaces))
}

#[async_trait]
impl NotifyHandler for Machiner {
    async fn set_up(&mut self) -> Result<NotifyWatcher> {
        // Fails fast on a machine that is gone or not ours.
        self.access
            .life(&self.machine)
            .await
            .map_err(Error::terminate_if_gone)?;

        let addresses = machine_addresses(self.interfaces.as_ref())
            .map_err(|err| Error::Other(format!("cannot read interface addresses: {err}")))?;
        debug!(machine = self.machine.id(), count = addresses.len(), "setting machine addresses");
        self.access
            .set_machine_addresses(&self.machine, &addresses)
            .await
            .map_err(Error::terminate_if_gone)?;

        self.access
            .set_status(&self.machine, MachineStatus::Started, "")
            .await
            .map_err(Error::terminate_if_gone)?;
        info!(machine = self.machine.id(), "machine started");
        self.access
            .watch(&self.machine)
            .await
            .map_err(Error::terminate_if_gone)
    }

    async fn handle(&mut self) -> Result<()> {
        let life = self
            .access
            .life(&self.machine)
            .await
            .map_err(Error::terminate_if_gone)?;
        if life == Life::Alive {
            return Ok(());
        }
        debug!(machine = self.machine.id(), %life, "machine is no longer alive");
        self.access
            .set_status(&self.machine, MachineStatus::Stopped, "")
            .await
            .map_err(Error::terminate_if_gone)?;
        self.access
            .ensure_dead(&self.machine)
            .await
            .map_err(Error::terminate_if_gone)?;
        info!(machine = self.machine.id(), "machine marked dead");
        Err(Error::Terminate(format!("machine {} is dead", self.machine.id())))
    }

    async fn tear_down(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_life_transitions() {
        let registry = MachineRegistry::new();
        let machine = MachineTag::new("0").unwrap();
        registry.add_machine(&machine);

        assert_eq!(registry.current_life(&machine).unwrap(), Life::Alive);
        assert_eq!(registry.status(&machine).unwrap().status, MachineStatus::Pending);
        assert!(registry.machine_addresses(&machine).unwrap().is_empty());

        registry.destroy(&machine).unwrap();
        assert_eq!(registry.current_life(&machine).unwrap(), Life::Dying);

        registry.ensure_dead(&machine).await.unwrap();
        registry.ensure_dead(&machine).await.unwrap();
        registry.destroy(&machine).unwrap();
        assert_eq!(registry.current_life(&machine).unwrap(), Life::Dead);
    }

    struct BrokenInterfaces;

    impl InterfaceAddrs for BrokenInterfaces {
        fn interface_addrs(&self) -> std::io::Result<Vec<crate::network::InterfaceAddr>> {
            Err(std::io::Error::other("netlink unavailable"))
        }
    }

    #[tokio::test]
    async fn test_unreadable_addresses_fail_set_up() {
        let registry = Arc::new(MachineRegistry::new());
        let machine = MachineTag::new("0").unwrap();
        registry.add_machine(&machine);

        let worker = start_machiner_with(registry.clone(), machine.clone(), Arc::new(BrokenInterfaces));
        let err = worker.wait().await.unwrap_err();
        assert!(!err.is_terminate());
        assert!(err.to_string().contains("netlink unavailable"));
        assert_eq!(registry.status(&machine).unwrap().status, MachineStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_machine_is_not_found() {
        let registry = MachineRegistry::new();
        let machine = MachineTag::new("42").unwrap();

        assert!(matches!(registry.life(&machine).await, Err(Error::NotFound(_))));
        assert!(matches!(registry.watch(&machine).await, Err(Error::NotFound(_))));
        assert!(matches!(registry.destroy(&machine), Err(Error::NotFound(_))));
        assert!(matches!(
            registry.set_machine_addresses(&machine, &[]).await,
            Err(Error::NotFound(_))
        ));
    }
}
