use coord::test_utils::{wait_until, WORST_CASE};
use coord::Worker;
use fleet::machiner::{start_machiner_with, Life, MachineAccess, MachineRegistry, MachineStatus};
use fleet::network::{AddressScope, InterfaceAddr, MachineAddress};
use proto::MachineTag;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::time::timeout;

fn start_machiner(registry: Arc<MachineRegistry>, machine: MachineTag) -> Worker {
    let loopback = vec![InterfaceAddr::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST))];
    start_machiner_with(registry, machine, Arc::new(loopback))
}

fn registry_with(id: &str) -> (Arc<MachineRegistry>, MachineTag) {
    let registry = Arc::new(MachineRegistry::new());
    let machine = MachineTag::new(id).unwrap();
    registry.add_machine(&machine);
    (registry, machine)
}

#[tokio::test]
async fn test_unknown_machine_terminates() {
    let registry = Arc::new(MachineRegistry::new());
    let worker = start_machiner(registry, MachineTag::new("11").unwrap());

    let result = timeout(WORST_CASE, worker.wait()).await.unwrap();
    assert!(result.unwrap_err().is_terminate());
}

#[tokio::test]
async fn test_run_stop_leaves_machine_alive() {
    let (registry, machine) = registry_with("0");
    let worker = start_machiner(registry.clone(), machine.clone());

    assert_eq!(worker.stop().await, Ok(()));
    assert_eq!(registry.current_life(&machine).unwrap(), Life::Alive);
}

#[tokio::test]
async fn test_start_sets_status() {
    let (registry, machine) = registry_with("0");
    assert_eq!(registry.status(&machine).unwrap().status, MachineStatus::Pending);

    let worker = start_machiner(registry.clone(), machine.clone());
    wait_until("machine started", || {
        registry.status(&machine).unwrap().status == MachineStatus::Started
    })
    .await;
    assert_eq!(worker.stop().await, Ok(()));
}

#[tokio::test]
async fn test_dying_machine_is_stopped_and_made_dead() {
    let (registry, machine) = registry_with("0/lxc/1");
    let worker = start_machiner(registry.clone(), machine.clone());
    wait_until("machine started", || {
        registry.status(&machine).unwrap().status == MachineStatus::Started
    })
    .await;

    registry.destroy(&machine).unwrap();
    let result = timeout(WORST_CASE, worker.wait()).await.unwrap();

    assert!(result.unwrap_err().is_terminate());
    assert_eq!(registry.status(&machine).unwrap().status, MachineStatus::Stopped);
    assert_eq!(registry.life(&machine).await.unwrap(), Life::Dead);
}

#[tokio::test]
async fn test_removed_machine_terminates() {
    let (registry, machine) = registry_with("0");
    let worker = start_machiner(registry.clone(), machine.clone());
    wait_until("machine started", || {
        registry.status(&machine).unwrap().status == MachineStatus::Started
    })
    .await;

    registry.remove(&machine).unwrap();
    let result = timeout(WORST_CASE, worker.wait()).await.unwrap();
    assert!(result.unwrap_err().is_terminate());
}

#[tokio::test]
async fn test_machine_addresses_are_published() {
    let (registry, machine) = registry_with("0");
    let interfaces = vec![
        InterfaceAddr::Ip(IpAddr::V6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped())),
        InterfaceAddr::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        InterfaceAddr::Ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        InterfaceAddr::Other("@agent".to_string()),
        InterfaceAddr::Network {
            ip: "2001:db8::1".parse().unwrap(),
            prefix: 0,
        },
    ];
    let worker = start_machiner_with(registry.clone(), machine.clone(), Arc::new(interfaces));

    registry.destroy(&machine).unwrap();
    let result = timeout(WORST_CASE, worker.wait()).await.unwrap();
    assert!(result.unwrap_err().is_terminate());

    let address = |value: &str, scope| MachineAddress {
        value: value.parse().unwrap(),
        scope,
    };
    assert_eq!(
        registry.machine_addresses(&machine).unwrap(),
        vec![
            address("10.0.0.1", AddressScope::CloudLocal),
            address("127.0.0.1", AddressScope::MachineLocal),
            address("::1", AddressScope::MachineLocal),
            address("2001:db8::1", AddressScope::Unknown),
        ]
    );
}
