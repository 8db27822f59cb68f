use coord::{
    storage::InMemoryStorage,
    test_utils::WORST_CASE,
    time::SystemClock,
    LeaseConfig, LeaseCoordinator,
};
use coord::Result;
use fleet::{
    machiner::{MachineAccess, MachineRegistry},
    network::InterfaceAddr,
    Agent, AgentConfig, AgentExit,
};
use proto::{MachineTag, UnitTag};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

fn config(machine: &str, units: &[&str]) -> AgentConfig {
    AgentConfig {
        machine: MachineTag::new(machine).unwrap(),
        units: units.iter().map(|unit| UnitTag::new(unit).unwrap()).collect(),
        lease_duration: Duration::from_secs(2),
        retry_interval: Duration::from_millis(20),
    }
}

fn start(config: &AgentConfig, coordinator: Arc<LeaseCoordinator>, machines: Arc<dyn MachineAccess>) -> Result<Agent> {
    let interfaces = vec![InterfaceAddr::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))];
    Agent::start_with(config, coordinator, machines, Arc::new(interfaces))
}

fn coordinator() -> Arc<LeaseCoordinator> {
    Arc::new(LeaseCoordinator::new(
        LeaseConfig {
            max_duration: Duration::from_secs(2),
        },
        Arc::new(SystemClock::new()),
        Arc::new(InMemoryStorage::new()),
    ))
}

#[tokio::test]
async fn test_units_lead_and_shutdown_releases() {
    let config = config("0", &["wordpress/0", "mysql/0"]);
    let machines = Arc::new(MachineRegistry::new());
    machines.add_machine(&config.machine);
    let coordinator = coordinator();

    let agent = start(&config, coordinator.clone(), machines).unwrap();
    assert_eq!(
        agent.worker_names(),
        vec!["machiner:0", "leadership:wordpress:wordpress/0", "leadership:mysql:mysql/0"]
    );
    let mut wordpress = agent.leadership("wordpress/0").unwrap();
    let mut mysql = agent.leadership("mysql/0").unwrap();
    assert!(agent.leadership("wordpress/1").is_none());

    assert!(timeout(WORST_CASE, wordpress.wait_for(true)).await.unwrap());
    assert!(timeout(WORST_CASE, mysql.wait_for(true)).await.unwrap());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(agent.run_until(async move {
        let _ = stop_rx.await;
    }));
    stop_tx.send(()).unwrap();

    assert_eq!(timeout(WORST_CASE, run).await.unwrap().unwrap(), AgentExit::Shutdown);
    assert!(!wordpress.is_leader());
    assert!(coordinator.leadership_holder("wordpress").await.unwrap().is_none());
    assert!(coordinator.leadership_holder("mysql").await.unwrap().is_none());
}

#[tokio::test]
async fn test_second_agent_waits_for_leadership() {
    let coordinator = coordinator();
    let machines = Arc::new(MachineRegistry::new());

    let first_config = config("0", &["wordpress/0"]);
    machines.add_machine(&first_config.machine);
    let first = start(&first_config, coordinator.clone(), machines.clone()).unwrap();
    let mut first_status = first.leadership("wordpress/0").unwrap();
    assert!(timeout(WORST_CASE, first_status.wait_for(true)).await.unwrap());

    let second_config = config("1", &["wordpress/1"]);
    machines.add_machine(&second_config.machine);
    let second = start(&second_config, coordinator.clone(), machines.clone()).unwrap();
    let mut second_status = second.leadership("wordpress/1").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!second_status.is_leader());

    assert_eq!(first.run_until(async {}).await, AgentExit::Shutdown);
    assert!(timeout(WORST_CASE, second_status.wait_for(true)).await.unwrap());
    assert_eq!(second.run_until(async {}).await, AgentExit::Shutdown);
}

#[tokio::test]
async fn test_dead_machine_terminates_agent() {
    let config = config("0", &["wordpress/0"]);
    let machines = Arc::new(MachineRegistry::new());
    machines.add_machine(&config.machine);
    let coordinator = coordinator();

    let agent = start(&config, coordinator.clone(), machines.clone()).unwrap();
    let mut status = agent.leadership("wordpress/0").unwrap();
    assert!(timeout(WORST_CASE, status.wait_for(true)).await.unwrap());

    machines.destroy(&config.machine).unwrap();
    let exit = timeout(WORST_CASE, agent.run_until(std::future::pending())).await.unwrap();

    assert_eq!(exit, AgentExit::Terminate);
    assert!(!status.is_leader());
    assert!(coordinator.leadership_holder("wordpress").await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_machine_terminates_agent() {
    let config = config("7", &[]);
    let agent = start(&config, coordinator(), Arc::new(MachineRegistry::new())).unwrap();

    let exit = timeout(WORST_CASE, agent.run_until(std::future::pending())).await.unwrap();
    assert_eq!(exit, AgentExit::Terminate);
}
