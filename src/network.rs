//! Host addresses as published on the machine record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Where an address can be reached from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressScope {
    Unknown,
    Public,
    CloudLocal,
    MachineLocal,
    LinkLocal,
}

impl AddressScope {
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(ip) => Self::of_v4(ip),
            IpAddr::V6(ip) => Self::of_v6(ip),
        }
    }

    fn of_v4(ip: Ipv4Addr) -> Self {
        if ip.is_loopback() {
            AddressScope::MachineLocal
        } else if ip.is_link_local() {
            AddressScope::LinkLocal
        } else if ip.is_private() {
            AddressScope::CloudLocal
        } else {
            AddressScope::Public
        }
    }

    fn of_v6(ip: Ipv6Addr) -> Self {
        if let Some(v4) = ip.to_ipv4_mapped() {
            return Self::of_v4(v4);
        }
        if ip.is_loopback() {
            AddressScope::MachineLocal
        } else if ip.segments()[0] & 0xffc0 == 0xfe80 {
            AddressScope::LinkLocal
        } else {
            AddressScope::Unknown
        }
    }
}

impl fmt::Display for AddressScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressScope::Unknown => "unknown",
            AddressScope::Public => "public",
            AddressScope::CloudLocal => "local-cloud",
            AddressScope::MachineLocal => "local-machine",
            AddressScope::LinkLocal => "link-local",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineAddress {
    pub value: IpAddr,
    pub scope: AddressScope,
}

impl MachineAddress {
    /// IPv4-mapped IPv6 addresses are stored as plain IPv4.
    pub fn new(value: IpAddr) -> Self {
        let value = value.to_canonical();
        Self {
            value,
            scope: AddressScope::of(value),
        }
    }
}

impl fmt::Display for MachineAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value, self.scope)
    }
}

/// One address bound to a host interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceAddr {
    Ip(IpAddr),
    Network { ip: IpAddr, prefix: u8 },
    /// Anything that is not IP, such as a unix socket path.
    Other(String),
}

impl InterfaceAddr {
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            InterfaceAddr::Ip(ip) | InterfaceAddr::Network { ip, .. } => Some(*ip),
            InterfaceAddr::Other(_) => None,
        }
    }
}

/// Source of the host's interface addresses.
pub trait InterfaceAddrs: Send + Sync {
    fn interface_addrs(&self) -> io::Result<Vec<InterfaceAddr>>;
}

/// Fixed address list, for hosts whose addresses are known up front.
impl InterfaceAddrs for Vec<InterfaceAddr> {
    fn interface_addrs(&self) -> io::Result<Vec<InterfaceAddr>> {
        Ok(self.clone())
    }
}

/// The addresses the operating system reports right now.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceAddrs for SystemInterfaces {
    fn interface_addrs(&self) -> io::Result<Vec<InterfaceAddr>> {
        let interfaces = if_addrs::get_if_addrs()?;
        Ok(interfaces.iter().map(|iface| InterfaceAddr::Ip(iface.ip())).collect())
    }
}

/// IP addresses of `source` in reported order, each with its scope.
/// Non-IP entries are dropped.
pub fn machine_addresses(source: &dyn InterfaceAddrs) -> io::Result<Vec<MachineAddress>> {
    let addrs = source.interface_addrs()?;
    Ok(addrs
        .iter()
        .filter_map(InterfaceAddr::ip)
        .map(MachineAddress::new)
        .collect())
}
