//! Static topology table: hosts, switch roles and the core router policy
//! parameters.
//!
//! The table is built once from a [`TopologyConfig`] and is read-only
//! afterwards; share it behind an `Arc` between connection handlers.

use std::collections::{BTreeMap, HashMap};

use sdn_types::{Ipv4Address, Ipv4Prefix};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};
use crate::role::{Role, RoleResolver, SwitchId};

/// One host entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub ip: Ipv4Address,
    /// Retained for future filtering; the current policies do not match on
    /// subnets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<Ipv4Prefix>,
}

impl HostConfig {
    pub fn new(name: &str, ip: Ipv4Address, subnet: Option<Ipv4Prefix>) -> Self {
        Self {
            name: name.to_string(),
            ip,
            subnet,
        }
    }
}

/// One switch entry as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub dpid: SwitchId,
    pub role: Role,
}

/// Parameters of the core router policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreRouterConfig {
    /// Host whose outbound traffic is restricted.
    #[serde(default = "default_untrusted")]
    pub untrusted: String,

    /// Host the untrusted host may never reach over any IP protocol.
    #[serde(default = "default_server")]
    pub server: String,

    /// Hosts the untrusted host may never ping.
    #[serde(default = "default_protected")]
    pub protected: Vec<String>,

    /// Router-local port for each routed host.
    #[serde(default = "default_ports")]
    pub ports: BTreeMap<String, u16>,
}

/// Complete topology configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostConfig>,

    #[serde(default = "default_switches")]
    pub switches: Vec<SwitchConfig>,

    #[serde(default)]
    pub core_router: CoreRouterConfig,
}

fn default_untrusted() -> String {
    "hnotrust".to_string()
}

fn default_server() -> String {
    "serv1".to_string()
}

fn default_protected() -> Vec<String> {
    ["h10", "h20", "h30", "serv1"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn default_ports() -> BTreeMap<String, u16> {
    [("h10", 1), ("h20", 2), ("h30", 3), ("serv1", 4), ("hnotrust", 5)]
        .iter()
        .map(|(name, port)| (name.to_string(), *port))
        .collect()
}

fn default_hosts() -> Vec<HostConfig> {
    let host = |name: &str, ip: [u8; 4], subnet: [u8; 4]| {
        let subnet = Ipv4Prefix::new(Ipv4Address::from(subnet), 24).ok();
        HostConfig::new(name, Ipv4Address::from(ip), subnet)
    };
    vec![
        host("h10", [10, 0, 1, 10], [10, 0, 1, 0]),
        host("h20", [10, 0, 2, 20], [10, 0, 2, 0]),
        host("h30", [10, 0, 3, 30], [10, 0, 3, 0]),
        host("serv1", [10, 0, 4, 10], [10, 0, 4, 0]),
        host("hnotrust", [172, 16, 10, 100], [172, 16, 10, 0]),
    ]
}

fn default_switches() -> Vec<SwitchConfig> {
    RoleResolver::default()
        .iter()
        .map(|(dpid, role)| SwitchConfig { dpid, role })
        .collect()
}

impl Default for CoreRouterConfig {
    fn default() -> Self {
        Self {
            untrusted: default_untrusted(),
            server: default_server(),
            protected: default_protected(),
            ports: default_ports(),
        }
    }
}

impl Default for TopologyConfig {
    /// The lab topology: four trusted hosts, one untrusted host, three edge
    /// switches, a core router and a datacenter router.
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            switches: default_switches(),
            core_router: CoreRouterConfig::default(),
        }
    }
}

/// A validated host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub ip: Ipv4Address,
    pub subnet: Option<Ipv4Prefix>,
}

/// Immutable, validated topology.
#[derive(Debug, Clone)]
pub struct Topology {
    hosts: BTreeMap<String, Host>,
    addresses: HashMap<Ipv4Address, String>,
    roles: RoleResolver,
    core_router: CoreRouterConfig,
}

impl Topology {
    /// Validates a configuration and builds the table.
    ///
    /// Host names, host addresses, dpids and router ports must be unique,
    /// and a host's subnet must contain its address. Policy references to
    /// hosts are checked by the compiler, so a dangling reference only
    /// affects the switches whose policy uses it.
    pub fn from_config(config: TopologyConfig) -> PolicyResult<Self> {
        let mut hosts = BTreeMap::new();
        let mut addresses: HashMap<Ipv4Address, String> = HashMap::new();

        for entry in config.hosts {
            if entry.name.is_empty() {
                return Err(PolicyError::invalid_config("hosts.name", "empty host name"));
            }
            if hosts.contains_key(&entry.name) {
                return Err(PolicyError::DuplicateHost(entry.name));
            }
            if let Some(first) = addresses.get(&entry.ip) {
                return Err(PolicyError::DuplicateAddress {
                    address: entry.ip.to_string(),
                    first: first.clone(),
                    second: entry.name,
                });
            }
            if let Some(subnet) = entry.subnet {
                if !subnet.contains(&entry.ip) {
                    return Err(PolicyError::invalid_config(
                        format!("hosts.{}.subnet", entry.name),
                        format!("{} is outside {}", entry.ip, subnet),
                    ));
                }
            }

            addresses.insert(entry.ip, entry.name.clone());
            hosts.insert(
                entry.name.clone(),
                Host {
                    name: entry.name,
                    ip: entry.ip,
                    subnet: entry.subnet,
                },
            );
        }

        let mut roles = BTreeMap::new();
        for switch in config.switches {
            if roles.insert(switch.dpid, switch.role).is_some() {
                return Err(PolicyError::DuplicateSwitch(switch.dpid));
            }
        }

        let mut port_owner: HashMap<u16, &str> = HashMap::new();
        for (name, port) in &config.core_router.ports {
            if *port == 0 {
                return Err(PolicyError::invalid_config(
                    format!("core_router.ports.{}", name),
                    "port 0 is not a valid switch port",
                ));
            }
            if let Some(first) = port_owner.insert(*port, name) {
                return Err(PolicyError::DuplicatePort {
                    port: *port,
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
        }

        debug!(
            hosts = hosts.len(),
            switches = roles.len(),
            "Topology loaded"
        );

        Ok(Self {
            hosts,
            addresses,
            roles: RoleResolver::new(roles),
            core_router: config.core_router,
        })
    }

    /// Looks up a host by name.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownHost`] if no such host is configured.
    pub fn host(&self, name: &str) -> PolicyResult<&Host> {
        self.hosts
            .get(name)
            .ok_or_else(|| PolicyError::UnknownHost(name.to_string()))
    }

    /// Returns true if the controller answers address queries for `ip`:
    /// either a configured host address or an address inside a host's
    /// subnet (such as the subnet gateway).
    pub fn answers_for(&self, ip: &Ipv4Address) -> bool {
        self.addresses.contains_key(ip)
            || self
                .hosts
                .values()
                .filter_map(|host| host.subnet)
                .any(|subnet| subnet.contains(ip))
    }

    /// Hosts in name order.
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn roles(&self) -> &RoleResolver {
        &self.roles
    }

    pub fn core_router(&self) -> &CoreRouterConfig {
        &self.core_router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lab() -> Topology {
        Topology::from_config(TopologyConfig::default()).unwrap()
    }

    #[test]
    fn test_default_topology() {
        let topology = lab();
        assert_eq!(topology.hosts().count(), 5);
        assert_eq!(topology.host("h10").unwrap().ip, Ipv4Address::new(10, 0, 1, 10));
        assert_eq!(
            topology.host("hnotrust").unwrap().ip,
            Ipv4Address::new(172, 16, 10, 100)
        );
        assert_eq!(
            topology.host("serv1").unwrap().subnet.unwrap().to_string(),
            "10.0.4.0/24"
        );
        assert_eq!(topology.roles().resolve(21).unwrap(), Role::CoreRouter);
        assert_eq!(topology.core_router().ports.len(), 5);
    }

    #[test]
    fn test_unknown_host() {
        let topology = lab();
        assert_eq!(
            topology.host("h40").unwrap_err(),
            PolicyError::UnknownHost("h40".to_string())
        );
    }

    #[test]
    fn test_answers_for() {
        let topology = lab();
        assert!(topology.answers_for(&Ipv4Address::new(10, 0, 4, 10)));
        // subnet gateway
        assert!(topology.answers_for(&Ipv4Address::new(10, 0, 1, 1)));
        assert!(!topology.answers_for(&Ipv4Address::new(192, 168, 0, 1)));
    }

    #[test]
    fn test_duplicate_host_name() {
        let mut config = TopologyConfig::default();
        config
            .hosts
            .push(HostConfig::new("h10", Ipv4Address::new(10, 0, 1, 11), None));
        assert_eq!(
            Topology::from_config(config).unwrap_err(),
            PolicyError::DuplicateHost("h10".to_string())
        );
    }

    #[test]
    fn test_duplicate_host_address() {
        let mut config = TopologyConfig::default();
        config
            .hosts
            .push(HostConfig::new("h11", Ipv4Address::new(10, 0, 1, 10), None));
        assert!(matches!(
            Topology::from_config(config),
            Err(PolicyError::DuplicateAddress { .. })
        ));
    }

    #[test]
    fn test_subnet_must_contain_host() {
        let mut config = TopologyConfig::default();
        config.hosts[0].subnet = Some("10.0.9.0/24".parse().unwrap());
        assert!(matches!(
            Topology::from_config(config),
            Err(PolicyError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_duplicate_port() {
        let mut config = TopologyConfig::default();
        config.core_router.ports.insert("h20".to_string(), 1);
        assert!(matches!(
            Topology::from_config(config),
            Err(PolicyError::DuplicatePort { port: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_switch() {
        let mut config = TopologyConfig::default();
        config.switches.push(SwitchConfig {
            dpid: 21,
            role: Role::EdgeSwitch,
        });
        assert_eq!(
            Topology::from_config(config).unwrap_err(),
            PolicyError::DuplicateSwitch(21)
        );
    }

    #[test]
    fn test_dangling_policy_reference_loads() {
        let mut config = TopologyConfig::default();
        config.core_router.protected.push("h40".to_string());
        assert!(Topology::from_config(config).is_ok());
    }
}
