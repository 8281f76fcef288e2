//! Configuration file support for sdnctld
//!
//! Loads and validates the controller configuration from TOML files.
//! Default location: /etc/sdnctld/sdnctld.toml
//!
//! Every section is optional; missing sections fall back to the lab
//! topology.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use sdn_policy::{
    Controller, CoreRouterConfig, HostConfig, Priority, ReactiveResolver, RuleInstaller,
    SwitchConfig, Tier, Topology, TopologyConfig, DEFAULT_PSEUDO_MAC, ROUTE_PRIORITY,
};
use sdn_types::MacAddress;
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sdnctld/sdnctld.toml";

/// Controller behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Hardware address used as the source of synthesized ARP replies
    #[serde(default = "default_pseudo_mac")]
    pub pseudo_mac: MacAddress,

    /// Priority of learned return-path rules
    #[serde(default = "default_reactive_priority")]
    pub reactive_priority: Priority,

    /// Depth of each connection's event queue
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Complete sdnctld configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdnctlConfig {
    #[serde(default)]
    pub controller: ControllerSettings,

    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostConfig>,

    #[serde(default = "default_switches")]
    pub switches: Vec<SwitchConfig>,

    #[serde(default)]
    pub core_router: CoreRouterConfig,
}

// Default functions
fn default_pseudo_mac() -> MacAddress {
    DEFAULT_PSEUDO_MAC
}

fn default_reactive_priority() -> Priority {
    ROUTE_PRIORITY
}

fn default_channel_capacity() -> usize {
    256
}

fn default_hosts() -> Vec<HostConfig> {
    TopologyConfig::default().hosts
}

fn default_switches() -> Vec<SwitchConfig> {
    TopologyConfig::default().switches
}

// Default implementations
impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            pseudo_mac: default_pseudo_mac(),
            reactive_priority: default_reactive_priority(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for SdnctlConfig {
    fn default() -> Self {
        Self {
            controller: ControllerSettings::default(),
            hosts: default_hosts(),
            switches: default_switches(),
            core_router: CoreRouterConfig::default(),
        }
    }
}

impl SdnctlConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DaemonError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                DaemonError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(DaemonError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            DaemonError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }

    /// Validate controller settings
    ///
    /// Topology constraints are checked by [`SdnctlConfig::topology`].
    pub fn validate(&self) -> Result<()> {
        if self.controller.channel_capacity == 0 {
            return Err(DaemonError::Configuration(
                "channel_capacity must be > 0".to_string(),
            ));
        }

        if Tier::of(self.controller.reactive_priority) != Tier::Route {
            return Err(DaemonError::Configuration(format!(
                "reactive_priority {} must be between the flood and block priorities",
                self.controller.reactive_priority
            )));
        }

        if self.controller.pseudo_mac.is_zero() {
            return Err(DaemonError::Configuration(
                "pseudo_mac must not be all zeros".to_string(),
            ));
        }

        Ok(())
    }

    /// Topology section as understood by the policy library
    pub fn topology_config(&self) -> TopologyConfig {
        TopologyConfig {
            hosts: self.hosts.clone(),
            switches: self.switches.clone(),
            core_router: self.core_router.clone(),
        }
    }

    /// Build the validated topology table
    pub fn topology(&self) -> Result<Topology> {
        Ok(Topology::from_config(self.topology_config())?)
    }

    /// Build the shared controller state on top of an installer
    pub fn build_controller(&self, installer: Arc<dyn RuleInstaller>) -> Result<Arc<Controller>> {
        self.validate()?;
        let topology = Arc::new(self.topology()?);
        let resolver = ReactiveResolver::new(Arc::clone(&topology))
            .with_controller_mac(self.controller.pseudo_mac)
            .with_priority(self.controller.reactive_priority)?;

        Ok(Arc::new(
            Controller::new(topology, installer).with_resolver(resolver),
        ))
    }
}
