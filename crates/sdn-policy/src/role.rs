//! Switch roles and the dpid → role resolver.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// Datapath identifier announced by a switch on connection-up.
pub type SwitchId = u64;

/// Behavioral category of a switch.
///
/// `EdgeSwitch` and `DatacenterRouter` currently compile to the same
/// policy; they remain separate variants so their policies can diverge
/// without changing the resolver contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    EdgeSwitch,
    CoreRouter,
    DatacenterRouter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EdgeSwitch => write!(f, "edge_switch"),
            Self::CoreRouter => write!(f, "core_router"),
            Self::DatacenterRouter => write!(f, "datacenter_router"),
        }
    }
}

impl FromStr for Role {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "edge_switch" | "edge" => Ok(Self::EdgeSwitch),
            "core_router" | "core" => Ok(Self::CoreRouter),
            "datacenter_router" | "datacenter" => Ok(Self::DatacenterRouter),
            _ => Err(PolicyError::invalid_config("role", format!("unknown role: {}", s))),
        }
    }
}

/// Pure lookup from dpid to [`Role`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleResolver {
    roles: BTreeMap<SwitchId, Role>,
}

impl RoleResolver {
    pub fn new(roles: BTreeMap<SwitchId, Role>) -> Self {
        Self { roles }
    }

    /// Resolves the role of a connecting switch.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownSwitch`] if the dpid is not configured.
    pub fn resolve(&self, dpid: SwitchId) -> PolicyResult<Role> {
        self.roles
            .get(&dpid)
            .copied()
            .ok_or(PolicyError::UnknownSwitch(dpid))
    }

    /// Iterates over configured switches in dpid order.
    pub fn iter(&self) -> impl Iterator<Item = (SwitchId, Role)> + '_ {
        self.roles.iter().map(|(dpid, role)| (*dpid, *role))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl Default for RoleResolver {
    /// The lab switch set: three edge switches, one core router and one
    /// datacenter router.
    fn default() -> Self {
        Self::new(BTreeMap::from([
            (1, Role::EdgeSwitch),
            (2, Role::EdgeSwitch),
            (3, Role::EdgeSwitch),
            (21, Role::CoreRouter),
            (31, Role::DatacenterRouter),
        ]))
    }
}
