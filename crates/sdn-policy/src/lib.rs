//! Policy core of the SDN controller.
//!
//! This crate decides which rules each switch receives and how table-miss
//! address requests are answered. It does not speak any control protocol:
//! the transport feeds it [`SwitchEvent`]s and receives directives through
//! a [`RuleInstaller`].
//!
//! # Flow
//!
//! ```text
//! ConnectionUp(dpid) -> RoleResolver -> PolicyCompiler -> RuleInstaller
//! PacketIn(frame)    -> ReactiveResolver -> RuleInstaller (rule + packet-out)
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sdn_policy::{Controller, RecordingInstaller, Topology, TopologyConfig};
//!
//! let topology = Arc::new(Topology::from_config(TopologyConfig::default()).unwrap());
//! let installer = RecordingInstaller::new();
//! let controller = Arc::new(Controller::new(topology, Arc::new(installer.clone())));
//!
//! let switch = controller.connection_up(21).unwrap();
//! assert_eq!(installer.rules_for(switch.dpid()).len(), 11);
//! ```

pub mod compiler;
pub mod controller;
pub mod error;
pub mod flow;
pub mod flow_table;
pub mod packet;
pub mod resolver;
pub mod role;
pub mod southbound;
pub mod topology;

pub use compiler::{check_stratification, PolicyCompiler};
pub use controller::{ConnectionState, Controller, PacketInOutcome, SwitchController};
pub use error::{PolicyError, PolicyResult};
pub use flow::{
    FlowAction, FlowMatch, FlowRule, PacketHeaders, Priority, Tier, BLOCK_PRIORITY,
    FLOOD_PRIORITY, ROUTE_PRIORITY,
};
pub use flow_table::{FlowTable, InstallOutcome};
pub use packet::{ArpOp, ArpPacket, PacketError, ParsedPacket, Payload};
pub use resolver::{AddressBinding, ReactiveResolver, Resolution, DEFAULT_PSEUDO_MAC};
pub use role::{Role, RoleResolver, SwitchId};
pub use southbound::{
    ConnectionId, Directive, PacketOut, RecordingInstaller, RuleInstaller, SwitchEvent,
};
pub use topology::{CoreRouterConfig, Host, HostConfig, SwitchConfig, Topology, TopologyConfig};
