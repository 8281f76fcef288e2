//! Error types for policy compilation and switch management.
//!
//! Malformed packets are deliberately not represented here: they are an
//! expected network condition handled inside the resolver (see
//! [`crate::packet::PacketError`]).

use sdn_types::ParseError;
use thiserror::Error;

use crate::flow::FlowRule;
use crate::role::SwitchId;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors raised by the topology loader, role resolver, compiler and
/// per-switch flow table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The connecting switch has no configured role.
    #[error("unknown switch: dpid {0}")]
    UnknownSwitch(SwitchId),

    /// A policy references a host absent from the topology.
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// Two host entries share a name.
    #[error("duplicate host name: {0}")]
    DuplicateHost(String),

    /// Two hosts share an IP address.
    #[error("duplicate host address {address} ({first} and {second})")]
    DuplicateAddress {
        address: String,
        first: String,
        second: String,
    },

    /// Two switch entries share a dpid.
    #[error("duplicate switch: dpid {0}")]
    DuplicateSwitch(SwitchId),

    /// Two hosts are assigned the same router port.
    #[error("router port {port} assigned to both {first} and {second}")]
    DuplicatePort {
        port: u16,
        first: String,
        second: String,
    },

    /// A rule overlaps an installed rule of equal priority with a
    /// different action.
    #[error("rule {rule} conflicts with installed rule {installed}")]
    ConflictingRule { rule: String, installed: String },

    /// The configuration is structurally invalid.
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// An address or prefix in the configuration failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl PolicyError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a conflicting rule error.
    pub fn conflicting_rule(rule: &FlowRule, installed: &FlowRule) -> Self {
        Self::ConflictingRule {
            rule: rule.to_string(),
            installed: installed.to_string(),
        }
    }
}
