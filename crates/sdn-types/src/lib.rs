//! Network primitives shared by the SDN controller crates.
//!
//! - [`MacAddress`]: 48-bit Ethernet hardware addresses
//! - [`Ipv4Address`]: IPv4 protocol addresses
//! - [`Ipv4Prefix`]: IPv4 subnets in CIDR notation
//!
//! All types parse from and display as their conventional text form and
//! serialize through serde as strings, so they can be used directly in
//! configuration files.

mod ip;
mod mac;

pub use ip::{Ipv4Address, Ipv4Prefix};
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),
}
