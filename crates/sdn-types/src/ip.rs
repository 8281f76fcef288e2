//! IPv4 address and prefix types with safe parsing.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 protocol address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    /// Length of an IPv4 address on the wire.
    pub const LEN: usize = 4;

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }

    /// Reads an address from the first four bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.get(..Self::LEN)?.try_into().ok()?;
        Some(Ipv4Address(Ipv4Addr::from(raw)))
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }

    pub fn to_bits(&self) -> u32 {
        u32::from(self.0)
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        addr.0
    }
}

impl From<[u8; 4]> for Ipv4Address {
    fn from(octets: [u8; 4]) -> Self {
        Ipv4Address(Ipv4Addr::from(octets))
    }
}

/// An IPv4 subnet in CIDR notation (e.g. `10.0.1.0/24`).
///
/// The address is stored as written; host bits are ignored by
/// [`Ipv4Prefix::contains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Prefix {
    address: Ipv4Address,
    prefix_len: u8,
}

impl Ipv4Prefix {
    /// Creates a new prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length exceeds 32.
    pub fn new(address: Ipv4Address, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > 32 {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum 32",
                prefix_len
            )));
        }

        Ok(Ipv4Prefix {
            address,
            prefix_len,
        })
    }

    pub const fn address(&self) -> &Ipv4Address {
        &self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns the network mask as a 32-bit value.
    pub fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            len => u32::MAX << (32 - u32::from(len)),
        }
    }

    /// Returns true if `addr` falls inside this subnet.
    pub fn contains(&self, addr: &Ipv4Address) -> bool {
        (addr.to_bits() & self.mask()) == (self.address.to_bits() & self.mask())
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: Ipv4Address = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        Ipv4Prefix::new(address, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Prefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Prefix> for String {
    fn from(prefix: Ipv4Prefix) -> String {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ipv4_parse() {
        let addr: Ipv4Address = "172.16.10.100".parse().unwrap();
        assert_eq!(addr.octets(), [172, 16, 10, 100]);
        assert!("10.0.1".parse::<Ipv4Address>().is_err());
    }

    #[test]
    fn test_ipv4_from_slice() {
        let addr = Ipv4Address::from_slice(&[10, 0, 4, 10, 99]).unwrap();
        assert_eq!(addr, Ipv4Address::new(10, 0, 4, 10));
        assert!(Ipv4Address::from_slice(&[10, 0]).is_none());
    }

    #[test]
    fn test_prefix_parse() {
        let prefix: Ipv4Prefix = "10.0.1.0/24".parse().unwrap();
        assert_eq!(prefix.prefix_len(), 24);
        assert_eq!(prefix.address(), &Ipv4Address::new(10, 0, 1, 0));
        assert_eq!(prefix.to_string(), "10.0.1.0/24");
    }

    #[test]
    fn test_prefix_contains() {
        let prefix: Ipv4Prefix = "10.0.1.0/24".parse().unwrap();
        assert!(prefix.contains(&"10.0.1.10".parse().unwrap()));
        assert!(prefix.contains(&"10.0.1.1".parse().unwrap()));
        assert!(!prefix.contains(&"10.0.2.20".parse().unwrap()));

        let everything: Ipv4Prefix = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(&"172.16.10.100".parse().unwrap()));
    }

    #[test]
    fn test_prefix_host_bits_ignored() {
        let prefix: Ipv4Prefix = "10.0.1.10/24".parse().unwrap();
        assert_eq!(prefix.mask(), 0xffff_ff00);
        assert!(prefix.contains(&Ipv4Address::new(10, 0, 1, 200)));
    }

    #[test]
    fn test_invalid_prefix() {
        assert!("10.0.0.0/33".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.0".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0/24".parse::<Ipv4Prefix>().is_err());
    }
}
