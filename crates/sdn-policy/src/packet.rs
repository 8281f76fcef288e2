//! Minimal frame codec for packet-in classification and packet-out
//! synthesis.
//!
//! Only the layers the controller inspects are decoded: the Ethernet II
//! header, ARP, and the fixed part of the IPv4 header. Anything else is
//! carried as [`Payload::Other`]. Only truncated frames and impossible
//! header fields are errors; unknown opcodes and address formats still
//! parse.

use std::fmt;

use sdn_types::{Ipv4Address, MacAddress};
use thiserror::Error;

use crate::flow::PacketHeaders;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

/// Ethernet II header length.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// ARP payload length for Ethernet/IPv4.
pub const ARP_PACKET_LEN: usize = 28;

/// ARP header fields preceding the addresses.
const ARP_FIXED_LEN: usize = 8;

/// Minimum IPv4 header length (no options).
pub const IPV4_MIN_HEADER_LEN: usize = 20;

const ARP_HTYPE_ETHERNET: u16 = 1;

/// A frame that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("{layer} truncated: need {needed} bytes, have {available}")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("invalid {layer}: {detail}")]
    Invalid { layer: &'static str, detail: String },
}

fn ensure_len(layer: &'static str, buf: &[u8], needed: usize) -> Result<(), PacketError> {
    if buf.len() < needed {
        return Err(PacketError::Truncated {
            layer,
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_mac(layer: &'static str, buf: &[u8], offset: usize) -> Result<MacAddress, PacketError> {
    buf.get(offset..)
        .and_then(MacAddress::from_slice)
        .ok_or(PacketError::Truncated {
            layer,
            needed: offset + MacAddress::LEN,
            available: buf.len(),
        })
}

fn read_ipv4(layer: &'static str, buf: &[u8], offset: usize) -> Result<Ipv4Address, PacketError> {
    buf.get(offset..)
        .and_then(Ipv4Address::from_slice)
        .ok_or(PacketError::Truncated {
            layer,
            needed: offset + Ipv4Address::LEN,
            available: buf.len(),
        })
}

/// Ethernet II header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ether_type: u16,
}

impl EthernetHeader {
    /// Parses the header and returns it with the remaining payload.
    pub fn parse(buf: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        ensure_len("ethernet header", buf, ETHERNET_HEADER_LEN)?;

        let header = Self {
            dst: read_mac("ethernet header", buf, 0)?,
            src: read_mac("ethernet header", buf, 6)?,
            ether_type: read_u16(buf, 12),
        };
        Ok((header, &buf[ETHERNET_HEADER_LEN..]))
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.dst.as_bytes());
        out.extend_from_slice(self.src.as_bytes());
        out.extend_from_slice(&self.ether_type.to_be_bytes());
    }
}

/// ARP operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArpOp {
    Request,
    Reply,
    /// RARP, InARP and anything else.
    Other(u16),
}

impl ArpOp {
    pub const fn code(self) -> u16 {
        match self {
            Self::Request => 1,
            Self::Reply => 2,
            Self::Other(code) => code,
        }
    }
}

impl From<u16> for ArpOp {
    fn from(code: u16) -> Self {
        match code {
            1 => Self::Request,
            2 => Self::Reply,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ArpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "REQUEST"),
            Self::Reply => write!(f, "REPLY"),
            Self::Other(code) => write!(f, "OP{}", code),
        }
    }
}

/// ARP payload for Ethernet hardware and IPv4 protocol addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub op: ArpOp,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Address,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Address,
}

impl ArpPacket {
    /// Parses an ARP payload.
    ///
    /// Frames for hardware or protocol types other than Ethernet/IPv4 are
    /// returned as [`Payload::ArpOther`].
    pub fn parse(buf: &[u8]) -> Result<Payload, PacketError> {
        ensure_len("arp", buf, ARP_FIXED_LEN)?;

        let htype = read_u16(buf, 0);
        let ptype = read_u16(buf, 2);
        let hlen = usize::from(buf[4]);
        let plen = usize::from(buf[5]);
        let op = ArpOp::from(read_u16(buf, 6));
        ensure_len("arp", buf, ARP_FIXED_LEN + 2 * (hlen + plen))?;

        if htype != ARP_HTYPE_ETHERNET || ptype != ETHERTYPE_IPV4 {
            return Ok(Payload::ArpOther { htype, ptype, op });
        }
        if hlen != MacAddress::LEN || plen != Ipv4Address::LEN {
            return Err(PacketError::Invalid {
                layer: "arp",
                detail: format!("hlen={} plen={} for ethernet/ipv4", hlen, plen),
            });
        }

        Ok(Payload::Arp(Self {
            op,
            sender_mac: read_mac("arp", buf, 8)?,
            sender_ip: read_ipv4("arp", buf, 14)?,
            target_mac: read_mac("arp", buf, 18)?,
            target_ip: read_ipv4("arp", buf, 24)?,
        }))
    }

    /// Builds a "who has `target_ip`" query.
    pub fn request(sender_mac: MacAddress, sender_ip: Ipv4Address, target_ip: Ipv4Address) -> Self {
        Self {
            op: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddress::ZERO,
            target_ip,
        }
    }

    /// Builds an answer claiming `sender_ip` is at `sender_mac`.
    pub fn reply(
        sender_mac: MacAddress,
        sender_ip: Ipv4Address,
        target_mac: MacAddress,
        target_ip: Ipv4Address,
    ) -> Self {
        Self {
            op: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// A request announcing the sender's own binding.
    pub fn is_gratuitous(&self) -> bool {
        self.sender_ip == self.target_ip
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
        out.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        out.push(MacAddress::LEN as u8);
        out.push(Ipv4Address::LEN as u8);
        out.extend_from_slice(&self.op.code().to_be_bytes());
        out.extend_from_slice(self.sender_mac.as_bytes());
        out.extend_from_slice(&self.sender_ip.octets());
        out.extend_from_slice(self.target_mac.as_bytes());
        out.extend_from_slice(&self.target_ip.octets());
    }

    /// Wraps this payload in an Ethernet frame.
    pub fn to_frame(&self, eth_src: MacAddress, eth_dst: MacAddress) -> Vec<u8> {
        let mut out = Vec::with_capacity(ETHERNET_HEADER_LEN + ARP_PACKET_LEN);
        EthernetHeader {
            dst: eth_dst,
            src: eth_src,
            ether_type: ETHERTYPE_ARP,
        }
        .write_to(&mut out);
        self.write_to(&mut out);
        out
    }
}

/// Fixed part of an IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub header_len: usize,
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Address,
    pub dst: Ipv4Address,
}

impl Ipv4Header {
    pub fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len("ipv4 header", buf, IPV4_MIN_HEADER_LEN)?;

        let version = buf[0] >> 4;
        if version != 4 {
            return Err(PacketError::Invalid {
                layer: "ipv4 header",
                detail: format!("version {}", version),
            });
        }

        let header_len = usize::from(buf[0] & 0x0f) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(PacketError::Invalid {
                layer: "ipv4 header",
                detail: format!("header length {}", header_len),
            });
        }
        ensure_len("ipv4 header", buf, header_len)?;

        Ok(Self {
            header_len,
            ttl: buf[8],
            protocol: buf[9],
            src: read_ipv4("ipv4 header", buf, 12)?,
            dst: read_ipv4("ipv4 header", buf, 16)?,
        })
    }
}

/// Decoded network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Arp(ArpPacket),
    /// ARP for non-Ethernet hardware or non-IPv4 protocol addresses.
    ArpOther { htype: u16, ptype: u16, op: ArpOp },
    Ipv4(Ipv4Header),
    /// Any ethertype the controller does not decode.
    Other { len: usize },
}

/// A frame received in a packet-in event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    pub ethernet: EthernetHeader,
    pub payload: Payload,
}

impl ParsedPacket {
    /// Decodes a raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] when a decoded layer is truncated or carries
    /// an impossible length or version.
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        let (ethernet, rest) = EthernetHeader::parse(data)?;

        let payload = match ethernet.ether_type {
            ETHERTYPE_ARP => ArpPacket::parse(rest)?,
            ETHERTYPE_IPV4 => Payload::Ipv4(Ipv4Header::parse(rest)?),
            _ => Payload::Other { len: rest.len() },
        };

        Ok(Self { ethernet, payload })
    }

    /// Returns the ARP payload if this frame carries one.
    pub fn arp(&self) -> Option<&ArpPacket> {
        match &self.payload {
            Payload::Arp(arp) => Some(arp),
            _ => None,
        }
    }

    /// Header fields as seen by a switch's match engine.
    pub fn headers(&self) -> PacketHeaders {
        match &self.payload {
            Payload::Ipv4(ip) => PacketHeaders {
                eth_type: self.ethernet.ether_type,
                ip_proto: Some(ip.protocol),
                ipv4_src: Some(ip.src),
                ipv4_dst: Some(ip.dst),
            },
            _ => PacketHeaders {
                eth_type: self.ethernet.ether_type,
                ..PacketHeaders::default()
            },
        }
    }
}

impl fmt::Display for ParsedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}>{} type=0x{:04x}]",
            self.ethernet.src, self.ethernet.dst, self.ethernet.ether_type
        )?;
        match &self.payload {
            Payload::Arp(arp) => write!(
                f,
                "[ARP {} hw:{} p:{}>{}]",
                arp.op, arp.sender_mac, arp.sender_ip, arp.target_ip
            ),
            Payload::ArpOther { htype, ptype, op } => write!(
                f,
                "[ARP {} htype={} ptype=0x{:04x}]",
                op, htype, ptype
            ),
            Payload::Ipv4(ip) => write!(
                f,
                "[IP+{} {}>{} ttl:{}]",
                ip.protocol, ip.src, ip.dst, ip.ttl
            ),
            Payload::Other { len } => write!(f, "[{} bytes]", len),
        }
    }
}
