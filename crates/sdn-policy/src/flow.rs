//! Flow rule model: priorities, match predicates and actions.
//!
//! A [`FlowRule`] is the unit handed to the southbound installer. The
//! switch evaluates every installed rule and applies the highest-priority
//! match; the priority bands below encode "block, else route, else flood"
//! without any negation inside a single match.

use std::fmt;

use sdn_types::{Ipv4Address, MacAddress};
use serde::Serialize;

use crate::packet::{ETHERTYPE_IPV4, IP_PROTO_ICMP};

/// OpenFlow-style rule priority (higher wins).
pub type Priority = u16;

/// Access-control rules.
pub const BLOCK_PRIORITY: Priority = 100;

/// Host-specific routing rules, static or learned.
pub const ROUTE_PRIORITY: Priority = 10;

/// Default flood rule.
pub const FLOOD_PRIORITY: Priority = 1;

/// Priority band a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Default,
    Route,
    Block,
}

impl Tier {
    /// Classifies a priority into its band.
    ///
    /// Anything at or above [`BLOCK_PRIORITY`] is block-tier, anything
    /// above [`FLOOD_PRIORITY`] is route-tier.
    pub fn of(priority: Priority) -> Self {
        if priority >= BLOCK_PRIORITY {
            Tier::Block
        } else if priority > FLOOD_PRIORITY {
            Tier::Route
        } else {
            Tier::Default
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Route => write!(f, "route"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// Header fields a switch can match on, extracted from one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeaders {
    pub eth_type: u16,
    pub ip_proto: Option<u8>,
    pub ipv4_src: Option<Ipv4Address>,
    pub ipv4_dst: Option<Ipv4Address>,
}

/// Conjunction over optional header fields. `None` is a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct FlowMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_src: Option<Ipv4Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<Ipv4Address>,
}

impl FlowMatch {
    /// Matches every frame.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches IPv4 frames.
    pub fn ipv4() -> Self {
        Self {
            eth_type: Some(ETHERTYPE_IPV4),
            ..Self::default()
        }
    }

    /// Matches ICMP over IPv4.
    pub fn icmp() -> Self {
        Self::ipv4().with_ip_proto(IP_PROTO_ICMP)
    }

    pub fn with_ip_proto(mut self, proto: u8) -> Self {
        self.ip_proto = Some(proto);
        self
    }

    pub fn with_src(mut self, addr: Ipv4Address) -> Self {
        self.ipv4_src = Some(addr);
        self
    }

    pub fn with_dst(mut self, addr: Ipv4Address) -> Self {
        self.ipv4_dst = Some(addr);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::any()
    }

    /// Returns true if some frame could match both predicates.
    pub fn overlaps(&self, other: &FlowMatch) -> bool {
        fn compatible<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            match (a, b) {
                (Some(x), Some(y)) => x == y,
                _ => true,
            }
        }

        compatible(&self.eth_type, &other.eth_type)
            && compatible(&self.ip_proto, &other.ip_proto)
            && compatible(&self.ipv4_src, &other.ipv4_src)
            && compatible(&self.ipv4_dst, &other.ipv4_dst)
    }

    /// Returns true if the frame satisfies every constrained field.
    pub fn matches(&self, headers: &PacketHeaders) -> bool {
        fn field<T: PartialEq>(want: &Option<T>, have: Option<&T>) -> bool {
            match want {
                None => true,
                Some(w) => have == Some(w),
            }
        }

        field(&self.eth_type, Some(&headers.eth_type))
            && field(&self.ip_proto, headers.ip_proto.as_ref())
            && field(&self.ipv4_src, headers.ipv4_src.as_ref())
            && field(&self.ipv4_dst, headers.ipv4_dst.as_ref())
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            return write!(f, "*");
        }

        let mut parts = Vec::with_capacity(4);
        if let Some(eth_type) = self.eth_type {
            parts.push(format!("dl_type=0x{:04x}", eth_type));
        }
        if let Some(proto) = self.ip_proto {
            parts.push(format!("nw_proto={}", proto));
        }
        if let Some(src) = self.ipv4_src {
            parts.push(format!("nw_src={}", src));
        }
        if let Some(dst) = self.ipv4_dst {
            parts.push(format!("nw_dst={}", dst));
        }
        write!(f, "{}", parts.join(","))
    }
}

/// What the switch does with a matching frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowAction {
    /// Forward out of one port.
    Output { port: u16 },
    /// Forward out of every port except the ingress port.
    Flood,
    /// Rewrite the destination hardware address, then forward.
    SetDstMacOutput { mac: MacAddress, port: u16 },
    /// No forwarding action attached; the switch discards the frame.
    Drop,
}

impl FlowAction {
    pub fn is_drop(&self) -> bool {
        matches!(self, FlowAction::Drop)
    }
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output { port } => write!(f, "output:{}", port),
            Self::Flood => write!(f, "flood"),
            Self::SetDstMacOutput { mac, port } => write!(f, "set_dl_dst:{},output:{}", mac, port),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// A (priority, match, action) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FlowRule {
    pub priority: Priority,
    #[serde(rename = "match")]
    pub pattern: FlowMatch,
    pub action: FlowAction,
}

impl FlowRule {
    pub fn new(priority: Priority, pattern: FlowMatch, action: FlowAction) -> Self {
        Self {
            priority,
            pattern,
            action,
        }
    }

    /// Block-tier rule with no forwarding action.
    pub fn block(pattern: FlowMatch) -> Self {
        Self::new(BLOCK_PRIORITY, pattern, FlowAction::Drop)
    }

    /// Route-tier rule forwarding out of `port`.
    pub fn route(pattern: FlowMatch, port: u16) -> Self {
        Self::new(ROUTE_PRIORITY, pattern, FlowAction::Output { port })
    }

    /// Default-tier wildcard flood rule.
    pub fn flood() -> Self {
        Self::new(FLOOD_PRIORITY, FlowMatch::any(), FlowAction::Flood)
    }

    pub fn tier(&self) -> Tier {
        Tier::of(self.priority)
    }

    /// Returns true if both rules share a priority and some frame could
    /// match both.
    pub fn contends_with(&self, other: &FlowRule) -> bool {
        self.priority == other.priority && self.pattern.overlaps(&other.pattern)
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "priority={} match={} actions={}",
            self.priority, self.pattern, self.action
        )
    }
}
