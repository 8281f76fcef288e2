//! Reactive address resolution for table-miss frames.
//!
//! When a host asks for the hardware address of an address the controller
//! answers for, the resolver claims that address with the controller's
//! pseudo hardware address and learns a return path to the requester.

use std::sync::Arc;

use sdn_types::{Ipv4Address, MacAddress};

use crate::error::{PolicyError, PolicyResult};
use crate::flow::{FlowAction, FlowMatch, FlowRule, Priority, Tier, ROUTE_PRIORITY};
use crate::packet::{ArpOp, ArpPacket, PacketError, ParsedPacket};
use crate::southbound::PacketOut;
use crate::topology::Topology;

/// Hardware address the controller answers with.
pub const DEFAULT_PSEUDO_MAC: MacAddress = MacAddress::new([0x01, 0x13, 0x15, 0x07, 0x21, 0x19]);

/// Requester identity extracted from one resolution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressBinding {
    pub hw_addr: MacAddress,
    pub proto_addr: Ipv4Address,
    pub in_port: u16,
}

impl AddressBinding {
    /// Rule delivering IPv4 traffic for the requester back out of the port
    /// the request arrived on.
    pub fn return_path(&self, priority: Priority) -> FlowRule {
        FlowRule::new(
            priority,
            FlowMatch::ipv4().with_dst(self.proto_addr),
            FlowAction::SetDstMacOutput {
                mac: self.hw_addr,
                port: self.in_port,
            },
        )
    }
}

/// What to do with one table-miss frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Install `rule`, then emit `packet_out`.
    Reply {
        binding: AddressBinding,
        rule: FlowRule,
        packet_out: PacketOut,
    },
    /// The frame could not be decoded.
    Malformed(PacketError),
    /// A well-formed frame the resolver does not act on.
    Unhandled(ParsedPacket),
}

#[derive(Debug, Clone)]
pub struct ReactiveResolver {
    topology: Arc<Topology>,
    controller_mac: MacAddress,
    priority: Priority,
}

impl ReactiveResolver {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self {
            topology,
            controller_mac: DEFAULT_PSEUDO_MAC,
            priority: ROUTE_PRIORITY,
        }
    }

    pub fn with_controller_mac(mut self, mac: MacAddress) -> Self {
        self.controller_mac = mac;
        self
    }

    /// Sets the priority of learned return paths.
    ///
    /// # Errors
    ///
    /// The priority must fall in the route tier, strictly between the flood
    /// and block priorities.
    pub fn with_priority(mut self, priority: Priority) -> PolicyResult<Self> {
        if Tier::of(priority) != Tier::Route {
            return Err(PolicyError::invalid_config(
                "controller.reactive_priority",
                format!("{} is outside the route tier", priority),
            ));
        }
        self.priority = priority;
        Ok(self)
    }

    pub fn controller_mac(&self) -> MacAddress {
        self.controller_mac
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Classifies a table-miss frame received on `in_port`.
    pub fn handle(&self, data: &[u8], in_port: u16) -> Resolution {
        let packet = match ParsedPacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => return Resolution::Malformed(e),
        };

        match packet.arp() {
            Some(request) if self.answers(request) => self.reply(request, in_port),
            _ => Resolution::Unhandled(packet),
        }
    }

    fn answers(&self, request: &ArpPacket) -> bool {
        request.op == ArpOp::Request
            && !request.is_gratuitous()
            && self.topology.answers_for(&request.target_ip)
    }

    fn reply(&self, request: &ArpPacket, in_port: u16) -> Resolution {
        let binding = AddressBinding {
            hw_addr: request.sender_mac,
            proto_addr: request.sender_ip,
            in_port,
        };

        let reply = ArpPacket::reply(
            self.controller_mac,
            request.target_ip,
            request.sender_mac,
            request.sender_ip,
        );

        Resolution::Reply {
            binding,
            rule: binding.return_path(self.priority),
            packet_out: PacketOut::new(
                reply.to_frame(self.controller_mac, request.sender_mac),
                in_port,
            ),
        }
    }
}
