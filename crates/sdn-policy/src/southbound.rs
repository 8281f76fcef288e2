//! Boundary with the switch transport.
//!
//! The transport delivers [`SwitchEvent`]s and accepts directives through a
//! [`RuleInstaller`]. Directives are fire-and-forget: the switch sends no
//! acknowledgement and nothing here retries.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::flow::FlowRule;
use crate::role::SwitchId;

/// Transport-assigned identifier of one switch connection.
pub type ConnectionId = u64;

/// Inbound notification from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchEvent {
    ConnectionUp {
        conn: ConnectionId,
        dpid: SwitchId,
    },
    /// A frame that matched no installed rule.
    PacketIn {
        conn: ConnectionId,
        data: Vec<u8>,
        in_port: u16,
    },
    ConnectionDown {
        conn: ConnectionId,
    },
}

impl SwitchEvent {
    pub fn conn(&self) -> ConnectionId {
        match self {
            Self::ConnectionUp { conn, .. }
            | Self::PacketIn { conn, .. }
            | Self::ConnectionDown { conn } => *conn,
        }
    }
}

/// A frame to emit on one switch port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketOut {
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
    pub out_port: u16,
}

impl PacketOut {
    pub fn new(data: Vec<u8>, out_port: u16) -> Self {
        Self { data, out_port }
    }
}

fn serialize_hex<S: serde::Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data))
}

/// Outbound directive, as recorded or logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    InstallRule { dpid: SwitchId, rule: FlowRule },
    PacketOut { dpid: SwitchId, packet: PacketOut },
}

impl Directive {
    pub fn dpid(&self) -> SwitchId {
        match self {
            Self::InstallRule { dpid, .. } | Self::PacketOut { dpid, .. } => *dpid,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstallRule { dpid, rule } => write!(f, "dpid={} install {}", dpid, rule),
            Self::PacketOut { dpid, packet } => write!(
                f,
                "dpid={} packet_out port={} len={}",
                dpid,
                packet.out_port,
                packet.data.len()
            ),
        }
    }
}

/// Pushes directives to switches.
///
/// Implementations must not block for long: they are called from the
/// connection's event handler.
pub trait RuleInstaller: Send + Sync {
    fn install_rule(&self, dpid: SwitchId, rule: &FlowRule);

    fn packet_out(&self, dpid: SwitchId, packet: &PacketOut);
}

/// Installer that keeps every directive in memory.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingInstaller {
    directives: Arc<Mutex<Vec<Directive>>>,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, directive: Directive) {
        self.directives
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(directive);
    }

    /// Snapshot of all directives so far.
    pub fn directives(&self) -> Vec<Directive> {
        self.directives
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Rules installed on one switch, in push order.
    pub fn rules_for(&self, dpid: SwitchId) -> Vec<FlowRule> {
        self.directives()
            .into_iter()
            .filter_map(|d| match d {
                Directive::InstallRule { dpid: d, rule } if d == dpid => Some(rule),
                _ => None,
            })
            .collect()
    }

    /// Packets emitted on one switch, in push order.
    pub fn packets_for(&self, dpid: SwitchId) -> Vec<PacketOut> {
        self.directives()
            .into_iter()
            .filter_map(|d| match d {
                Directive::PacketOut { dpid: d, packet } if d == dpid => Some(packet),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.directives
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RuleInstaller for RecordingInstaller {
    fn install_rule(&self, dpid: SwitchId, rule: &FlowRule) {
        self.push(Directive::InstallRule { dpid, rule: *rule });
    }

    fn packet_out(&self, dpid: SwitchId, packet: &PacketOut) {
        self.push(Directive::PacketOut {
            dpid,
            packet: packet.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_recording_installer_filters_by_switch() {
        let installer = RecordingInstaller::new();
        let shared = installer.clone();

        shared.install_rule(1, &FlowRule::flood());
        shared.packet_out(2, &PacketOut::new(vec![1, 2, 3], 3));

        assert_eq!(installer.len(), 2);
        assert_eq!(installer.rules_for(1), vec![FlowRule::flood()]);
        assert!(installer.rules_for(2).is_empty());
        assert_eq!(installer.packets_for(2)[0].out_port, 3);
    }

    #[test]
    fn test_directive_json() {
        let directive = Directive::PacketOut {
            dpid: 1,
            packet: PacketOut::new(vec![0x0a, 0xff], 3),
        };
        let json = serde_json::to_string(&directive).unwrap();
        assert_eq!(
            json,
            r#"{"directive":"packet_out","dpid":1,"packet":{"data":"0aff","out_port":3}}"#
        );
        assert_eq!(directive.to_string(), "dpid=1 packet_out port=3 len=2");
    }

    #[test]
    fn test_event_conn() {
        let event = SwitchEvent::PacketIn {
            conn: 7,
            data: Vec::new(),
            in_port: 1,
        };
        assert_eq!(event.conn(), 7);
    }
}
