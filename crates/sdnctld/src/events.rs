//! JSON-lines transport event stream.
//!
//! Each non-empty line is one event object tagged by `event`:
//!
//! ```text
//! {"event":"connection_up","conn":1,"dpid":21}
//! {"event":"packet_in","conn":1,"in_port":3,"data":"ffffffffffff..."}
//! {"event":"arp_request","conn":1,"in_port":3,"sender_mac":"00:00:00:00:01:0a","sender_ip":"10.0.1.10","target_ip":"10.0.4.10"}
//! {"event":"connection_down","conn":1}
//! ```
//!
//! `arp_request` is shorthand for a packet-in carrying a broadcast ARP
//! request. Lines starting with `#` are comments.

use sdn_policy::{ArpPacket, ConnectionId, SwitchEvent, SwitchId};
use sdn_types::{Ipv4Address, MacAddress};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{DaemonError, Result};

/// One line of an event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventRecord {
    ConnectionUp {
        conn: ConnectionId,
        dpid: SwitchId,
    },
    PacketIn {
        conn: ConnectionId,
        in_port: u16,
        /// Raw frame, hex encoded
        data: String,
    },
    ArpRequest {
        conn: ConnectionId,
        in_port: u16,
        sender_mac: MacAddress,
        sender_ip: Ipv4Address,
        target_ip: Ipv4Address,
    },
    ConnectionDown {
        conn: ConnectionId,
    },
}

impl EventRecord {
    /// Convert to a transport event; `line` is used for error reporting
    pub fn into_event(self, line: usize) -> Result<SwitchEvent> {
        Ok(match self {
            Self::ConnectionUp { conn, dpid } => SwitchEvent::ConnectionUp { conn, dpid },
            Self::PacketIn {
                conn,
                in_port,
                data,
            } => SwitchEvent::PacketIn {
                conn,
                data: hex::decode(data.trim())
                    .map_err(|e| DaemonError::event(line, format!("bad packet data: {}", e)))?,
                in_port,
            },
            Self::ArpRequest {
                conn,
                in_port,
                sender_mac,
                sender_ip,
                target_ip,
            } => SwitchEvent::PacketIn {
                conn,
                data: ArpPacket::request(sender_mac, sender_ip, target_ip)
                    .to_frame(sender_mac, MacAddress::BROADCAST),
                in_port,
            },
            Self::ConnectionDown { conn } => SwitchEvent::ConnectionDown { conn },
        })
    }
}

/// Parse one line; blank lines and comments yield `None`
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<SwitchEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let record: EventRecord = serde_json::from_str(trimmed)
        .map_err(|e| DaemonError::event(line_no, e.to_string()))?;
    record.into_event(line_no).map(Some)
}

/// Read events from `reader` and forward them until EOF or until the
/// receiving side is gone. Returns the number of events forwarded.
pub async fn forward_events<R>(reader: R, tx: mpsc::Sender<SwitchEvent>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let Some(event) = parse_line(&line, line_no)? else {
            continue;
        };
        if tx.send(event).await.is_err() {
            debug!("Event receiver closed, stopping reader");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
