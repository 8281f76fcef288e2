//! Controller daemon: routes transport events to per-connection tasks.
//!
//! Every connection-up spawns one task that owns the connection's
//! [`SwitchController`]. The task installs the policy before it reads its
//! queue, so packet-ins for a connection are never handled ahead of the
//! policy. Connections do not share any mutable state, and a full queue
//! on one connection drops that connection's packet-ins without delaying
//! any other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use sdn_policy::{
    ConnectionId, Controller, PacketInOutcome, PolicyError, Role, SwitchEvent, SwitchId,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the controller daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Depth of each connection's event queue
    pub channel_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Packet-in delivered to a connection task. Closing the queue signals
/// connection-down.
#[derive(Debug)]
struct PacketIn {
    data: Vec<u8>,
    in_port: u16,
}

/// What happened on one connection, returned when its task ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub conn: ConnectionId,
    pub dpid: SwitchId,
    /// `None` if the connection was never managed
    pub role: Option<Role>,
    pub rules_installed: usize,
    pub packets_in: usize,
    pub replies: usize,
    pub error: Option<PolicyError>,
}

impl ConnectionReport {
    fn new(conn: ConnectionId, dpid: SwitchId) -> Self {
        Self {
            conn,
            dpid,
            role: None,
            rules_installed: 0,
            packets_in: 0,
            replies: 0,
            error: None,
        }
    }

    pub fn is_managed(&self) -> bool {
        self.role.is_some()
    }
}

struct ConnectionHandle {
    dpid: SwitchId,
    tx: mpsc::Sender<PacketIn>,
    task: JoinHandle<ConnectionReport>,
}

/// The controller daemon.
pub struct ControllerDaemon {
    config: DaemonConfig,
    controller: Arc<Controller>,
    connections: HashMap<ConnectionId, ConnectionHandle>,
    finished: Vec<JoinHandle<ConnectionReport>>,
}

impl ControllerDaemon {
    pub fn new(config: DaemonConfig, controller: Arc<Controller>) -> Self {
        Self {
            config,
            controller,
            connections: HashMap::new(),
            finished: Vec::new(),
        }
    }

    /// Number of connections currently open.
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Routes one transport event. Never waits on a connection task.
    pub fn dispatch(&mut self, event: SwitchEvent) {
        match event {
            SwitchEvent::ConnectionUp { conn, dpid } => self.connection_up(conn, dpid),
            SwitchEvent::PacketIn {
                conn,
                data,
                in_port,
            } => self.packet_in(conn, PacketIn { data, in_port }),
            SwitchEvent::ConnectionDown { conn } => match self.connections.remove(&conn) {
                // Dropping the sender ends the task once its queue drains.
                Some(handle) => self.finished.push(handle.task),
                None => warn!(conn, "Connection-down for unknown connection"),
            },
        }
    }

    fn connection_up(&mut self, conn: ConnectionId, dpid: SwitchId) {
        if let Some(existing) = self.connections.get(&conn) {
            warn!(
                conn,
                dpid,
                existing = existing.dpid,
                "Duplicate connection-up, ignoring"
            );
            return;
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.controller),
            conn,
            dpid,
            rx,
        ));
        self.connections
            .insert(conn, ConnectionHandle { dpid, tx, task });
    }

    fn packet_in(&self, conn: ConnectionId, packet: PacketIn) {
        let Some(handle) = self.connections.get(&conn) else {
            warn!(conn, "Packet-in for unknown connection, dropping");
            return;
        };
        match handle.tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(conn, dpid = handle.dpid, "Connection queue full, dropping packet-in")
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn, dpid = handle.dpid, "Connection unmanaged, dropping packet-in")
            }
        }
    }

    /// Dispatches events until the stream ends or `shutdown` completes,
    /// then closes every connection.
    pub async fn run<F>(
        mut self,
        mut events: mpsc::Receiver<SwitchEvent>,
        shutdown: F,
    ) -> Vec<ConnectionReport>
    where
        F: Future<Output = ()>,
    {
        info!("Starting controller event loop");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        info!("Event stream closed");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    /// Closes every open connection and waits for all connection tasks.
    pub async fn shutdown(mut self) -> Vec<ConnectionReport> {
        let open: Vec<_> = self.connections.drain().map(|(_, h)| h.task).collect();
        self.finished.extend(open);

        let mut reports = Vec::with_capacity(self.finished.len());
        for task in self.finished {
            match task.await {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Connection task failed"),
            }
        }
        reports.sort_by_key(|r| r.conn);

        info!(connections = reports.len(), "Controller stopped");
        reports
    }
}

async fn run_connection(
    controller: Arc<Controller>,
    conn: ConnectionId,
    dpid: SwitchId,
    mut rx: mpsc::Receiver<PacketIn>,
) -> ConnectionReport {
    let mut report = ConnectionReport::new(conn, dpid);

    let mut switch = match controller.connection_up(dpid) {
        Ok(switch) => switch,
        Err(e) => {
            error!(conn, dpid, error = %e, "Leaving connection unmanaged");
            report.error = Some(e);
            return report;
        }
    };
    report.role = Some(switch.role());
    report.rules_installed = switch.flow_table().len();

    while let Some(PacketIn { data, in_port }) = rx.recv().await {
        report.packets_in += 1;
        match switch.handle_packet_in(&data, in_port) {
            Ok(PacketInOutcome::Replied { rule_pushed }) => {
                report.replies += 1;
                if rule_pushed {
                    report.rules_installed += 1;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(conn, dpid, error = %e, "Packet-in rejected");
                report.error = Some(e);
            }
        }
    }

    switch.disconnect();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sdn_policy::{ArpPacket, RecordingInstaller, Topology, TopologyConfig};
    use sdn_types::MacAddress;

    fn daemon(installer: &RecordingInstaller) -> ControllerDaemon {
        daemon_with(installer, DaemonConfig::default())
    }

    fn daemon_with(installer: &RecordingInstaller, config: DaemonConfig) -> ControllerDaemon {
        let topology = Arc::new(Topology::from_config(TopologyConfig::default()).unwrap());
        let controller = Arc::new(Controller::new(topology, Arc::new(installer.clone())));
        ControllerDaemon::new(config, controller)
    }

    fn arp_request(target: [u8; 4]) -> Vec<u8> {
        let mac = MacAddress::new([0, 0, 0, 0, 1, 0x0a]);
        ArpPacket::request(mac, [10, 0, 1, 10].into(), target.into())
            .to_frame(mac, MacAddress::BROADCAST)
    }

    #[test]
    fn test_default_config() {
        assert_eq!(DaemonConfig::default().channel_capacity, 256);
    }

    #[tokio::test]
    async fn test_connection_lifecycle() {
        let installer = RecordingInstaller::new();
        let mut daemon = daemon(&installer);

        daemon.dispatch(SwitchEvent::ConnectionUp { conn: 1, dpid: 21 });
        daemon.dispatch(SwitchEvent::PacketIn {
            conn: 1,
            data: arp_request([10, 0, 4, 10]),
            in_port: 1,
        });
        assert_eq!(daemon.active_connections(), 1);

        daemon.dispatch(SwitchEvent::ConnectionDown { conn: 1 });
        assert_eq!(daemon.active_connections(), 0);

        let reports = daemon.shutdown().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].role, Some(Role::CoreRouter));
        assert_eq!(reports[0].rules_installed, 12);
        assert_eq!(reports[0].packets_in, 1);
        assert_eq!(reports[0].replies, 1);

        // Policy first, then the learned rule and the reply.
        let directives = installer.directives();
        assert_eq!(installer.rules_for(21).len(), 12);
        assert!(matches!(
            directives.last(),
            Some(sdn_policy::Directive::PacketOut { dpid: 21, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_switch_is_isolated() {
        let installer = RecordingInstaller::new();
        let mut daemon = daemon(&installer);

        daemon.dispatch(SwitchEvent::ConnectionUp { conn: 1, dpid: 99 });
        daemon.dispatch(SwitchEvent::ConnectionUp { conn: 2, dpid: 1 });
        daemon.dispatch(SwitchEvent::PacketIn {
            conn: 1,
            data: arp_request([10, 0, 4, 10]),
            in_port: 1,
        });

        let reports = daemon.shutdown().await;
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].is_managed());
        assert_eq!(reports[0].error, Some(PolicyError::UnknownSwitch(99)));
        assert_eq!(reports[1].role, Some(Role::EdgeSwitch));
        assert!(installer.rules_for(99).is_empty());
        assert_eq!(installer.rules_for(1).len(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_does_not_block_other_connections() {
        let installer = RecordingInstaller::new();
        let mut daemon = daemon_with(
            &installer,
            DaemonConfig {
                channel_capacity: 1,
            },
        );

        // The connection task has not run yet, so only one packet-in fits.
        daemon.dispatch(SwitchEvent::ConnectionUp { conn: 1, dpid: 1 });
        for _ in 0..3 {
            daemon.dispatch(SwitchEvent::PacketIn {
                conn: 1,
                data: arp_request([10, 0, 4, 10]),
                in_port: 1,
            });
        }
        daemon.dispatch(SwitchEvent::ConnectionUp { conn: 2, dpid: 2 });
        daemon.dispatch(SwitchEvent::PacketIn {
            conn: 2,
            data: arp_request([10, 0, 4, 10]),
            in_port: 4,
        });

        let reports = daemon.shutdown().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].packets_in, 1);
        assert_eq!(reports[1].packets_in, 1);
        assert_eq!(reports[1].replies, 1);
        assert_eq!(installer.packets_for(2)[0].out_port, 4);
    }

    #[tokio::test]
    async fn test_event_for_unknown_connection() {
        let installer = RecordingInstaller::new();
        let mut daemon = daemon(&installer);

        daemon.dispatch(SwitchEvent::PacketIn {
            conn: 5,
            data: vec![0; 60],
            in_port: 1,
        });
        daemon.dispatch(SwitchEvent::ConnectionDown { conn: 5 });

        assert!(daemon.shutdown().await.is_empty());
        assert!(installer.is_empty());
    }

    #[tokio::test]
    async fn test_run_until_stream_closes() {
        let installer = RecordingInstaller::new();
        let daemon = daemon(&installer);
        let (tx, rx) = mpsc::channel(16);

        tx.send(SwitchEvent::ConnectionUp { conn: 1, dpid: 2 })
            .await
            .unwrap();
        tx.send(SwitchEvent::ConnectionUp { conn: 2, dpid: 3 })
            .await
            .unwrap();
        drop(tx);

        let reports = daemon.run(rx, std::future::pending()).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(ConnectionReport::is_managed));
        assert_eq!(installer.len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let installer = RecordingInstaller::new();
        let daemon = daemon(&installer);
        let (_tx, rx) = mpsc::channel(16);

        let reports = daemon.run(rx, async {}).await;
        assert!(reports.is_empty());
    }
}
