//! Per-connection switch management.
//!
//! [`Controller`] holds what every connection shares: the compiler, the
//! resolver and the installer. Each accepted connection gets its own
//! [`SwitchController`], which owns the switch's flow table model and is
//! driven by one task at a time.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::compiler::PolicyCompiler;
use crate::error::PolicyResult;
use crate::flow_table::{FlowTable, InstallOutcome};
use crate::resolver::{ReactiveResolver, Resolution};
use crate::role::{Role, SwitchId};
use crate::southbound::RuleInstaller;
use crate::topology::Topology;

/// Shared controller state.
pub struct Controller {
    compiler: PolicyCompiler,
    resolver: ReactiveResolver,
    installer: Arc<dyn RuleInstaller>,
}

impl Controller {
    pub fn new(topology: Arc<Topology>, installer: Arc<dyn RuleInstaller>) -> Self {
        Self {
            compiler: PolicyCompiler::new(Arc::clone(&topology)),
            resolver: ReactiveResolver::new(topology),
            installer,
        }
    }

    /// Replaces the default resolver (pseudo MAC, reactive priority).
    pub fn with_resolver(mut self, resolver: ReactiveResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn topology(&self) -> &Arc<Topology> {
        self.compiler.topology()
    }

    pub fn compiler(&self) -> &PolicyCompiler {
        &self.compiler
    }

    /// Handles a connection-up: resolves the switch role, compiles its
    /// policy and pushes every rule.
    ///
    /// # Errors
    ///
    /// Fails with `UnknownSwitch`, `UnknownHost` or `ConflictingRule`; in
    /// every case nothing has been pushed to the switch.
    #[instrument(skip(self))]
    pub fn connection_up(self: &Arc<Self>, dpid: SwitchId) -> PolicyResult<SwitchController> {
        let (role, rules) = self.compiler.compile_switch(dpid)?;

        // Validate the whole set before pushing anything.
        let mut table = FlowTable::new();
        let mut pending = Vec::with_capacity(rules.len());
        for rule in rules {
            if table.insert(rule)?.needs_push() {
                pending.push(rule);
            }
        }

        for rule in &pending {
            self.installer.install_rule(dpid, rule);
        }
        info!(%role, rules = pending.len(), "Switch connected, policy installed");

        Ok(SwitchController {
            dpid,
            role,
            state: ConnectionState::PolicyInstalled,
            table,
            controller: Arc::clone(self),
        })
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("compiler", &self.compiler)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of one managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    PolicyInstalled,
    Disconnected,
}

/// Result of one packet-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInOutcome {
    /// A reply was sent; `rule_pushed` is false when the return path was
    /// already installed.
    Replied { rule_pushed: bool },
    Malformed,
    Unhandled,
    /// The connection is already down.
    Inactive,
}

/// Handler for one switch connection.
#[derive(Debug)]
pub struct SwitchController {
    dpid: SwitchId,
    role: Role,
    state: ConnectionState,
    table: FlowTable,
    controller: Arc<Controller>,
}

impl SwitchController {
    pub fn dpid(&self) -> SwitchId {
        self.dpid
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn flow_table(&self) -> &FlowTable {
        &self.table
    }

    /// Handles a frame that missed every installed rule.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingRule` if the learned return path collides with an
    /// installed rule; no directive is sent in that case.
    #[instrument(skip(self, data), fields(dpid = self.dpid))]
    pub fn handle_packet_in(&mut self, data: &[u8], in_port: u16) -> PolicyResult<PacketInOutcome> {
        if self.state == ConnectionState::Disconnected {
            debug!("Packet-in after disconnect, ignoring");
            return Ok(PacketInOutcome::Inactive);
        }

        match self.controller.resolver.handle(data, in_port) {
            Resolution::Reply {
                binding,
                rule,
                packet_out,
            } => {
                let outcome = self.table.insert(rule)?;
                if let InstallOutcome::Replaced(previous) = outcome {
                    debug!(%previous, "Return path overwrites installed rule");
                }

                let installer = &self.controller.installer;
                if outcome.needs_push() {
                    installer.install_rule(self.dpid, &rule);
                }
                installer.packet_out(self.dpid, &packet_out);

                info!(
                    host = %binding.proto_addr,
                    mac = %binding.hw_addr,
                    "Answered address request"
                );
                Ok(PacketInOutcome::Replied {
                    rule_pushed: outcome.needs_push(),
                })
            }
            Resolution::Malformed(e) => {
                warn!(error = %e, "Ignoring incomplete packet");
                Ok(PacketInOutcome::Malformed)
            }
            Resolution::Unhandled(packet) => {
                info!("Unhandled packet from dpid {}: {}", self.dpid, packet);
                Ok(PacketInOutcome::Unhandled)
            }
        }
    }

    /// Marks the connection down. The flow table model is dropped with the
    /// switch's own table.
    #[instrument(skip(self), fields(dpid = self.dpid))]
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.table.clear();
        info!("Switch disconnected");
    }
}
