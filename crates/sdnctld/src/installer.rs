//! Installers used when no switch transport is attached.

use std::io::Write;
use std::sync::Mutex;

use sdn_policy::{Directive, FlowRule, PacketOut, RuleInstaller, SwitchId};
use tracing::{info, warn};

/// Logs every directive and writes it as one JSON object per line.
pub struct JsonLinesInstaller<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesInstaller<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, directive: Directive) {
        info!(dpid = directive.dpid(), "{}", directive);

        let line = match serde_json::to_string(&directive) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode directive");
                return;
            }
        };

        let mut out = self
            .out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!(error = %e, "Failed to write directive");
        }
    }
}

impl<W: Write + Send> RuleInstaller for JsonLinesInstaller<W> {
    fn install_rule(&self, dpid: SwitchId, rule: &FlowRule) {
        self.emit(Directive::InstallRule { dpid, rule: *rule });
    }

    fn packet_out(&self, dpid: SwitchId, packet: &PacketOut) {
        self.emit(Directive::PacketOut {
            dpid,
            packet: packet.clone(),
        });
    }
}
