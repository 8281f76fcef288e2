//! Role → rule set compilation.

use std::sync::Arc;

use tracing::debug;

use crate::error::{PolicyError, PolicyResult};
use crate::flow::{FlowAction, FlowMatch, FlowRule, Tier};
use crate::role::{Role, SwitchId};
use crate::topology::Topology;

/// Compiles the static policy for a switch role.
#[derive(Debug, Clone)]
pub struct PolicyCompiler {
    topology: Arc<Topology>,
}

impl PolicyCompiler {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Returns the rules to install on a switch of the given role.
    ///
    /// Edge switches and datacenter routers get a single flood rule. The
    /// core router gets the block rules for the untrusted host, one route
    /// per entry of its port table and the flood rule.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownHost`] if the core router policy names
    /// a host that is not in the topology.
    pub fn compile(&self, role: Role) -> PolicyResult<Vec<FlowRule>> {
        let rules = match role {
            Role::EdgeSwitch | Role::DatacenterRouter => vec![FlowRule::flood()],
            Role::CoreRouter => self.compile_core_router()?,
        };
        debug!(%role, rules = rules.len(), "Compiled policy");
        Ok(rules)
    }

    /// Resolves the role of `dpid`, then compiles its policy.
    pub fn compile_switch(&self, dpid: SwitchId) -> PolicyResult<(Role, Vec<FlowRule>)> {
        let role = self.topology.roles().resolve(dpid)?;
        Ok((role, self.compile(role)?))
    }

    fn compile_core_router(&self) -> PolicyResult<Vec<FlowRule>> {
        let policy = self.topology.core_router();
        let untrusted = self.topology.host(&policy.untrusted)?.ip;
        let server = self.topology.host(&policy.server)?.ip;

        let mut rules = Vec::with_capacity(policy.protected.len() + policy.ports.len() + 2);

        for name in &policy.protected {
            let protected = self.topology.host(name)?.ip;
            rules.push(FlowRule::block(
                FlowMatch::icmp().with_src(untrusted).with_dst(protected),
            ));
        }
        rules.push(FlowRule::block(
            FlowMatch::ipv4().with_src(untrusted).with_dst(server),
        ));

        for (name, port) in &policy.ports {
            let host = self.topology.host(name)?;
            rules.push(FlowRule::route(FlowMatch::ipv4().with_dst(host.ip), *port));
        }

        rules.push(FlowRule::flood());
        Ok(rules)
    }
}

fn expected_tier(action: &FlowAction) -> Tier {
    match action {
        FlowAction::Drop => Tier::Block,
        FlowAction::Output { .. } | FlowAction::SetDstMacOutput { .. } => Tier::Route,
        FlowAction::Flood => Tier::Default,
    }
}

/// Verifies that a rule set is stratified: drops sit in the block tier,
/// forwarding to a port in the route tier and flooding in the default tier,
/// and no two rules of equal priority overlap with different actions.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidConfig`] for a rule in the wrong tier and
/// [`PolicyError::ConflictingRule`] for an equal-priority overlap.
pub fn check_stratification(rules: &[FlowRule]) -> PolicyResult<()> {
    for (i, rule) in rules.iter().enumerate() {
        let expected = expected_tier(&rule.action);
        if rule.tier() != expected {
            return Err(PolicyError::invalid_config(
                "rules",
                format!("{} belongs to the {} tier, not {}", rule, expected, rule.tier()),
            ));
        }

        if let Some(other) = rules[..i]
            .iter()
            .find(|other| other.contends_with(rule) && other.action != rule.action)
        {
            return Err(PolicyError::conflicting_rule(rule, other));
        }
    }
    Ok(())
}
