//! Per-switch model of installed rules.

use tracing::debug;

use crate::error::{PolicyError, PolicyResult};
use crate::flow::{FlowRule, PacketHeaders};

/// Result of adding a rule to a [`FlowTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// New entry; the rule must be pushed to the switch.
    Added,
    /// An identical rule is already installed; nothing to push.
    Unchanged,
    /// An entry with the same priority and match was overwritten. Holds the
    /// previous rule. The new rule must be pushed.
    Replaced(FlowRule),
}

impl InstallOutcome {
    /// Returns true if the switch needs an install directive.
    pub fn needs_push(&self) -> bool {
        !matches!(self, InstallOutcome::Unchanged)
    }
}

/// Rules installed on one switch, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    rules: Vec<FlowRule>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, enforcing overlap freedom within a priority.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ConflictingRule`] if the rule shares its
    /// priority with an installed rule whose match overlaps without being
    /// identical and whose action differs. The table is left untouched.
    pub fn insert(&mut self, rule: FlowRule) -> PolicyResult<InstallOutcome> {
        if self.rules.contains(&rule) {
            return Ok(InstallOutcome::Unchanged);
        }

        if let Some(slot) = self
            .rules
            .iter_mut()
            .find(|r| r.priority == rule.priority && r.pattern == rule.pattern)
        {
            let previous = std::mem::replace(slot, rule);
            debug!(old = %previous, new = %rule, "Overwriting flow entry");
            return Ok(InstallOutcome::Replaced(previous));
        }

        if let Some(installed) = self
            .rules
            .iter()
            .find(|r| r.contends_with(&rule) && r.action != rule.action)
        {
            return Err(PolicyError::conflicting_rule(&rule, installed));
        }

        self.rules.push(rule);
        Ok(InstallOutcome::Added)
    }

    /// Returns the rule the switch would apply to a frame: the matching
    /// rule of highest priority.
    pub fn lookup(&self, headers: &PacketHeaders) -> Option<&FlowRule> {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.matches(headers))
            .max_by_key(|rule| rule.priority)
    }

    pub fn rules(&self) -> &[FlowRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowAction, FlowMatch, ROUTE_PRIORITY};
    use crate::packet::{ETHERTYPE_ARP, ETHERTYPE_IPV4, IP_PROTO_ICMP, IP_PROTO_TCP};
    use pretty_assertions::assert_eq;
    use sdn_types::{Ipv4Address, MacAddress};

    const H10: Ipv4Address = Ipv4Address::new(10, 0, 1, 10);
    const SERV1: Ipv4Address = Ipv4Address::new(10, 0, 4, 10);
    const UNTRUSTED: Ipv4Address = Ipv4Address::new(172, 16, 10, 100);

    fn ipv4(proto: u8, src: Ipv4Address, dst: Ipv4Address) -> PacketHeaders {
        PacketHeaders {
            eth_type: ETHERTYPE_IPV4,
            ip_proto: Some(proto),
            ipv4_src: Some(src),
            ipv4_dst: Some(dst),
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut table = FlowTable::new();
        let rule = FlowRule::route(FlowMatch::ipv4().with_dst(H10), 1);

        assert_eq!(table.insert(rule).unwrap(), InstallOutcome::Added);
        assert_eq!(table.insert(rule).unwrap(), InstallOutcome::Unchanged);
        assert!(!InstallOutcome::Unchanged.needs_push());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_identical_match_is_replaced() {
        let mut table = FlowTable::new();
        let pattern = FlowMatch::ipv4().with_dst(H10);
        let old = FlowRule::route(pattern, 1);
        let new = FlowRule::new(
            ROUTE_PRIORITY,
            pattern,
            FlowAction::SetDstMacOutput {
                mac: MacAddress::new([0, 0, 0, 0, 0, 0x0a]),
                port: 3,
            },
        );

        table.insert(old).unwrap();
        assert_eq!(table.insert(new).unwrap(), InstallOutcome::Replaced(old));
        assert_eq!(table.rules(), &[new]);
    }

    #[test]
    fn test_overlapping_match_conflicts() {
        let mut table = FlowTable::new();
        table
            .insert(FlowRule::route(FlowMatch::ipv4().with_dst(H10), 1))
            .unwrap();

        let err = table
            .insert(FlowRule::route(FlowMatch::ipv4().with_src(UNTRUSTED), 5))
            .unwrap_err();
        assert!(matches!(err, PolicyError::ConflictingRule { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_overlapping_drops_coexist() {
        let mut table = FlowTable::new();
        let icmp = FlowRule::block(FlowMatch::icmp().with_src(UNTRUSTED).with_dst(SERV1));
        let any_ip = FlowRule::block(FlowMatch::ipv4().with_src(UNTRUSTED).with_dst(SERV1));

        assert_eq!(table.insert(icmp).unwrap(), InstallOutcome::Added);
        assert_eq!(table.insert(any_ip).unwrap(), InstallOutcome::Added);
    }

    #[test]
    fn test_lookup_highest_priority_wins() {
        let mut table = FlowTable::new();
        // Insert low priority last so that order cannot explain the result.
        table
            .insert(FlowRule::block(
                FlowMatch::ipv4().with_src(UNTRUSTED).with_dst(SERV1),
            ))
            .unwrap();
        table
            .insert(FlowRule::route(FlowMatch::ipv4().with_dst(SERV1), 4))
            .unwrap();
        table.insert(FlowRule::flood()).unwrap();

        let blocked = table.lookup(&ipv4(IP_PROTO_TCP, UNTRUSTED, SERV1)).unwrap();
        assert!(blocked.action.is_drop());

        let routed = table.lookup(&ipv4(IP_PROTO_ICMP, H10, SERV1)).unwrap();
        assert_eq!(routed.action, FlowAction::Output { port: 4 });

        let arp = PacketHeaders {
            eth_type: ETHERTYPE_ARP,
            ..PacketHeaders::default()
        };
        assert_eq!(table.lookup(&arp).unwrap().action, FlowAction::Flood);
    }

    #[test]
    fn test_lookup_empty_table() {
        let table = FlowTable::new();
        assert!(table.is_empty());
        assert!(table.lookup(&ipv4(IP_PROTO_ICMP, H10, SERV1)).is_none());
    }
}
