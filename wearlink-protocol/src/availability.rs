//! Node availability gate
//!
//! Decides whether any peer is free to pair: reachable, advertising the
//! controller capability, and not already the confirmed partner of a slot.

use crate::node::NodeId;
use crate::WearEvent;
use std::collections::HashSet;
use tracing::debug;

/// Evaluates directory results against the set of paired peers
#[derive(Debug, Clone)]
pub struct AvailabilityGate {
    capability: String,
}

impl AvailabilityGate {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
        }
    }

    /// Capability queried from the node directory
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Produce `NODES_AVAILABLE` or `NODES_UNAVAILABLE`
    ///
    /// Available means at least one reachable node is not already paired to
    /// some slot.
    pub fn evaluate(&self, reachable: &HashSet<NodeId>, paired: &HashSet<NodeId>) -> WearEvent {
        let free = reachable.iter().filter(|n| !paired.contains(*n)).count();
        debug!(
            capability = %self.capability,
            reachable = reachable.len(),
            free,
            "Evaluated node availability"
        );

        if free > 0 {
            WearEvent::nodes_available()
        } else {
            WearEvent::nodes_unavailable()
        }
    }

    /// Event to report when the directory could not be queried
    pub fn unavailable(&self) -> WearEvent {
        WearEvent::nodes_unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;

    fn set(ids: &[&str]) -> HashSet<NodeId> {
        ids.iter().map(|id| NodeId::from(*id)).collect()
    }

    #[test]
    fn test_no_reachable_nodes() {
        let gate = AvailabilityGate::new("wear_control_support");
        let event = gate.evaluate(&set(&[]), &set(&[]));
        assert_eq!(event.kind(), EventType::NodesUnavailable);
    }

    #[test]
    fn test_unpaired_node_is_available() {
        let gate = AvailabilityGate::new("wear_control_support");
        let event = gate.evaluate(&set(&["watch-a", "watch-b"]), &set(&["watch-a"]));
        assert_eq!(event.kind(), EventType::NodesAvailable);
    }

    #[test]
    fn test_all_reachable_nodes_paired() {
        let gate = AvailabilityGate::new("wear_control_support");
        let event = gate.evaluate(&set(&["watch-a", "watch-b"]), &set(&["watch-a", "watch-b"]));
        assert_eq!(event.kind(), EventType::NodesUnavailable);
        assert_eq!(event.player_num, None);
    }
}
