//! Per-slot pairing records

use crate::node::NodeId;
use crate::transport::ArtifactHandle;
use std::fmt;
use std::time::Instant;

/// Pairing state of one player slot
///
/// Peer identities live inside the states that need them, so a slot can
/// never hold a pending peer and a confirmed peer at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    /// No pairing and no handshake in progress
    #[default]
    Unpaired,

    /// This side published a pair request and waits for a response
    ///
    /// `pending_peer` is the first responder, held until this side accepts.
    AwaitingOwnRequestAck { pending_peer: Option<NodeId> },

    /// This side answered `requester`'s pair request and waits for acceptance
    AwaitingPeerResponse { requester: NodeId },

    /// Confirmed partner
    Paired { peer: NodeId },
}

impl SlotState {
    /// Short state name for logs
    pub fn name(&self) -> &'static str {
        match self {
            SlotState::Unpaired => "unpaired",
            SlotState::AwaitingOwnRequestAck { .. } => "awaiting-own-request-ack",
            SlotState::AwaitingPeerResponse { .. } => "awaiting-peer-response",
            SlotState::Paired { .. } => "paired",
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, SlotState::Paired { .. })
    }

    /// Whether a handshake is in progress
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            SlotState::AwaitingOwnRequestAck { .. } | SlotState::AwaitingPeerResponse { .. }
        )
    }

    /// Confirmed partner, only in [`SlotState::Paired`]
    pub fn paired_peer(&self) -> Option<&NodeId> {
        match self {
            SlotState::Paired { peer } => Some(peer),
            _ => None,
        }
    }

    /// Peer whose response is held while this side has not accepted yet
    pub fn pending_peer(&self) -> Option<&NodeId> {
        match self {
            SlotState::AwaitingOwnRequestAck { pending_peer } => pending_peer.as_ref(),
            _ => None,
        }
    }

    /// The other party of this slot: partner, held responder or requester
    pub fn counterpart(&self) -> Option<&NodeId> {
        match self {
            SlotState::Unpaired => None,
            SlotState::AwaitingOwnRequestAck { pending_peer } => pending_peer.as_ref(),
            SlotState::AwaitingPeerResponse { requester } => Some(requester),
            SlotState::Paired { peer } => Some(peer),
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.counterpart() {
            Some(peer) => write!(f, "{} ({})", self.name(), peer),
            None => f.write_str(self.name()),
        }
    }
}

/// Pairing record of one slot
#[derive(Debug, Clone, Default)]
pub struct SlotRecord {
    pub state: SlotState,

    /// Shared-state record of the last pair request this side published
    pub outstanding_request: Option<ArtifactHandle>,

    /// When the current handshake started; `None` outside handshakes
    pub since: Option<Instant>,
}

impl SlotRecord {
    /// Enter `state`, stamping the handshake start when it is one
    pub(crate) fn enter(&mut self, state: SlotState) {
        self.since = if state.is_handshaking() {
            Some(Instant::now())
        } else {
            None
        };
        self.state = state;
    }

    /// Return to [`SlotState::Unpaired`], yielding the state left behind
    /// and any outstanding request record
    pub(crate) fn reset(&mut self) -> (SlotState, Option<ArtifactHandle>) {
        self.since = None;
        let previous = std::mem::take(&mut self.state);
        (previous, self.outstanding_request.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_and_paired_are_exclusive() {
        let watch = NodeId::from("watch");

        let pending = SlotState::AwaitingOwnRequestAck {
            pending_peer: Some(watch.clone()),
        };
        assert_eq!(pending.pending_peer(), Some(&watch));
        assert_eq!(pending.paired_peer(), None);

        let paired = SlotState::Paired { peer: watch.clone() };
        assert_eq!(paired.paired_peer(), Some(&watch));
        assert_eq!(paired.pending_peer(), None);
    }

    #[test]
    fn test_record_reset() {
        let mut record = SlotRecord::default();
        record.enter(SlotState::AwaitingOwnRequestAck { pending_peer: None });
        record.outstanding_request = Some(ArtifactHandle::new("wear://host/pair_request/0"));
        assert!(record.since.is_some());

        let (previous, artifact) = record.reset();
        assert!(previous.is_handshaking());
        assert!(artifact.is_some());
        assert_eq!(record.state, SlotState::Unpaired);
        assert!(record.since.is_none());
        assert!(record.outstanding_request.is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(SlotState::Unpaired.to_string(), "unpaired");
        let paired = SlotState::Paired {
            peer: NodeId::from("watch"),
        };
        assert_eq!(paired.to_string(), "paired (watch)");
    }
}
