//! Pairing State Machine
//!
//! Tracks one [`SlotRecord`] per player slot plus the single process-wide
//! "who asked me to pair" requester, and turns local calls and validated
//! inbound envelopes into [`PairingAction`]s.
//!
//! ## Handshake
//!
//! ```text
//! requester (A)                         responder (B)
//! request_pair ── PAIR_REQUEST (shared) ──▶ pending requester = A
//! pending peer = B ◀── PAIR_RESPONSE ──── respond_to_pair
//! accept_pair ──── PAIR_ACCEPTED ────────▶ Paired { A }
//! Paired { B }
//! ```
//!
//! The first responder to a request is held; any later responder gets an
//! immediate `PAIR_REJECTED` and the held response is left alone.
//!
//! The handler never performs I/O. The caller executes the returned actions
//! in order while still holding exclusive access to the handler.

use super::state::{SlotRecord, SlotState};
use crate::node::NodeId;
use crate::transport::{ArtifactHandle, TransportType};
use crate::{ControllerType, EventType, WearEvent};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum PairingAction {
    /// Send `event` directly to `peer`
    SendDirect { peer: NodeId, event: WearEvent },

    /// Publish a pair request for `slot` as shared state and report the
    /// resulting handle back through
    /// [`PairingHandler::record_outstanding_request`]
    PublishRequest { slot: u32, event: WearEvent },

    /// Delete a previously published shared-state record
    DeleteArtifact(ArtifactHandle),

    /// Deliver `event` to local listeners
    Dispatch(WearEvent),

    /// Re-evaluate node availability
    CheckAvailability,
}

/// Per-slot pairing state machine
#[derive(Debug, Default)]
pub struct PairingHandler {
    slots: HashMap<u32, SlotRecord>,

    /// Peer that last sent us a PAIR_REQUEST not yet accepted or rejected
    pending_requester: Option<NodeId>,
}

impl PairingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `slot`
    pub fn state(&self, slot: u32) -> SlotState {
        self.slots
            .get(&slot)
            .map(|record| record.state.clone())
            .unwrap_or_default()
    }

    /// Confirmed partner of `slot`
    pub fn paired_peer(&self, slot: u32) -> Option<&NodeId> {
        self.slots.get(&slot).and_then(|r| r.state.paired_peer())
    }

    /// Responder held for `slot` while this side decides
    pub fn pending_peer(&self, slot: u32) -> Option<&NodeId> {
        self.slots.get(&slot).and_then(|r| r.state.pending_peer())
    }

    pub fn pending_requester(&self) -> Option<&NodeId> {
        self.pending_requester.as_ref()
    }

    /// Shared-state record of the pair request outstanding for `slot`
    pub fn outstanding_request(&self, slot: u32) -> Option<&ArtifactHandle> {
        self.slots
            .get(&slot)
            .and_then(|r| r.outstanding_request.as_ref())
    }

    /// Confirmed partners across all slots
    pub fn paired_peers(&self) -> HashSet<NodeId> {
        self.slots
            .values()
            .filter_map(|r| r.state.paired_peer().cloned())
            .collect()
    }

    fn slot_mut(&mut self, slot: u32) -> &mut SlotRecord {
        self.slots.entry(slot).or_default()
    }

    /// Start a handshake for `slot` by broadcasting a pair request
    ///
    /// A slot that is already paired is disconnected first.
    pub fn request_pair(&mut self, target_controller: &str, slot: u32) -> Vec<PairingAction> {
        let mut actions = Vec::new();

        let record = self.slot_mut(slot);
        if record.state.is_paired() {
            info!("Slot {} is paired, disconnecting before new request", slot);
            actions.extend(self.disconnect(slot));
        } else if let Some(previous) = record.outstanding_request.take() {
            actions.push(PairingAction::DeleteArtifact(previous));
        }

        self.slot_mut(slot)
            .enter(SlotState::AwaitingOwnRequestAck { pending_peer: None });
        info!("Requesting pair for slot {} ({})", slot, target_controller);

        actions.push(PairingAction::PublishRequest {
            slot,
            event: WearEvent::pair_request(target_controller).with_player_num(slot),
        });
        actions
    }

    /// Remember where the pair request for `slot` was published
    pub fn record_outstanding_request(&mut self, slot: u32, handle: ArtifactHandle) {
        self.slot_mut(slot).outstanding_request = Some(handle);
    }

    /// Roll back a pair request whose publication failed
    pub fn abort_request(&mut self, slot: u32) -> Vec<PairingAction> {
        let record = self.slot_mut(slot);
        if !matches!(record.state, SlotState::AwaitingOwnRequestAck { .. }) {
            return Vec::new();
        }

        record.reset();
        warn!("Pair request for slot {} could not be published", slot);
        vec![PairingAction::Dispatch(
            WearEvent::pair_rejected().with_player_num(slot),
        )]
    }

    /// Answer the pending pair request on `slot`
    pub fn respond_to_pair(&mut self, slot: u32) -> Vec<PairingAction> {
        let Some(requester) = self.pending_requester.clone() else {
            warn!("No pending pair request to respond to on slot {}", slot);
            return Vec::new();
        };

        let record = self.slot_mut(slot);
        if record.state.is_paired() {
            warn!(
                "Slot {} is already {}, disconnect before responding",
                slot, record.state
            );
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some(previous) = record.outstanding_request.take() {
            actions.push(PairingAction::DeleteArtifact(previous));
        }
        record.enter(SlotState::AwaitingPeerResponse {
            requester: requester.clone(),
        });
        info!("Responding to pair request from {} on slot {}", requester, slot);

        actions.push(PairingAction::SendDirect {
            peer: requester,
            event: WearEvent::pair_response().with_player_num(slot),
        });
        actions
    }

    /// Confirm the responder held for `slot`
    pub fn accept_pair(&mut self, controller_type: ControllerType, slot: u32) -> Vec<PairingAction> {
        let record = self.slot_mut(slot);
        let Some(peer) = record.state.pending_peer().cloned() else {
            warn!(
                "Cannot accept pair on slot {}: no pending response ({})",
                slot, record.state
            );
            return Vec::new();
        };

        let mut actions = Vec::new();
        if let Some(request) = record.outstanding_request.take() {
            actions.push(PairingAction::DeleteArtifact(request));
        }
        record.enter(SlotState::Paired { peer: peer.clone() });
        info!("Slot {} paired with {}", slot, peer);

        actions.push(PairingAction::SendDirect {
            peer,
            event: WearEvent::pair_accepted(controller_type).with_player_num(slot),
        });
        actions.push(PairingAction::CheckAvailability);
        actions
    }

    /// Decline the pending pair request
    pub fn reject_pair(&mut self, slot: u32) -> Vec<PairingAction> {
        let Some(requester) = self.pending_requester.take() else {
            debug!("No pending pair request to reject on slot {}", slot);
            return Vec::new();
        };

        for record in self.slots.values_mut() {
            let answered = matches!(
                &record.state,
                SlotState::AwaitingPeerResponse { requester: r } if *r == requester
            );
            if answered {
                record.reset();
            }
        }
        info!("Rejecting pair request from {}", requester);

        vec![PairingAction::SendDirect {
            peer: requester,
            event: WearEvent::pair_rejected().with_player_num(slot),
        }]
    }

    /// Reset `slot` to unpaired and notify the former counterpart
    ///
    /// Calling this on an unpaired slot only re-checks availability.
    pub fn disconnect(&mut self, slot: u32) -> Vec<PairingAction> {
        let (previous, artifact) = self.slot_mut(slot).reset();
        self.pending_requester = None;

        let mut actions = Vec::new();
        if let Some(artifact) = artifact {
            actions.push(PairingAction::DeleteArtifact(artifact));
        }
        if let Some(peer) = previous.counterpart() {
            info!("Disconnecting slot {} from {}", slot, peer);
            actions.push(PairingAction::SendDirect {
                peer: peer.clone(),
                event: WearEvent::disconnect().with_player_num(slot),
            });
        }
        actions.push(PairingAction::CheckAvailability);
        actions
    }

    /// Reset handshakes that started at least `timeout` before `now`
    ///
    /// Each expired slot sends `DISCONNECT` to its handshake counterpart, if
    /// one is known, and reports a local `PAIR_REJECTED`.
    pub fn expire_handshakes(&mut self, now: Instant, timeout: Duration) -> Vec<PairingAction> {
        let mut expired: Vec<u32> = self
            .slots
            .iter()
            .filter(|(_, r)| r.state.is_handshaking())
            .filter(|(_, r)| r.since.is_some_and(|t| now.saturating_duration_since(t) >= timeout))
            .map(|(slot, _)| *slot)
            .collect();
        expired.sort_unstable();

        let mut actions = Vec::new();
        for slot in expired {
            let (previous, artifact) = self.slot_mut(slot).reset();
            if let SlotState::AwaitingPeerResponse { requester } = &previous {
                if self.pending_requester.as_ref() == Some(requester) {
                    self.pending_requester = None;
                }
            }
            info!("Handshake on slot {} expired ({})", slot, previous);

            if let Some(artifact) = artifact {
                actions.push(PairingAction::DeleteArtifact(artifact));
            }
            if let Some(peer) = previous.counterpart() {
                actions.push(PairingAction::SendDirect {
                    peer: peer.clone(),
                    event: WearEvent::disconnect().with_player_num(slot),
                });
            }
            actions.push(PairingAction::Dispatch(
                WearEvent::pair_rejected().with_player_num(slot),
            ));
        }
        actions
    }

    /// Feed a normalized inbound event through the state machine
    pub fn handle_inbound(
        &mut self,
        source: &NodeId,
        event: WearEvent,
        transport_type: TransportType,
    ) -> Vec<PairingAction> {
        debug!(
            "Inbound {} from {} via {} (slot {:?})",
            event.kind(),
            source,
            transport_type,
            event.player_num
        );

        match event.kind() {
            EventType::PairRequest => self.handle_pair_request(source, event),
            EventType::PairResponse => self.handle_pair_response(source, event),
            EventType::PairAccepted => self.handle_pair_accepted(source, event),
            EventType::PairRejected => self.handle_pair_rejected(source, event),
            EventType::Disconnect => self.handle_disconnect(source, event),
            _ => self.handle_application_event(source, event, transport_type),
        }
    }

    fn handle_pair_request(&mut self, source: &NodeId, event: WearEvent) -> Vec<PairingAction> {
        info!("Received pair request from {}", source);
        self.pending_requester = Some(source.clone());
        vec![PairingAction::Dispatch(event)]
    }

    fn handle_pair_response(&mut self, source: &NodeId, event: WearEvent) -> Vec<PairingAction> {
        let Some(slot) = event.player_num else {
            debug!("Dropping unscoped pair response from {}", source);
            return Vec::new();
        };

        let record = self.slot_mut(slot);
        let held = match &record.state {
            SlotState::AwaitingOwnRequestAck { pending_peer } => pending_peer.clone(),
            other => {
                debug!(
                    "Dropping pair response from {}: slot {} is {}",
                    source, slot, other
                );
                return Vec::new();
            }
        };

        match held {
            Some(held) if held == *source => {
                debug!("Duplicate pair response from {} on slot {}", source, slot);
                Vec::new()
            }
            Some(held) => {
                info!(
                    "Rejecting pair response from {} on slot {}: already holding {}",
                    source, slot, held
                );
                vec![PairingAction::SendDirect {
                    peer: source.clone(),
                    event: WearEvent::pair_rejected().with_player_num(slot),
                }]
            }
            None => {
                info!("Holding pair response from {} on slot {}", source, slot);
                record.state = SlotState::AwaitingOwnRequestAck {
                    pending_peer: Some(source.clone()),
                };
                vec![PairingAction::Dispatch(event)]
            }
        }
    }

    fn handle_pair_accepted(&mut self, source: &NodeId, event: WearEvent) -> Vec<PairingAction> {
        if let Some(slot) = event.player_num {
            match self.state(slot) {
                SlotState::AwaitingPeerResponse { requester } if requester == *source => {
                    self.slot_mut(slot).enter(SlotState::Paired { peer: requester });
                    if self.pending_requester.as_ref() == Some(source) {
                        self.pending_requester = None;
                    }
                    info!("Slot {} paired with {}", slot, source);
                    return vec![
                        PairingAction::Dispatch(event),
                        PairingAction::CheckAvailability,
                    ];
                }
                SlotState::Paired { peer } if peer == *source => {
                    debug!("Duplicate pair acceptance from {} on slot {}", source, slot);
                    return Vec::new();
                }
                SlotState::AwaitingPeerResponse { .. } => {
                    self.slot_mut(slot).reset();
                }
                _ => {}
            }
        }

        warn!(
            "Unexpected pair acceptance from {} (slot {:?}), treating as rejected",
            source, event.player_num
        );
        self.pending_requester = None;

        let mut rejected = WearEvent::pair_rejected();
        rejected.player_num = event.player_num;
        vec![PairingAction::Dispatch(rejected)]
    }

    fn handle_pair_rejected(&mut self, source: &NodeId, event: WearEvent) -> Vec<PairingAction> {
        let mut actions = Vec::new();

        if self.pending_requester.as_ref() == Some(source) {
            self.pending_requester = None;
        }

        if let Some(slot) = event.player_num {
            let record = self.slot_mut(slot);
            let applies = match &record.state {
                SlotState::AwaitingOwnRequestAck { pending_peer } => {
                    pending_peer.as_ref().map_or(true, |held| held == source)
                }
                SlotState::AwaitingPeerResponse { requester } => requester == source,
                _ => false,
            };

            if applies {
                let (previous, artifact) = record.reset();
                info!("Slot {} rejected by {} ({})", slot, source, previous);
                if let Some(artifact) = artifact {
                    actions.push(PairingAction::DeleteArtifact(artifact));
                }
            }
        }

        actions.push(PairingAction::Dispatch(event));
        actions
    }

    fn handle_disconnect(&mut self, source: &NodeId, event: WearEvent) -> Vec<PairingAction> {
        let Some(slot) = event.player_num else {
            debug!("Dropping unscoped disconnect from {}", source);
            return Vec::new();
        };

        let record = self.slot_mut(slot);
        if record.state.counterpart() != Some(source) {
            debug!(
                "Dropping disconnect from {}: slot {} is {}",
                source, slot, record.state
            );
            return Vec::new();
        }

        let (_, artifact) = record.reset();
        if self.pending_requester.as_ref() == Some(source) {
            self.pending_requester = None;
        }
        info!("Slot {} disconnected by {}", slot, source);

        let mut actions = Vec::new();
        if let Some(artifact) = artifact {
            actions.push(PairingAction::DeleteArtifact(artifact));
        }
        actions.push(PairingAction::Dispatch(event));
        actions.push(PairingAction::CheckAvailability);
        actions
    }

    fn handle_application_event(
        &mut self,
        source: &NodeId,
        event: WearEvent,
        transport_type: TransportType,
    ) -> Vec<PairingAction> {
        let authorized = match transport_type {
            TransportType::DataItem => true,
            TransportType::Message => match event.player_num {
                Some(slot) => self.paired_peer(slot) == Some(source),
                None => self.paired_peers().contains(source),
            },
        };

        if !authorized {
            debug!(
                "Dropping {} from unpaired sender {} (slot {:?})",
                event.kind(),
                source,
                event.player_num
            );
            return Vec::new();
        }
        vec![PairingAction::Dispatch(event)]
    }
}
