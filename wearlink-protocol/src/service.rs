//! Link Service
//!
//! The context object an embedding application constructs once and passes
//! down. It owns the pairing state machine, the transport router, the
//! availability gate and the listener registry, and serializes every state
//! transition behind one lock.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wearlink_protocol::{LinkConfig, LinkService, ControllerType};
//!
//! let service = Arc::new(LinkService::new(
//!     LinkConfig::load()?,
//!     directory,
//!     message_transport,
//!     data_transport,
//! ));
//! service.initialize().await;
//!
//! let mut events = service.subscribe().await;
//! service.request_pair("SLIDER", 0).await;
//!
//! // Platform callbacks feed inbound traffic:
//! service.on_message_received(&source, "/pair_response", &bytes).await;
//! ```
//!
//! ## Concurrency
//!
//! Local calls and inbound notifications may arrive from different tasks.
//! Each one takes the pairing lock for its whole duration, including the
//! transport calls and listener dispatch it causes, so check-then-set steps
//! on a slot never interleave. Listeners run under that lock and must not
//! wait on the service.

use crate::availability::AvailabilityGate;
use crate::config::LinkConfig;
use crate::listener::{ChannelListener, ListenerRegistry, WearEventListener};
use crate::node::{NodeDirectory, NodeId};
use crate::pairing::{PairingAction, PairingHandler, SlotState};
use crate::router::{InboundEvent, TransportRouter};
use crate::transport::{DataChange, DataTransport, DeliveryHandle, MessageTransport};
use crate::{ControllerType, ProtocolError, Result, WearEvent};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Shortest period of the background handshake expiry task
const MIN_EXPIRY_INTERVAL: Duration = Duration::from_secs(1);

/// Pairing and routing context for one local node
#[derive(Debug)]
pub struct LinkService {
    config: LinkConfig,
    directory: Arc<dyn NodeDirectory>,
    router: TransportRouter,
    gate: AvailabilityGate,

    /// Single serialization point for every state transition
    pairing: Mutex<PairingHandler>,

    /// Local identity, resolved lazily from the directory
    local_id: RwLock<Option<NodeId>>,

    listeners: ListenerRegistry,
}

impl LinkService {
    pub fn new(
        config: LinkConfig,
        directory: Arc<dyn NodeDirectory>,
        message_transport: Arc<dyn MessageTransport>,
        data_transport: Arc<dyn DataTransport>,
    ) -> Self {
        let gate = AvailabilityGate::new(config.capability.clone());
        Self {
            config,
            directory,
            router: TransportRouter::new(message_transport, data_transport),
            gate,
            pairing: Mutex::new(PairingHandler::new()),
            local_id: RwLock::new(None),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Resolve the local identity and clear stale shared-state records
    ///
    /// A missing identity is retried on the next operation that needs it. A
    /// failed cleanup is logged and leaves the stale records in place.
    pub async fn initialize(&self) {
        match self.local_node().await {
            Some(id) => info!("WearLink initialized as {}", id),
            None => warn!("WearLink initialized without a local identity"),
        }

        if !self.config.clear_data_items_on_init {
            return;
        }

        let _pairing = self.pairing.lock().await;
        let stale = match self.router.list().await {
            Ok(stale) => stale,
            Err(e) => {
                warn!("Failed to list stale shared-state records: {}", e);
                return;
            }
        };
        if !stale.is_empty() {
            info!("Deleting {} stale shared-state record(s)", stale.len());
        }
        for handle in stale {
            if let Err(e) = self.router.delete(&handle).await {
                warn!("Failed to delete stale record {}: {}", handle, e);
            }
        }
    }

    /// Local identity, querying the directory if not yet known
    pub async fn local_node(&self) -> Option<NodeId> {
        if let Some(id) = self.local_id.read().await.as_ref() {
            return Some(id.clone());
        }

        let lookup = timeout(self.config.directory_timeout(), self.directory.local_node())
            .await
            .unwrap_or_else(|_| Err(ProtocolError::Timeout("local identity lookup".to_string())));
        match lookup {
            Ok(id) => {
                debug!("Resolved local identity {}", id);
                *self.local_id.write().await = Some(id.clone());
                Some(id)
            }
            Err(e) => {
                debug!("Local identity unavailable: {}", e);
                None
            }
        }
    }

    pub async fn add_listener(&self, listener: Arc<dyn WearEventListener>) -> bool {
        self.listeners.add(listener).await
    }

    pub async fn remove_listener(&self, listener: &Arc<dyn WearEventListener>) -> bool {
        self.listeners.remove(listener).await
    }

    /// Receive every dispatched event on a channel
    ///
    /// The subscription ends when the receiver is dropped.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<WearEvent> {
        let (listener, rx) = ChannelListener::new();
        self.listeners.add(Arc::new(listener)).await;
        rx
    }

    /// Current state of `slot`
    pub async fn slot_state(&self, slot: u32) -> SlotState {
        self.pairing.lock().await.state(slot)
    }

    pub async fn paired_peer(&self, slot: u32) -> Option<NodeId> {
        self.pairing.lock().await.paired_peer(slot).cloned()
    }

    pub async fn pending_requester(&self) -> Option<NodeId> {
        self.pairing.lock().await.pending_requester().cloned()
    }

    /// Query the directory and dispatch `NODES_AVAILABLE` or `NODES_UNAVAILABLE`
    pub async fn check_available_nodes(&self) {
        let pairing = self.pairing.lock().await;
        let event = self.availability(&pairing.paired_peers()).await;
        self.listeners.dispatch(&event).await;
    }

    /// Re-evaluate availability from a directory capability notification
    pub async fn on_capability_changed(&self, reachable: HashSet<NodeId>) {
        let pairing = self.pairing.lock().await;
        let event = self.gate.evaluate(&reachable, &pairing.paired_peers());
        self.listeners.dispatch(&event).await;
    }

    /// Broadcast a pair request for `slot`
    pub async fn request_pair(&self, target_controller: &str, slot: u32) {
        let Some(local) = self.local_node().await else {
            warn!("Cannot request pair for slot {}: {}", slot, ProtocolError::IdentityUnavailable);
            return;
        };

        let mut pairing = self.pairing.lock().await;
        let actions = pairing.request_pair(target_controller, slot);
        self.execute(&mut pairing, Some(&local), actions).await;
    }

    /// Answer the last pair request received
    pub async fn respond_to_pair(&self, slot: u32) {
        let Some(local) = self.local_node().await else {
            warn!("Cannot respond on slot {}: {}", slot, ProtocolError::IdentityUnavailable);
            return;
        };

        let mut pairing = self.pairing.lock().await;
        let actions = pairing.respond_to_pair(slot);
        self.execute(&mut pairing, Some(&local), actions).await;
    }

    /// Confirm the response held for `slot`
    pub async fn accept_pair(&self, controller_type: ControllerType, slot: u32) {
        let local = self.local_node().await;
        let mut pairing = self.pairing.lock().await;
        let actions = pairing.accept_pair(controller_type, slot);
        self.execute(&mut pairing, local.as_ref(), actions).await;
    }

    /// Decline the last pair request received
    pub async fn reject_pair(&self, slot: u32) {
        let local = self.local_node().await;
        let mut pairing = self.pairing.lock().await;
        let actions = pairing.reject_pair(slot);
        self.execute(&mut pairing, local.as_ref(), actions).await;
    }

    /// Reset `slot` to unpaired, notifying the former counterpart
    pub async fn disconnect(&self, slot: u32) {
        let local = self.local_node().await;
        let mut pairing = self.pairing.lock().await;
        let actions = pairing.disconnect(slot);
        self.execute(&mut pairing, local.as_ref(), actions).await;
    }

    pub async fn pause_game(&self) -> Result<DeliveryHandle> {
        self.send(WearEvent::pause_game()).await
    }

    pub async fn unpause_game(&self) -> Result<DeliveryHandle> {
        self.send(WearEvent::unpause_game()).await
    }

    pub async fn restart_game(&self) -> Result<DeliveryHandle> {
        self.send(WearEvent::restart_game()).await
    }

    /// Send a gameplay event
    ///
    /// Goes directly to the slot's partner when the event's slot is paired,
    /// and is published as shared state otherwise.
    ///
    /// # Errors
    ///
    /// `InvalidEvent` for pairing kinds, which only the pairing operations
    /// may send; `IdentityUnavailable` when publishing without a local
    /// identity; transport failures as reported.
    pub async fn send_update(&self, event: WearEvent) -> Result<DeliveryHandle> {
        if event.kind().is_protocol() {
            return Err(ProtocolError::invalid_event(format!(
                "{} can only be sent by the pairing operations",
                event.kind()
            )));
        }
        self.send(event).await
    }

    async fn send(&self, event: WearEvent) -> Result<DeliveryHandle> {
        let local = self
            .local_node()
            .await
            .ok_or(ProtocolError::IdentityUnavailable)?;

        let pairing = self.pairing.lock().await;
        let paired_to = event.player_num.and_then(|slot| pairing.paired_peer(slot));
        let path = self.config.paths.for_kind(event.kind());
        self.router
            .route_outbound(&event, path, paired_to, &local)
            .await
    }

    /// Inbound direct message from the platform
    ///
    /// Dropped while the local identity is unresolved, since messages from
    /// this node cannot be recognized yet.
    pub async fn on_message_received(&self, source: &NodeId, path: &str, data: &[u8]) {
        let Some(local) = self.local_node().await else {
            debug!("Dropping message on {} from {}: no local identity", path, source);
            return;
        };
        let Some(inbound) = self.router.normalize_message(source, path, data, &local) else {
            return;
        };

        let mut pairing = self.pairing.lock().await;
        let actions = Self::feed(&mut pairing, inbound);
        self.execute(&mut pairing, Some(&local), actions).await;
    }

    /// Inbound shared-state change notifications from the platform
    ///
    /// Dropped while the local identity is unresolved, since this node's own
    /// records cannot be recognized yet.
    pub async fn on_data_changed(&self, changes: Vec<DataChange>) {
        let Some(local) = self.local_node().await else {
            debug!("Dropping {} shared-state change(s): no local identity", changes.len());
            return;
        };
        let inbound: Vec<InboundEvent> = changes
            .iter()
            .filter_map(|change| self.router.normalize_data_change(change, &local))
            .collect();
        if inbound.is_empty() {
            return;
        }

        let mut pairing = self.pairing.lock().await;
        for event in inbound {
            let actions = Self::feed(&mut pairing, event);
            self.execute(&mut pairing, Some(&local), actions).await;
        }
    }

    /// Reset handshakes older than the configured timeout
    ///
    /// Does nothing when no handshake timeout is configured.
    pub async fn expire_stale_handshakes(&self) {
        let Some(limit) = self.config.handshake_timeout() else {
            return;
        };

        let local = self.local_node().await;
        let mut pairing = self.pairing.lock().await;
        let actions = pairing.expire_handshakes(Instant::now(), limit);
        self.execute(&mut pairing, local.as_ref(), actions).await;
    }

    /// Run [`LinkService::expire_stale_handshakes`] periodically
    ///
    /// Returns `None` when no handshake timeout is configured. The task ends
    /// once the service is dropped.
    pub fn spawn_handshake_expiry(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let limit = self.config.handshake_timeout()?;
        let period = (limit / 2).max(MIN_EXPIRY_INTERVAL);
        let service: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                service.expire_stale_handshakes().await;
            }
            debug!("Handshake expiry task stopped");
        }))
    }

    fn feed(pairing: &mut PairingHandler, inbound: InboundEvent) -> Vec<PairingAction> {
        let InboundEvent {
            source,
            event,
            transport_type,
        } = inbound;
        pairing.handle_inbound(&source, event, transport_type)
    }

    async fn availability(&self, paired: &HashSet<NodeId>) -> WearEvent {
        let limit = self.config.directory_timeout();
        let query = self.directory.capable_nodes(self.gate.capability());
        let reachable = timeout(limit, query).await.unwrap_or_else(|_| {
            Err(ProtocolError::Timeout(format!(
                "node directory query exceeded {:?}",
                limit
            )))
        });

        match reachable {
            Ok(reachable) => self.gate.evaluate(&reachable, paired),
            Err(e) => {
                warn!("Node availability unknown: {}", e);
                self.gate.unavailable()
            }
        }
    }

    /// Carry out state machine actions in order
    async fn execute(
        &self,
        pairing: &mut PairingHandler,
        local: Option<&NodeId>,
        actions: Vec<PairingAction>,
    ) {
        let mut queue: VecDeque<PairingAction> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                PairingAction::SendDirect { peer, event } => {
                    let path = self.config.paths.for_kind(event.kind());
                    if let Err(e) = self.router.send_direct(&peer, &event, path).await {
                        warn!("Failed to send {} to {}: {}", event.kind(), peer, e);
                    }
                }
                PairingAction::PublishRequest { slot, event } => {
                    let path = self.config.paths.for_kind(event.kind());
                    let published = match local {
                        Some(local) => self.router.publish(&event, path, local).await,
                        None => Err(ProtocolError::IdentityUnavailable),
                    };
                    match published {
                        Ok(handle) => pairing.record_outstanding_request(slot, handle),
                        Err(e) => {
                            warn!("Failed to publish pair request for slot {}: {}", slot, e);
                            queue.extend(pairing.abort_request(slot));
                        }
                    }
                }
                PairingAction::DeleteArtifact(handle) => {
                    if let Err(e) = self.router.delete(&handle).await {
                        warn!("Failed to delete {}: {}", handle, e);
                    }
                }
                PairingAction::Dispatch(event) => {
                    self.listeners.dispatch(&event).await;
                }
                PairingAction::CheckAvailability => {
                    let event = self.availability(&pairing.paired_peers()).await;
                    self.listeners.dispatch(&event).await;
                }
            }
        }
    }
}
