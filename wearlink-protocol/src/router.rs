//! Transport Router
//!
//! Single send path over the two transports, and the normalization of their
//! inbound notifications into one stream.
//!
//! ## Architecture
//!
//! ```text
//! TransportRouter
//!   ├── MessageTransport   (slot has a confirmed partner)
//!   └── DataTransport      (no known destination: publish under own identity)
//! ```
//!
//! ## Transport Selection
//!
//! An outbound event goes by direct message when the caller supplies the
//! confirmed partner of its slot, and is otherwise published as a shared-state
//! record owned by the local node. Callers never inspect pairing state
//! themselves; they pass what they know and the router picks.

use crate::node::NodeId;
use crate::transport::{
    ArtifactHandle, DataChange, DataItem, DataTransport, DeliveryHandle, MessageTransport,
    TransportType,
};
use crate::{ProtocolError, Result, WearEvent};
use std::sync::Arc;
use tracing::{debug, warn};

/// Inbound event after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Node the event came from
    pub source: NodeId,

    /// Decoded envelope
    pub event: WearEvent,

    /// Transport the event arrived on
    pub transport_type: TransportType,
}

/// Router over the direct-message and shared-state transports
#[derive(Debug, Clone)]
pub struct TransportRouter {
    messages: Arc<dyn MessageTransport>,
    data: Arc<dyn DataTransport>,
}

impl TransportRouter {
    pub fn new(messages: Arc<dyn MessageTransport>, data: Arc<dyn DataTransport>) -> Self {
        Self { messages, data }
    }

    /// Deliver `event` on `path`
    ///
    /// `paired_to` is the confirmed partner of the event's slot, if any. The
    /// returned handle names the shared-state record to delete for cleanup;
    /// it carries nothing for direct messages.
    pub async fn route_outbound(
        &self,
        event: &WearEvent,
        path: &str,
        paired_to: Option<&NodeId>,
        local_id: &NodeId,
    ) -> Result<DeliveryHandle> {
        match paired_to {
            Some(peer) => {
                self.send_direct(peer, event, path).await?;
                Ok(DeliveryHandle::Message)
            }
            None => {
                let handle = self.publish(event, path, local_id).await?;
                Ok(DeliveryHandle::DataItem(handle))
            }
        }
    }

    /// Send `event` to `peer` as a direct message
    pub async fn send_direct(&self, peer: &NodeId, event: &WearEvent, path: &str) -> Result<()> {
        let data = event.to_bytes();
        if data.is_empty() {
            return Err(ProtocolError::invalid_event(format!(
                "{} event could not be encoded",
                event.kind()
            )));
        }

        debug!("Sending {} to {} on {}", event.kind(), peer, path);
        self.messages.send_message(peer, path, data).await
    }

    /// Publish `event` as a shared-state record owned by `local_id`
    ///
    /// Slot-scoped events get their own record per slot so that cleaning up
    /// one slot's request never removes another's. The envelope's `uri` is
    /// stamped with the record handle before encoding.
    pub async fn publish(
        &self,
        event: &WearEvent,
        path: &str,
        local_id: &NodeId,
    ) -> Result<ArtifactHandle> {
        let record_path = match event.player_num {
            Some(slot) => format!("{}/{}", path, slot),
            None => path.to_string(),
        };
        let uri = self.data.artifact_uri(local_id, &record_path);

        let stamped = event.clone().with_uri(uri.as_str());
        let encoded = stamped.serialize();
        if encoded.is_empty() {
            return Err(ProtocolError::invalid_event(format!(
                "{} event could not be encoded",
                event.kind()
            )));
        }

        debug!("Publishing {} as {}", event.kind(), uri);
        self.data
            .put_data_item(&uri, DataItem::new(encoded, local_id.clone()))
            .await?;
        Ok(uri)
    }

    /// Delete a previously published record
    pub async fn delete(&self, handle: &ArtifactHandle) -> Result<()> {
        debug!("Deleting shared-state record {}", handle);
        self.data.delete_data_item(handle).await
    }

    /// Handles of every shared-state record visible to this node
    pub async fn list(&self) -> Result<Vec<ArtifactHandle>> {
        self.data.list_data_items().await
    }

    /// Normalize an inbound direct message
    ///
    /// Returns `None` for undecodable payloads and for messages that claim to
    /// come from this node.
    pub fn normalize_message(
        &self,
        source: &NodeId,
        path: &str,
        data: &[u8],
        local_id: &NodeId,
    ) -> Option<InboundEvent> {
        if source == local_id {
            debug!("Ignoring message on {} from this node", path);
            return None;
        }

        match WearEvent::from_bytes(data) {
            Ok(event) => Some(InboundEvent {
                source: source.clone(),
                event,
                transport_type: TransportType::Message,
            }),
            Err(e) => {
                warn!("Dropping message on {} from {}: {}", path, source, e);
                None
            }
        }
    }

    /// Normalize a shared-state change notification
    ///
    /// Deletions, self-published records, empty records and undecodable
    /// envelopes yield `None`. The envelope's `uri` is replaced with the
    /// handle the record was observed under.
    pub fn normalize_data_change(
        &self,
        change: &DataChange,
        local_id: &NodeId,
    ) -> Option<InboundEvent> {
        let (uri, item) = match change {
            DataChange::Changed { uri, item } => (uri, item),
            DataChange::Deleted { uri } => {
                debug!("Ignoring deletion of {}", uri);
                return None;
            }
        };

        if item.node_id == *local_id {
            return None;
        }
        if item.event.trim().is_empty() {
            debug!("Skipping record {} without an event", uri);
            return None;
        }

        match WearEvent::deserialize(&item.event) {
            Ok(mut event) => {
                event.uri = Some(uri.to_string());
                Some(InboundEvent {
                    source: item.node_id.clone(),
                    event,
                    transport_type: TransportType::DataItem,
                })
            }
            Err(e) => {
                warn!("Dropping record {} from {}: {}", uri, item.node_id, e);
                None
            }
        }
    }
}
