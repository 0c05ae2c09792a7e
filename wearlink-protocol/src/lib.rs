//! WearLink Protocol Implementation
//!
//! This library pairs a game host with wearable controllers and carries
//! typed game events between them over two interchangeable transports: direct
//! messages to a known peer, and replicated shared-state records.
//!
//! The platform supplies the node directory and both transports through the
//! traits in [`node`] and [`transport`]; [`LinkService`] ties them to the
//! pairing state machine and the listener registry.

pub mod availability;
pub mod config;
pub mod event;
pub mod listener;
pub mod node;
pub mod pairing;
pub mod router;
pub mod service;
pub mod transport;

mod error;

pub use availability::AvailabilityGate;
pub use config::{EventPaths, LinkConfig};
pub use error::{ProtocolError, Result};
pub use event::{ControllerType, EventPayload, EventType, WearEvent};
pub use listener::{ChannelListener, ListenerRegistry, WearEventListener};
pub use node::{NodeDirectory, NodeId, WEAR_CONTROL_CAPABILITY};
pub use pairing::{PairingAction, PairingHandler, SlotState};
pub use router::{InboundEvent, TransportRouter};
pub use service::LinkService;
pub use transport::{
    current_timestamp, ArtifactHandle, DataChange, DataItem, DataTransport, DeliveryHandle,
    MessageTransport, TransportType,
};

#[cfg(test)]
pub mod test_utils;
