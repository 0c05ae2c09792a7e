//! WearLink Transport Layer
//!
//! This module provides the transport abstractions events travel over.
//! Concrete transports are supplied by the embedding application through the
//! [`MessageTransport`] and [`DataTransport`] traits.

mod r#trait;

pub use r#trait::{
    current_timestamp, ArtifactHandle, DataChange, DataItem, DataTransport, DeliveryHandle,
    MessageTransport, TransportType,
};
