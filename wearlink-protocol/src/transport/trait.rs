//! Transport Trait Abstraction
//!
//! Defines the two interchangeable transports events travel over:
//!
//! - **Direct messaging**: low latency, no persistence, needs a known peer
//! - **Shared state**: durable key/value records replicated to every node,
//!   observable without an established link
//!
//! Both are implemented by the embedding application.

use crate::node::NodeId;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Point-to-point message to a known node
    Message,

    /// Replicated shared-state record
    DataItem,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Message => write!(f, "message"),
            TransportType::DataItem => write!(f, "data-item"),
        }
    }
}

/// Reference to a published shared-state record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of routing one outbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryHandle {
    /// Sent as a direct message; nothing to clean up
    Message,

    /// Published as a shared-state record that can later be deleted
    DataItem(ArtifactHandle),
}

impl DeliveryHandle {
    /// Artifact to delete for cleanup, if any
    pub fn artifact(&self) -> Option<&ArtifactHandle> {
        match self {
            DeliveryHandle::Message => None,
            DeliveryHandle::DataItem(handle) => Some(handle),
        }
    }

    pub fn transport_type(&self) -> TransportType {
        match self {
            DeliveryHandle::Message => TransportType::Message,
            DeliveryHandle::DataItem(_) => TransportType::DataItem,
        }
    }
}

/// Shared-state record carrying one envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    /// Publish time, UNIX milliseconds
    #[serde(rename = "com.wearcontrolgames.unitywearapi.timestamp")]
    pub timestamp: i64,

    /// Serialized [`crate::WearEvent`]
    #[serde(rename = "com.wearcontrolgames.unitywearapi.event", default)]
    pub event: String,

    /// Node that published the record
    #[serde(rename = "com.wearcontrolgames.unitywearapi.node_id")]
    pub node_id: NodeId,
}

impl DataItem {
    /// Creates a record stamped with the current time
    pub fn new(event: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            timestamp: current_timestamp(),
            event: event.into(),
            node_id,
        }
    }
}

/// Change notification from the shared-state transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChange {
    /// A record was created or replaced
    Changed { uri: ArtifactHandle, item: DataItem },

    /// A record was removed
    Deleted { uri: ArtifactHandle },
}

/// Direct-message transport
#[async_trait]
pub trait MessageTransport: Send + Sync + Debug {
    /// Send `data` to `destination` on `path`
    ///
    /// Returns once the message is enqueued; delivery is not confirmed.
    async fn send_message(&self, destination: &NodeId, path: &str, data: Vec<u8>) -> Result<()>;
}

/// Shared-state replication transport
#[async_trait]
pub trait DataTransport: Send + Sync + Debug {
    /// Handle a record published by `owner` on `path` will be stored under
    fn artifact_uri(&self, owner: &NodeId, path: &str) -> ArtifactHandle {
        ArtifactHandle::new(format!("wear://{}{}", owner, path))
    }

    /// Create or replace the record at `uri`
    async fn put_data_item(&self, uri: &ArtifactHandle, item: DataItem) -> Result<()>;

    /// Delete the record at `uri`
    async fn delete_data_item(&self, uri: &ArtifactHandle) -> Result<()>;

    /// Handles of every record currently visible to this node
    async fn list_data_items(&self) -> Result<Vec<ArtifactHandle>>;
}

/// Generate current UNIX timestamp in milliseconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NullData;

    #[async_trait]
    impl DataTransport for NullData {
        async fn put_data_item(&self, _uri: &ArtifactHandle, _item: DataItem) -> Result<()> {
            Ok(())
        }

        async fn delete_data_item(&self, _uri: &ArtifactHandle) -> Result<()> {
            Ok(())
        }

        async fn list_data_items(&self) -> Result<Vec<ArtifactHandle>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_default_artifact_uri() {
        let uri = NullData.artifact_uri(&NodeId::from("host-1"), "/pair_request");
        assert_eq!(uri.as_str(), "wear://host-1/pair_request");
    }

    #[test]
    fn test_data_item_keys() {
        let item = DataItem {
            timestamp: 42,
            event: "{}".to_string(),
            node_id: NodeId::from("host-1"),
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["com.wearcontrolgames.unitywearapi.timestamp"], 42);
        assert_eq!(value["com.wearcontrolgames.unitywearapi.event"], "{}");
        assert_eq!(value["com.wearcontrolgames.unitywearapi.node_id"], "host-1");
    }

    #[test]
    fn test_delivery_handle_artifact() {
        assert_eq!(DeliveryHandle::Message.artifact(), None);
        let handle = ArtifactHandle::new("wear://n/update");
        let delivery = DeliveryHandle::DataItem(handle.clone());
        assert_eq!(delivery.artifact(), Some(&handle));
        assert_eq!(delivery.transport_type(), TransportType::DataItem);
    }

    #[test]
    fn test_transport_type_display() {
        assert_eq!(TransportType::Message.to_string(), "message");
        assert_eq!(TransportType::DataItem.to_string(), "data-item");
    }
}
