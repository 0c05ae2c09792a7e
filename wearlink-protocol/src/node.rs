//! Node identities and the node directory
//!
//! The node directory is the platform service that knows which peers are
//! reachable and what they advertise. This crate never discovers peers
//! itself; the embedding application implements [`NodeDirectory`] on top of
//! whatever the platform provides.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Capability advertised by nodes that can act as wearable controllers
pub const WEAR_CONTROL_CAPABILITY: &str = "wear_control_support";

/// Transport-level identity of a node
///
/// Identities are trusted as reported by the transport; they are compared
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Platform node directory
#[async_trait]
pub trait NodeDirectory: Send + Sync + fmt::Debug {
    /// Identity of the local node
    ///
    /// # Errors
    ///
    /// May fail while the platform is still starting up; callers retry on
    /// their next operation.
    async fn local_node(&self) -> Result<NodeId>;

    /// Reachable nodes currently advertising `capability`
    async fn capable_nodes(&self, capability: &str) -> Result<HashSet<NodeId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new("a1b2c3");
        assert_eq!(id.to_string(), "a1b2c3");
        assert_eq!(id.as_str(), "a1b2c3");
        assert_eq!(NodeId::from("a1b2c3"), id);
    }

    #[test]
    fn test_node_id_serializes_as_plain_string() {
        let id = NodeId::from("watch-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"watch-7\"");
    }
}
