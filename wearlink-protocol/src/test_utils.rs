//! Test doubles for the node directory and both transports

use crate::node::{NodeDirectory, NodeId};
use crate::transport::{ArtifactHandle, DataItem, DataTransport, MessageTransport};
use crate::{ProtocolError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Directory with a settable identity, peer set and failure mode
#[derive(Debug, Default)]
pub struct MockDirectory {
    local: Mutex<Option<NodeId>>,
    peers: Mutex<HashSet<NodeId>>,
    delay: Mutex<Option<Duration>>,
    fail: AtomicBool,
}

impl MockDirectory {
    pub fn new(local: Option<&str>) -> Self {
        let directory = Self::default();
        directory.set_local(local);
        directory
    }

    pub fn set_local(&self, local: Option<&str>) {
        *self.local.lock().unwrap() = local.map(NodeId::from);
    }

    pub fn set_peers(&self, peers: &[&str]) {
        *self.peers.lock().unwrap() = peers.iter().map(|p| NodeId::from(*p)).collect();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeDirectory for MockDirectory {
    async fn local_node(&self) -> Result<NodeId> {
        self.local
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProtocolError::IdentityUnavailable)
    }

    async fn capable_nodes(&self, _capability: &str) -> Result<HashSet<NodeId>> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProtocolError::Directory("mock directory offline".to_string()));
        }
        Ok(self.peers.lock().unwrap().clone())
    }
}

/// Message transport that records every send
#[derive(Debug, Default)]
pub struct MockMessageTransport {
    sent: Mutex<Vec<(NodeId, String, Vec<u8>)>>,
}

impl MockMessageTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(NodeId, String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for MockMessageTransport {
    async fn send_message(&self, destination: &NodeId, path: &str, data: Vec<u8>) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.clone(), path.to_string(), data));
        Ok(())
    }
}

/// In-memory shared-state store
#[derive(Debug, Default)]
pub struct MockDataTransport {
    items: Mutex<HashMap<ArtifactHandle, DataItem>>,
    fail_puts: AtomicBool,
}

impl MockDataTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> HashMap<ArtifactHandle, DataItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn insert(&self, uri: ArtifactHandle, item: DataItem) {
        self.items.lock().unwrap().insert(uri, item);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataTransport for MockDataTransport {
    async fn put_data_item(&self, uri: &ArtifactHandle, item: DataItem) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ProtocolError::transport("mock put failure"));
        }
        self.items.lock().unwrap().insert(uri.clone(), item);
        Ok(())
    }

    async fn delete_data_item(&self, uri: &ArtifactHandle) -> Result<()> {
        self.items.lock().unwrap().remove(uri);
        Ok(())
    }

    async fn list_data_items(&self) -> Result<Vec<ArtifactHandle>> {
        Ok(self.items.lock().unwrap().keys().cloned().collect())
    }
}
