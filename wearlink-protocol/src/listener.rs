//! Listener Dispatch
//!
//! Fans accepted events out to registered observers, synchronously and in
//! registration order.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use wearlink_protocol::listener::{ListenerRegistry, WearEventListener};
//! use wearlink_protocol::{Result, WearEvent};
//!
//! #[derive(Debug)]
//! struct Logger;
//!
//! impl WearEventListener for Logger {
//!     fn on_event(&self, event: &WearEvent) -> Result<()> {
//!         println!("{}", event.kind());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = ListenerRegistry::new();
//!     let logger: Arc<dyn WearEventListener> = Arc::new(Logger);
//!     registry.add(logger.clone()).await;
//!     registry.dispatch(&WearEvent::pause_game()).await;
//! }
//! ```

use crate::{ProtocolError, Result, WearEvent};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Observer of accepted events
///
/// Called from inside the link's serialized section, so implementations must
/// not block. Hand work off to a task or channel instead.
pub trait WearEventListener: Send + Sync + Debug {
    /// Handle one event
    ///
    /// An error is logged and does not stop delivery to later listeners.
    fn on_event(&self, event: &WearEvent) -> Result<()>;

    /// Whether this listener still wants events
    ///
    /// Inactive listeners are dropped from the registry after a dispatch.
    fn is_active(&self) -> bool {
        true
    }
}

/// Ordered, duplicate-free set of listeners
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn WearEventListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; returns `false` if it was already registered
    pub async fn add(&self, listener: Arc<dyn WearEventListener>) -> bool {
        let mut listeners = self.listeners.write().await;
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            debug!("Listener already registered");
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Unregister `listener`; returns `false` if it was not registered
    pub async fn remove(&self, listener: &Arc<dyn WearEventListener>) -> bool {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub async fn len(&self) -> usize {
        self.listeners.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listeners.read().await.is_empty()
    }

    /// Deliver `event` to every listener in registration order
    ///
    /// Listeners added or removed during delivery take effect from the next
    /// dispatch.
    pub async fn dispatch(&self, event: &WearEvent) {
        let snapshot: Vec<Arc<dyn WearEventListener>> = self.listeners.read().await.clone();
        debug!("Dispatching {} to {} listener(s)", event.kind(), snapshot.len());

        let mut stale = false;
        for listener in &snapshot {
            if let Err(e) = listener.on_event(event) {
                warn!("Listener {:?} failed on {}: {}", listener, event.kind(), e);
            }
            stale |= !listener.is_active();
        }

        if stale {
            self.listeners.write().await.retain(|l| l.is_active());
        }
    }
}

/// Listener that forwards events into an unbounded channel
#[derive(Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<WearEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiver it feeds
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WearEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl WearEventListener for ChannelListener {
    fn on_event(&self, event: &WearEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| ProtocolError::transport("event subscriber dropped"))
    }

    fn is_active(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl WearEventListener for Recorder {
        fn on_event(&self, event: &WearEvent) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.kind()));
            if self.fail {
                Err(ProtocolError::transport("listener failure"))
            } else {
                Ok(())
            }
        }
    }

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
        fail: bool,
    ) -> Arc<dyn WearEventListener> {
        Arc::new(Recorder {
            name,
            log: log.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder("a", &log, false);

        assert!(registry.add(listener.clone()).await);
        assert!(!registry.add(listener.clone()).await);
        assert_eq!(registry.len().await, 1);

        registry.dispatch(&WearEvent::gesture()).await;
        assert_eq!(*log.lock().unwrap(), vec!["a:GESTURE"]);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder("a", &log, false);

        assert!(!registry.remove(&listener).await);
        registry.add(listener.clone()).await;
        assert!(registry.remove(&listener).await);
        assert!(registry.is_empty().await);

        registry.dispatch(&WearEvent::gesture()).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_delivery() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(recorder("first", &log, false)).await;
        registry.add(recorder("broken", &log, true)).await;
        registry.add(recorder("last", &log, false)).await;

        registry.dispatch(&WearEvent::restart_game()).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:RESTART_GAME", "broken:RESTART_GAME", "last:RESTART_GAME"]
        );
    }

    #[tokio::test]
    async fn test_channel_listener() {
        let registry = ListenerRegistry::new();
        let (listener, mut rx) = ChannelListener::new();
        registry.add(Arc::new(listener)).await;

        registry.dispatch(&WearEvent::pause_game()).await;
        assert_eq!(rx.recv().await.unwrap().kind(), EventType::PauseGame);

        drop(rx);
        registry.dispatch(&WearEvent::pause_game()).await;
        assert!(registry.is_empty().await);
    }
}
