//! Error handling for the WearLink protocol
//!
//! This module provides the error type shared by every protocol operation.
//! Errors are automatically converted from underlying library errors using `thiserror`.
//!
//! ## Where errors surface
//!
//! Almost nothing in this crate returns an error to the embedding application.
//! Pairing operations and inbound notifications degrade to "no state change,
//! optionally notify listeners". The places that do return [`Result`] are:
//!
//! - Envelope parsing ([`crate::WearEvent::deserialize`])
//! - Configuration loading and saving ([`crate::LinkConfig`])
//! - Outbound sends ([`crate::LinkService::send_update`] and the game
//!   controls), which report the [`crate::DeliveryHandle`] used
//! - The transport and directory traits implemented by the embedder
//!
//! ### Error Propagation
//!
//! ```rust
//! use wearlink_protocol::{Result, WearEvent};
//!
//! fn parse_all(lines: &[&str]) -> Result<Vec<WearEvent>> {
//!     lines.iter().map(|l| WearEvent::deserialize(l)).collect()
//! }
//! ```
//!
//! ### Logging Errors
//!
//! Transport failures are logged with `tracing` and swallowed by the service:
//!
//! ```rust,ignore
//! if let Err(e) = router.delete(&handle).await {
//!     warn!("Failed to delete artifact {}: {}", handle, e);
//! }
//! ```

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during protocol operations
///
/// # Examples
///
/// ```rust
/// use wearlink_protocol::ProtocolError;
///
/// let error = ProtocolError::InvalidEvent("missing eventType".to_string());
/// assert_eq!(error.to_string(), "Invalid event: missing eventType");
/// ```
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// I/O error (configuration files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error while reading configuration
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error while writing configuration
    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Envelope could not be decoded
    ///
    /// Raised when the `eventType` discriminator is missing or unknown, or
    /// when a field required by that discriminator is missing or malformed.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Direct-message or shared-state transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Node directory query failure
    #[error("Directory error: {0}")]
    Directory(String),

    /// A bounded operation ran out of time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local node identity has not been resolved yet
    #[error("Local node identity unavailable")]
    IdentityUnavailable,
}

impl ProtocolError {
    /// Check if the error is transient and the operation may succeed later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Transport(_)
                | ProtocolError::Directory(_)
                | ProtocolError::Timeout(_)
                | ProtocolError::IdentityUnavailable
                | ProtocolError::Io(_)
        )
    }

    /// Get a message suitable for showing to a player
    pub fn user_message(&self) -> String {
        match self {
            ProtocolError::IdentityUnavailable => {
                "This device is not connected yet. Try again in a moment.".to_string()
            }
            ProtocolError::Timeout(msg) => {
                format!("Timed out: {}. Check that the watch is nearby.", msg)
            }
            ProtocolError::Transport(msg) => {
                format!("Connection error: {}.", msg)
            }
            ProtocolError::Directory(msg) => {
                format!("Could not look up nearby devices: {}.", msg)
            }
            ProtocolError::InvalidEvent(msg) => {
                format!("Invalid data received: {}.", msg)
            }
            ProtocolError::Config(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            ProtocolError::TomlDe(e) => {
                format!("Configuration file is malformed: {}.", e)
            }
            ProtocolError::TomlSer(e) => {
                format!("Configuration could not be saved: {}.", e)
            }
            ProtocolError::Io(e) => {
                format!("I/O error: {}.", e)
            }
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        ProtocolError::Transport(msg.into())
    }

    /// Create an invalid event error
    pub fn invalid_event(msg: impl Into<String>) -> Self {
        ProtocolError::InvalidEvent(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ProtocolError::InvalidEvent("bad format".to_string());
        assert_eq!(error.to_string(), "Invalid event: bad format");

        let error = ProtocolError::IdentityUnavailable;
        assert_eq!(error.to_string(), "Local node identity unavailable");
    }

    #[test]
    fn test_io_error_conversion() {
        use std::io::{Error, ErrorKind};

        let io_error = Error::new(ErrorKind::NotFound, "file not found");
        let protocol_error: ProtocolError = io_error.into();

        assert!(matches!(protocol_error, ProtocolError::Io(_)));
        assert!(protocol_error.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_error = toml::from_str::<toml::Value>("capability = [").unwrap_err();
        let protocol_error: ProtocolError = toml_error.into();

        assert!(matches!(protocol_error, ProtocolError::TomlDe(_)));
        assert!(protocol_error.user_message().contains("malformed"));
    }

    #[test]
    fn test_recoverable() {
        assert!(ProtocolError::transport("send failed").is_recoverable());
        assert!(ProtocolError::IdentityUnavailable.is_recoverable());
        assert!(!ProtocolError::invalid_event("nope").is_recoverable());
        assert!(!ProtocolError::Config("bad path".to_string()).is_recoverable());
    }

    #[test]
    fn test_user_message() {
        let msg = ProtocolError::Timeout("directory query".to_string()).user_message();
        assert!(msg.contains("directory query"));
        assert!(msg.contains("nearby"));
    }
}
