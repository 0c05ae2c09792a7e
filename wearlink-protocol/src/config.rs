//! Link Configuration
//!
//! Configuration for the pairing and routing layer, stored as TOML.
//!
//! ```toml
//! capability = "wear_control_support"
//! directory_timeout_ms = 2000
//! handshake_timeout_secs = 30
//! clear_data_items_on_init = true
//!
//! [paths]
//! pair_request = "/pair_request"
//! update = "/update"
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use crate::node::WEAR_CONTROL_CAPABILITY;
use crate::{EventType, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "wearlink.toml";

/// Link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Capability peers must advertise to count as available
    #[serde(default = "default_capability")]
    pub capability: String,

    /// Upper bound on a node directory query, in milliseconds
    #[serde(default = "default_directory_timeout_ms")]
    pub directory_timeout_ms: u64,

    /// Handshakes older than this are reset by `expire_stale_handshakes`
    ///
    /// Unset means handshakes never expire on their own and need an explicit
    /// disconnect or an inbound rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_timeout_secs: Option<u64>,

    /// Delete every visible shared-state record during `initialize`
    #[serde(default = "default_true")]
    pub clear_data_items_on_init: bool,

    /// Paths events are sent on
    #[serde(default)]
    pub paths: EventPaths,
}

/// Transport paths per event kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPaths {
    #[serde(default = "default_pair_request_path")]
    pub pair_request: String,

    #[serde(default = "default_pair_response_path")]
    pub pair_response: String,

    #[serde(default = "default_pair_accept_path")]
    pub pair_accept: String,

    #[serde(default = "default_pair_reject_path")]
    pub pair_reject: String,

    #[serde(default = "default_disconnect_path")]
    pub disconnect: String,

    #[serde(default = "default_pause_path")]
    pub pause: String,

    #[serde(default = "default_resume_path")]
    pub resume: String,

    #[serde(default = "default_restart_path")]
    pub restart: String,

    /// Gameplay updates and every other kind
    #[serde(default = "default_update_path")]
    pub update: String,
}

fn default_capability() -> String {
    WEAR_CONTROL_CAPABILITY.to_string()
}

fn default_directory_timeout_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_pair_request_path() -> String {
    "/pair_request".to_string()
}

fn default_pair_response_path() -> String {
    "/pair_response".to_string()
}

fn default_pair_accept_path() -> String {
    "/pair_accept".to_string()
}

fn default_pair_reject_path() -> String {
    "/pair_reject".to_string()
}

fn default_disconnect_path() -> String {
    "/disconnect".to_string()
}

fn default_pause_path() -> String {
    "/pause".to_string()
}

fn default_resume_path() -> String {
    "/resume".to_string()
}

fn default_restart_path() -> String {
    "/restart".to_string()
}

fn default_update_path() -> String {
    "/update".to_string()
}

impl Default for EventPaths {
    fn default() -> Self {
        Self {
            pair_request: default_pair_request_path(),
            pair_response: default_pair_response_path(),
            pair_accept: default_pair_accept_path(),
            pair_reject: default_pair_reject_path(),
            disconnect: default_disconnect_path(),
            pause: default_pause_path(),
            resume: default_resume_path(),
            restart: default_restart_path(),
            update: default_update_path(),
        }
    }
}

impl EventPaths {
    /// Path an event of `kind` is sent on
    pub fn for_kind(&self, kind: EventType) -> &str {
        match kind {
            EventType::PairRequest => &self.pair_request,
            EventType::PairResponse => &self.pair_response,
            EventType::PairAccepted => &self.pair_accept,
            EventType::PairRejected => &self.pair_reject,
            EventType::Disconnect => &self.disconnect,
            EventType::PauseGame => &self.pause,
            EventType::UnpauseGame => &self.resume,
            EventType::RestartGame => &self.restart,
            EventType::PositionUpdate
            | EventType::Gesture
            | EventType::NodesAvailable
            | EventType::NodesUnavailable => &self.update,
        }
    }

    fn all(&self) -> [(&'static str, &str); 9] {
        [
            ("pair_request", &self.pair_request),
            ("pair_response", &self.pair_response),
            ("pair_accept", &self.pair_accept),
            ("pair_reject", &self.pair_reject),
            ("disconnect", &self.disconnect),
            ("pause", &self.pause),
            ("resume", &self.resume),
            ("restart", &self.restart),
            ("update", &self.update),
        ]
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            capability: default_capability(),
            directory_timeout_ms: default_directory_timeout_ms(),
            handshake_timeout_secs: None,
            clear_data_items_on_init: true,
            paths: EventPaths::default(),
        }
    }
}

impl LinkConfig {
    /// Default location: `<config dir>/wearlink/wearlink.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("wearlink")
            .join(CONFIG_FILE_NAME)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LinkConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded link configuration from {:?}", path);
        Ok(config)
    }

    /// Load from [`LinkConfig::default_path`]
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Write as pretty TOML, creating parent directories
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        debug!("Saved link configuration to {:?}", path);
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.capability.trim().is_empty() {
            return Err(ProtocolError::Config("capability must not be empty".to_string()));
        }
        if self.directory_timeout_ms == 0 {
            return Err(ProtocolError::Config(
                "directory_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.handshake_timeout_secs == Some(0) {
            return Err(ProtocolError::Config(
                "handshake_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        for (name, path) in self.paths.all() {
            if !path.starts_with('/') {
                return Err(ProtocolError::Config(format!(
                    "path '{}' for {} must start with '/'",
                    path, name
                )));
            }
        }
        Ok(())
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }
}
