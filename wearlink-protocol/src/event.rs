//! WearLink Event Envelope
//!
//! This module implements the envelope exchanged between a game host and its
//! wearable controllers. Envelopes are flat JSON objects whose `eventType`
//! discriminator decides which payload keys are present.
//!
//! ## Envelope Structure
//!
//! Every envelope contains:
//! - `eventType`: discriminator, e.g. `PAIR_REQUEST` or `POSITION_UPDATE`
//! - `playerNum`: (optional) slot the event concerns, omitted when unscoped
//! - `uri`: (optional) artifact the envelope was published under
//!
//! Plus kind-specific keys:
//! - `targetController` for `PAIR_REQUEST`
//! - `controllerType` for `PAIR_ACCEPTED`
//! - `posX` / `posY` for `POSITION_UPDATE`
//!
//! ```json
//! {"eventType":"POSITION_UPDATE","playerNum":1,"posX":0.25,"posY":-0.5}
//! ```
//!
//! Keys that do not belong to the discriminator are never written, and unknown
//! keys are ignored on read so older peers can talk to newer ones.

use crate::{ProtocolError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::error;

/// Event discriminator as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PairRequest,
    PairResponse,
    PairAccepted,
    PairRejected,
    Disconnect,
    PositionUpdate,
    Gesture,
    PauseGame,
    UnpauseGame,
    RestartGame,
    NodesAvailable,
    NodesUnavailable,
}

impl EventType {
    /// Every discriminator, in wire declaration order
    pub const ALL: [EventType; 12] = [
        EventType::PairRequest,
        EventType::PairResponse,
        EventType::PairAccepted,
        EventType::PairRejected,
        EventType::Disconnect,
        EventType::PositionUpdate,
        EventType::Gesture,
        EventType::PauseGame,
        EventType::UnpauseGame,
        EventType::RestartGame,
        EventType::NodesAvailable,
        EventType::NodesUnavailable,
    ];

    /// Wire name of this discriminator
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PairRequest => "PAIR_REQUEST",
            EventType::PairResponse => "PAIR_RESPONSE",
            EventType::PairAccepted => "PAIR_ACCEPTED",
            EventType::PairRejected => "PAIR_REJECTED",
            EventType::Disconnect => "DISCONNECT",
            EventType::PositionUpdate => "POSITION_UPDATE",
            EventType::Gesture => "GESTURE",
            EventType::PauseGame => "PAUSE_GAME",
            EventType::UnpauseGame => "UNPAUSE_GAME",
            EventType::RestartGame => "RESTART_GAME",
            EventType::NodesAvailable => "NODES_AVAILABLE",
            EventType::NodesUnavailable => "NODES_UNAVAILABLE",
        }
    }

    /// Whether the pairing state machine owns this kind
    ///
    /// Protocol events bypass the paired-sender check and are validated by
    /// the state machine itself.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            EventType::PairRequest
                | EventType::PairResponse
                | EventType::PairAccepted
                | EventType::PairRejected
                | EventType::Disconnect
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::invalid_event(format!("unknown eventType '{}'", s)))
    }
}

/// Controller layout a host assigns to a paired companion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerType {
    #[default]
    Unknown,
    Slider,
    Analog,
    Dpad,
}

impl ControllerType {
    /// Wire name of this controller type
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerType::Unknown => "UNKNOWN",
            ControllerType::Slider => "SLIDER",
            ControllerType::Analog => "ANALOG",
            ControllerType::Dpad => "DPAD",
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UNKNOWN" => Ok(ControllerType::Unknown),
            "SLIDER" => Ok(ControllerType::Slider),
            "ANALOG" => Ok(ControllerType::Analog),
            "DPAD" => Ok(ControllerType::Dpad),
            other => Err(ProtocolError::invalid_event(format!(
                "unknown controllerType '{}'",
                other
            ))),
        }
    }
}

/// Kind-specific part of an envelope
///
/// The variant is the `eventType` discriminator; its fields are exactly the
/// keys that discriminator requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    PairRequest {
        #[serde(rename = "targetController")]
        target_controller: String,
    },
    PairResponse,
    PairAccepted {
        #[serde(rename = "controllerType")]
        controller_type: ControllerType,
    },
    PairRejected,
    Disconnect,
    PositionUpdate {
        #[serde(rename = "posX")]
        pos_x: f64,
        #[serde(rename = "posY")]
        pos_y: f64,
    },
    Gesture,
    PauseGame,
    UnpauseGame,
    RestartGame,
    NodesAvailable,
    NodesUnavailable,
}

impl EventPayload {
    /// Discriminator of this payload
    pub fn kind(&self) -> EventType {
        match self {
            EventPayload::PairRequest { .. } => EventType::PairRequest,
            EventPayload::PairResponse => EventType::PairResponse,
            EventPayload::PairAccepted { .. } => EventType::PairAccepted,
            EventPayload::PairRejected => EventType::PairRejected,
            EventPayload::Disconnect => EventType::Disconnect,
            EventPayload::PositionUpdate { .. } => EventType::PositionUpdate,
            EventPayload::Gesture => EventType::Gesture,
            EventPayload::PauseGame => EventType::PauseGame,
            EventPayload::UnpauseGame => EventType::UnpauseGame,
            EventPayload::RestartGame => EventType::RestartGame,
            EventPayload::NodesAvailable => EventType::NodesAvailable,
            EventPayload::NodesUnavailable => EventType::NodesUnavailable,
        }
    }
}

/// A typed event exchanged between peers and delivered to listeners
///
/// # Examples
///
/// ```
/// use wearlink_protocol::{ControllerType, EventType, WearEvent};
///
/// let event = WearEvent::pair_accepted(ControllerType::Slider).with_player_num(0);
/// let text = event.serialize();
/// assert!(text.contains("\"controllerType\":\"SLIDER\""));
///
/// let parsed = WearEvent::deserialize(&text).unwrap();
/// assert_eq!(parsed.kind(), EventType::PairAccepted);
/// assert_eq!(parsed, event);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WearEvent {
    /// Slot this event concerns, `None` when not slot-scoped
    #[serde(
        rename = "playerNum",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_player_num"
    )]
    pub player_num: Option<u32>,

    /// Artifact reference, set when the envelope travelled via shared state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Discriminator and kind-specific fields
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl WearEvent {
    /// Creates an unscoped event around a payload
    pub fn new(payload: EventPayload) -> Self {
        Self {
            player_num: None,
            uri: None,
            payload,
        }
    }

    pub fn pair_request(target_controller: impl Into<String>) -> Self {
        Self::new(EventPayload::PairRequest {
            target_controller: target_controller.into(),
        })
    }

    pub fn pair_response() -> Self {
        Self::new(EventPayload::PairResponse)
    }

    pub fn pair_accepted(controller_type: ControllerType) -> Self {
        Self::new(EventPayload::PairAccepted { controller_type })
    }

    pub fn pair_rejected() -> Self {
        Self::new(EventPayload::PairRejected)
    }

    pub fn disconnect() -> Self {
        Self::new(EventPayload::Disconnect)
    }

    pub fn position_update(pos_x: f64, pos_y: f64) -> Self {
        Self::new(EventPayload::PositionUpdate { pos_x, pos_y })
    }

    pub fn gesture() -> Self {
        Self::new(EventPayload::Gesture)
    }

    pub fn pause_game() -> Self {
        Self::new(EventPayload::PauseGame)
    }

    pub fn unpause_game() -> Self {
        Self::new(EventPayload::UnpauseGame)
    }

    pub fn restart_game() -> Self {
        Self::new(EventPayload::RestartGame)
    }

    pub fn nodes_available() -> Self {
        Self::new(EventPayload::NodesAvailable)
    }

    pub fn nodes_unavailable() -> Self {
        Self::new(EventPayload::NodesUnavailable)
    }

    /// Builder pattern: scope the event to a slot
    pub fn with_player_num(mut self, slot: u32) -> Self {
        self.player_num = Some(slot);
        self
    }

    /// Builder pattern: attach an artifact reference
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Discriminator of this event
    pub fn kind(&self) -> EventType {
        self.payload.kind()
    }

    /// Check if this event is of a specific kind
    pub fn is_kind(&self, kind: EventType) -> bool {
        self.kind() == kind
    }

    /// Serialize to the canonical JSON text form
    ///
    /// Only `eventType`, the present optional keys and the payload keys of
    /// this discriminator are written. Coordinates must be finite; a
    /// serializer failure is logged and yields an empty string.
    pub fn serialize(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} event: {}", self.kind(), e);
                String::new()
            }
        }
    }

    /// Serialize to bytes for the direct-message transport
    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize().into_bytes()
    }

    /// Parse an envelope from its JSON text form
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidEvent` if the text is not a JSON object,
    /// the discriminator is missing or unknown, or a field required by the
    /// discriminator is missing or malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use wearlink_protocol::WearEvent;
    ///
    /// let missing_coords = r#"{"eventType":"POSITION_UPDATE","playerNum":1}"#;
    /// assert!(WearEvent::deserialize(missing_coords).is_err());
    ///
    /// let unscoped = WearEvent::deserialize(r#"{"eventType":"PAUSE_GAME"}"#).unwrap();
    /// assert_eq!(unscoped.player_num, None);
    /// ```
    pub fn deserialize(text: &str) -> Result<Self> {
        serde_json::from_str(text.trim()).map_err(|e| {
            ProtocolError::invalid_event(format!("Failed to deserialize event: {}", e))
        })
    }

    /// Parse an envelope from direct-message bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ProtocolError::invalid_event(format!("event is not UTF-8: {}", e)))?;
        Self::deserialize(text)
    }
}

/// Reads `playerNum`, treating negative values as "not slot-scoped"
fn deserialize_player_num<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Option<i64> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(n) if n < 0 => Ok(None),
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| Error::custom(format!("playerNum {} out of range", n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn keys(text: &str) -> Vec<String> {
        let value: Value = serde_json::from_str(text).unwrap();
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_unscoped_event_omits_player_num() {
        let text = WearEvent::pause_game().serialize();
        assert_eq!(keys(&text), vec!["eventType"]);
        assert!(text.contains("\"PAUSE_GAME\""));
    }

    #[test]
    fn test_position_update_writes_only_its_keys() {
        let text = WearEvent::position_update(0.5, -1.25)
            .with_player_num(1)
            .serialize();
        assert_eq!(keys(&text), vec!["eventType", "playerNum", "posX", "posY"]);
    }

    #[test]
    fn test_pair_request_requires_target_controller() {
        let err = WearEvent::deserialize(r#"{"eventType":"PAIR_REQUEST","playerNum":0}"#);
        assert!(matches!(err, Err(ProtocolError::InvalidEvent(_))));

        let ok = WearEvent::deserialize(
            r#"{"eventType":"PAIR_REQUEST","playerNum":0,"targetController":"SLIDER"}"#,
        )
        .unwrap();
        assert_eq!(
            ok.payload,
            EventPayload::PairRequest {
                target_controller: "SLIDER".to_string()
            }
        );
    }

    #[test]
    fn test_position_update_missing_coordinates_fails() {
        let result = WearEvent::deserialize(r#"{"eventType":"POSITION_UPDATE","playerNum":1}"#);
        assert!(result.is_err());

        let result =
            WearEvent::deserialize(r#"{"eventType":"POSITION_UPDATE","playerNum":1,"posX":1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_or_unknown_discriminator_fails() {
        assert!(WearEvent::deserialize(r#"{"playerNum":1}"#).is_err());
        assert!(WearEvent::deserialize(r#"{"eventType":"UNKNOWN"}"#).is_err());
        assert!(WearEvent::deserialize(r#"{"eventType":"SELF_DESTRUCT"}"#).is_err());
        assert!(WearEvent::deserialize("not json").is_err());
    }

    #[test]
    fn test_bad_controller_type_fails() {
        let result = WearEvent::deserialize(
            r#"{"eventType":"PAIR_ACCEPTED","playerNum":0,"controllerType":"JOYSTICK"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let event = WearEvent::deserialize(
            r#"{"eventType":"RESTART_GAME","playerNum":2,"colour":"red","version":9}"#,
        )
        .unwrap();
        assert_eq!(event, WearEvent::restart_game().with_player_num(2));
    }

    #[test]
    fn test_negative_player_num_is_unscoped() {
        let event = WearEvent::deserialize(r#"{"eventType":"GESTURE","playerNum":-1}"#).unwrap();
        assert_eq!(event.player_num, None);
    }

    #[test]
    fn test_missing_player_num_is_not_slot_zero() {
        let event = WearEvent::deserialize(r#"{"eventType":"DISCONNECT"}"#).unwrap();
        assert_eq!(event.player_num, None);
    }

    #[test]
    fn test_roundtrip_preserves_coordinates_exactly() {
        let original = WearEvent::position_update(0.1 + 0.2, -1.0 / 3.0)
            .with_player_num(7)
            .with_uri("wear://host-node/update");
        let parsed = WearEvent::deserialize(&original.serialize()).unwrap();
        assert_eq!(parsed, original);

        match parsed.payload {
            EventPayload::PositionUpdate { pos_x, pos_y } => {
                assert_eq!(pos_x.to_bits(), (0.1f64 + 0.2).to_bits());
                assert_eq!(pos_y.to_bits(), (-1.0f64 / 3.0).to_bits());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_every_kind_survives_roundtrip() {
        let events = vec![
            WearEvent::pair_request("DPAD"),
            WearEvent::pair_response(),
            WearEvent::pair_accepted(ControllerType::Analog),
            WearEvent::pair_rejected(),
            WearEvent::disconnect(),
            WearEvent::position_update(0.75, -0.5),
            WearEvent::gesture(),
            WearEvent::pause_game(),
            WearEvent::unpause_game(),
            WearEvent::restart_game(),
            WearEvent::nodes_available(),
            WearEvent::nodes_unavailable(),
        ];
        assert_eq!(events.len(), 12);

        for base in events {
            let variants = [
                base.clone(),
                base.clone().with_player_num(3),
                base.clone().with_uri("wear://host/update"),
                base.clone().with_player_num(0).with_uri("wear://host/update/0"),
            ];
            for event in variants {
                let text = event.serialize();
                let parsed = WearEvent::deserialize(&text)
                    .unwrap_or_else(|e| panic!("{} failed to parse: {}", text, e));
                assert_eq!(parsed, event, "{}", text);
                let written = keys(&text);
                assert_eq!(
                    written.contains(&"playerNum".to_string()),
                    event.player_num.is_some()
                );
                assert_eq!(written.contains(&"uri".to_string()), event.uri.is_some());
            }
        }
    }

    #[test]
    fn test_integer_coordinates_accepted() {
        let event =
            WearEvent::deserialize(r#"{"eventType":"POSITION_UPDATE","posX":1,"posY":-2}"#)
                .unwrap();
        assert_eq!(event, WearEvent::position_update(1.0, -2.0));
    }

    #[test]
    fn test_from_bytes_trims_newline() {
        let event = WearEvent::from_bytes(b"{\"eventType\":\"PAIR_RESPONSE\",\"playerNum\":0}\n")
            .unwrap();
        assert_eq!(event, WearEvent::pair_response().with_player_num(0));
    }

    #[test]
    fn test_event_type_names() {
        for kind in EventType::ALL {
            assert_eq!(kind.as_str().parse::<EventType>().unwrap(), kind);
        }
        assert!(EventType::Disconnect.is_protocol());
        assert!(!EventType::PositionUpdate.is_protocol());
        assert!(!EventType::NodesAvailable.is_protocol());
    }

    #[test]
    fn test_controller_type_names() {
        assert_eq!("DPAD".parse::<ControllerType>().unwrap(), ControllerType::Dpad);
        assert_eq!(ControllerType::Analog.to_string(), "ANALOG");
        assert!("dpad".parse::<ControllerType>().is_err());
    }
}
