//! WebSocket protocol message types.
//!
//! Defines the JSON message format for client-server communication.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text sent in the welcome notice and in keepalive pulses.
pub const GREETING: &str = "SSSite is Online!";

// ============================================================================
// Client → Server Messages
// ============================================================================

/// State update sent by a lamp or dashboard.
///
/// `groupId` both names the broadcast domain and (re)assigns the sender to
/// it; `lampState` is opaque to the relay and forwarded unmodified.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LampUpdate {
    /// Group to join and broadcast to. Any JSON scalar.
    pub group_id: Value,
    /// Opaque lamp state (boolean on the reference payloads).
    pub lamp_state: Value,
}

// ============================================================================
// Server → Client Messages
// ============================================================================

/// Message sent from server to client.
///
/// Two shapes on the wire, disambiguated by the `isText` field:
/// `{"isText":true,"text":...}` for notices (welcome, keepalive) and
/// `{"isText":false,"lampState":...}` for relayed state. Use the
/// constructors; they pin the flag to the matching variant.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Human-readable notice (welcome, keepalive).
    Notice {
        #[serde(rename = "isText")]
        is_text: bool,
        text: String,
    },
    /// Relayed lamp state.
    LampState {
        #[serde(rename = "isText")]
        is_text: bool,
        #[serde(rename = "lampState")]
        lamp_state: Value,
    },
}

impl ServerMessage {
    /// Build a notice frame.
    pub fn notice(text: impl Into<String>) -> Self {
        Self::Notice {
            is_text: true,
            text: text.into(),
        }
    }

    /// Build a state relay frame.
    pub fn lamp_state(state: Value) -> Self {
        Self::LampState {
            is_text: false,
            lamp_state: state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notice_wire_shape() {
        let json = serde_json::to_string(&ServerMessage::notice(GREETING)).unwrap();
        assert_eq!(json, r#"{"isText":true,"text":"SSSite is Online!"}"#);
    }

    #[test]
    fn lamp_state_wire_shape() {
        let json = serde_json::to_string(&ServerMessage::lamp_state(json!(false))).unwrap();
        assert_eq!(json, r#"{"isText":false,"lampState":false}"#);
    }

    #[test]
    fn update_parses_reference_payload() {
        let update: LampUpdate =
            serde_json::from_str(r#"{"groupId":101,"lampState":false}"#).unwrap();
        assert_eq!(update.group_id, json!(101));
        assert_eq!(update.lamp_state, json!(false));
    }

    #[test]
    fn update_requires_both_fields() {
        assert!(serde_json::from_str::<LampUpdate>(r#"{"groupId":101}"#).is_err());
        assert!(serde_json::from_str::<LampUpdate>(r#"{"lampState":true}"#).is_err());
    }

    #[test]
    fn update_passes_state_through_opaquely() {
        let update: LampUpdate =
            serde_json::from_str(r#"{"groupId":"attic","lampState":{"r":255,"g":0,"b":0}}"#)
                .unwrap();
        assert_eq!(update.lamp_state, json!({"r":255,"g":0,"b":0}));
    }
}
