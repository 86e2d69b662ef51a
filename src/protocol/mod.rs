//! # ThatsApp Protocol
//!
//! The chat protocol the console observes is plain JSON carried as MQTT
//! payload strings:
//!
//! ```text
//! { "senderId": "...", "recipientId": "..." | "global", "timestamp": <ms epoch>,
//!   "type": "TEXT" | "IMAGE" | ..., "payload": "<string, shape depends on type>" }
//! ```
//!
//! `LOCATION`, `PROFILE_UPDATE`, `ONLINE_POLL` and `ONLINE_RESPONSE` embed a
//! second JSON document inside `payload`.
//!
//! This module decodes arriving payloads into a closed set of variants
//! ([`Classification`]) keyed on the `type` discriminant. Anything that does not
//! carry a known discriminant stays opaque JSON or raw text; structure is never
//! guessed from which fields happen to be present.

pub mod templates;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The eight message types the protocol defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Text,
    Image,
    Location,
    ProfileUpdate,
    RequestProfile,
    Typing,
    OnlinePoll,
    OnlineResponse,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::Text,
        MessageKind::Image,
        MessageKind::Location,
        MessageKind::ProfileUpdate,
        MessageKind::RequestProfile,
        MessageKind::Typing,
        MessageKind::OnlinePoll,
        MessageKind::OnlineResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "TEXT",
            MessageKind::Image => "IMAGE",
            MessageKind::Location => "LOCATION",
            MessageKind::ProfileUpdate => "PROFILE_UPDATE",
            MessageKind::RequestProfile => "REQUEST_PROFILE",
            MessageKind::Typing => "TYPING",
            MessageKind::OnlinePoll => "ONLINE_POLL",
            MessageKind::OnlineResponse => "ONLINE_RESPONSE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message type: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownKind;

    /// Case-insensitive; `profile_update` and `PROFILE_UPDATE` are the same kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Wire envelope of a protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThatsAppMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: String,
}

/// `{latitude, longitude}` embedded in `LOCATION` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// `{name, avatarUrl}` embedded in profile and presence payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCard {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Typed view of the `payload` string for a given kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Image { url: String },
    Location(GeoPoint),
    ProfileUpdate(ProfileCard),
    RequestProfile,
    Typing,
    OnlinePoll(ProfileCard),
    OnlineResponse(ProfileCard),
    /// The discriminant was recognised but `payload` does not have the shape
    /// that kind requires.
    Undecodable { raw: Option<String> },
}

impl MessageBody {
    fn decode(kind: MessageKind, payload: Option<&str>) -> Self {
        let undecodable = || MessageBody::Undecodable {
            raw: payload.map(str::to_string),
        };
        match (kind, payload) {
            (MessageKind::RequestProfile, _) => MessageBody::RequestProfile,
            (MessageKind::Typing, _) => MessageBody::Typing,
            (_, None) => undecodable(),
            (MessageKind::Text, Some(text)) => MessageBody::Text(text.to_string()),
            (MessageKind::Image, Some(url)) => MessageBody::Image {
                url: url.to_string(),
            },
            (MessageKind::Location, Some(raw)) => serde_json::from_str(raw)
                .map(MessageBody::Location)
                .unwrap_or_else(|_| undecodable()),
            (MessageKind::ProfileUpdate, Some(raw)) => serde_json::from_str(raw)
                .map(MessageBody::ProfileUpdate)
                .unwrap_or_else(|_| undecodable()),
            (MessageKind::OnlinePoll, Some(raw)) => serde_json::from_str(raw)
                .map(MessageBody::OnlinePoll)
                .unwrap_or_else(|_| undecodable()),
            (MessageKind::OnlineResponse, Some(raw)) => serde_json::from_str(raw)
                .map(MessageBody::OnlineResponse)
                .unwrap_or_else(|_| undecodable()),
        }
    }
}

/// A payload recognised as a protocol message by its `type` field.
///
/// Envelope fields are optional here: the console shows what was sent, even
/// when a client omits or mistypes parts of the envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    pub kind: MessageKind,
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub body: MessageBody,
}

impl ProtocolMessage {
    fn decode(kind: MessageKind, object: &Value) -> Self {
        let text_field = |name: &str| object.get(name).and_then(Value::as_str).map(str::to_string);
        let sent_at = object
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Self {
            kind,
            sender_id: text_field("senderId"),
            recipient_id: text_field("recipientId"),
            sent_at,
            body: MessageBody::decode(kind, object.get("payload").and_then(Value::as_str)),
        }
    }

    /// True when the message was addressed to everyone.
    pub fn is_broadcast(&self) -> bool {
        matches!(self.recipient_id.as_deref(), Some("global") | Some(""))
    }
}

/// How the console should present a log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Protocol(ProtocolMessage),
    /// Valid JSON without a recognised `type`.
    OpaqueJson,
    /// Not JSON at all.
    RawText,
}

impl Classification {
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Classification::Protocol(message) => Some(message.kind),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Protocol(message) => message.kind.as_str(),
            Classification::OpaqueJson => "JSON",
            Classification::RawText => "RAW",
        }
    }
}

/// Classifies an already parsed payload. `None` means the payload was not JSON.
pub fn classify(parsed: Option<&Value>) -> Classification {
    let Some(value) = parsed else {
        return Classification::RawText;
    };

    match value
        .get("type")
        .and_then(Value::as_str)
        .and_then(|discriminant| discriminant.parse::<MessageKind>().ok())
    {
        Some(kind) => Classification::Protocol(ProtocolMessage::decode(kind, value)),
        None => Classification::OpaqueJson,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_parsing_ignores_case() {
        assert_eq!("text".parse::<MessageKind>(), Ok(MessageKind::Text));
        assert_eq!(
            "Online_Response".parse::<MessageKind>(),
            Ok(MessageKind::OnlineResponse)
        );
        assert!("VOICE".parse::<MessageKind>().is_err());
    }

    #[test]
    fn classifies_text_message_with_envelope() {
        let value = json!({
            "senderId": "alice",
            "recipientId": "bob",
            "timestamp": 1_700_000_000_000i64,
            "type": "TEXT",
            "payload": "hi"
        });
        let Classification::Protocol(message) = classify(Some(&value)) else {
            panic!("expected protocol message");
        };
        assert_eq!(message.kind, MessageKind::Text);
        assert_eq!(message.sender_id.as_deref(), Some("alice"));
        assert_eq!(message.recipient_id.as_deref(), Some("bob"));
        assert_eq!(message.sent_at.map(|t| t.timestamp_millis()), Some(1_700_000_000_000));
        assert_eq!(message.body, MessageBody::Text("hi".into()));
        assert!(!message.is_broadcast());
    }

    #[test]
    fn lowercase_discriminant_still_classifies() {
        let value = json!({"type": "typing"});
        assert_eq!(classify(Some(&value)).kind(), Some(MessageKind::Typing));
    }

    #[test]
    fn decodes_embedded_location_and_profile_payloads() {
        let location = json!({
            "type": "LOCATION",
            "payload": "{\"latitude\":47.3769,\"longitude\":8.5417}"
        });
        let Classification::Protocol(message) = classify(Some(&location)) else {
            panic!("expected protocol message");
        };
        assert_eq!(
            message.body,
            MessageBody::Location(GeoPoint {
                latitude: 47.3769,
                longitude: 8.5417
            })
        );

        let presence = json!({
            "type": "ONLINE_POLL",
            "recipientId": "",
            "payload": "{\"name\":\"Debug User\"}"
        });
        let Classification::Protocol(message) = classify(Some(&presence)) else {
            panic!("expected protocol message");
        };
        assert!(message.is_broadcast());
        assert_eq!(
            message.body,
            MessageBody::OnlinePoll(ProfileCard {
                name: "Debug User".into(),
                avatar_url: None
            })
        );
    }

    #[test]
    fn malformed_embedded_payload_is_undecodable_not_guessed() {
        let value = json!({"type": "LOCATION", "payload": "somewhere"});
        let Classification::Protocol(message) = classify(Some(&value)) else {
            panic!("expected protocol message");
        };
        assert_eq!(
            message.body,
            MessageBody::Undecodable {
                raw: Some("somewhere".into())
            }
        );
    }

    #[test]
    fn unknown_or_missing_type_is_opaque_json() {
        assert_eq!(classify(Some(&json!({"type": "VOICE"}))), Classification::OpaqueJson);
        assert_eq!(classify(Some(&json!({"payload": "x"}))), Classification::OpaqueJson);
        assert_eq!(classify(Some(&json!([1, 2, 3]))), Classification::OpaqueJson);
        assert_eq!(classify(Some(&json!({"type": 3}))), Classification::OpaqueJson);
    }

    #[test]
    fn unparsed_payload_is_raw_text() {
        assert_eq!(classify(None), Classification::RawText);
        assert_eq!(classify(None).label(), "RAW");
    }
}
