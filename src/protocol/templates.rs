//! Builders for protocol messages and the topic layout they travel on.

use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;

use super::{GeoPoint, MessageKind, ProfileCard, ThatsAppMessage, UnknownKind};

pub const DEFAULT_NAMESPACE: &str = "thatsapp/publictest";

const SAMPLE_TEXT: &str = "Hello from MQTT Debugger";
const SAMPLE_IMAGE_URL: &str = "https://picsum.photos/200/300";
const SAMPLE_NAME: &str = "Debug User";
const SAMPLE_AVATAR_URL: &str = "https://ui-avatars.com/api/?name=Debug+User";
// Zurich
const SAMPLE_LOCATION: GeoPoint = GeoPoint {
    latitude: 47.3769,
    longitude: 8.5417,
};

fn embed<T: Serialize>(value: &T) -> String {
    // Only plain structs of strings and floats go through here
    serde_json::to_string(value).unwrap_or_default()
}

fn profile(name: &str, avatar_url: Option<&str>) -> ProfileCard {
    ProfileCard {
        name: name.to_string(),
        avatar_url: avatar_url.map(str::to_string),
    }
}

impl ThatsAppMessage {
    fn stamped(sender_id: &str, recipient_id: &str, kind: MessageKind, payload: String) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            kind,
            payload,
        }
    }

    pub fn text(sender_id: &str, recipient_id: &str, text: &str) -> Self {
        Self::stamped(sender_id, recipient_id, MessageKind::Text, text.to_string())
    }

    pub fn image(sender_id: &str, recipient_id: &str, image_url: &str) -> Self {
        Self::stamped(sender_id, recipient_id, MessageKind::Image, image_url.to_string())
    }

    pub fn location(sender_id: &str, recipient_id: &str, latitude: f64, longitude: f64) -> Self {
        let point = GeoPoint {
            latitude,
            longitude,
        };
        Self::stamped(sender_id, recipient_id, MessageKind::Location, embed(&point))
    }

    pub fn profile_update(
        sender_id: &str,
        recipient_id: &str,
        name: &str,
        avatar_url: Option<&str>,
    ) -> Self {
        let card = profile(name, avatar_url);
        Self::stamped(sender_id, recipient_id, MessageKind::ProfileUpdate, embed(&card))
    }

    pub fn request_profile(sender_id: &str, recipient_id: &str) -> Self {
        Self::stamped(sender_id, recipient_id, MessageKind::RequestProfile, String::new())
    }

    pub fn typing(sender_id: &str, recipient_id: &str) -> Self {
        Self::stamped(sender_id, recipient_id, MessageKind::Typing, String::new())
    }

    /// Presence messages are not addressed to anyone in particular.
    pub fn online_poll(sender_id: &str, name: &str, avatar_url: Option<&str>) -> Self {
        let card = profile(name, avatar_url);
        Self::stamped(sender_id, "", MessageKind::OnlinePoll, embed(&card))
    }

    pub fn online_response(sender_id: &str, name: &str, avatar_url: Option<&str>) -> Self {
        let card = profile(name, avatar_url);
        Self::stamped(sender_id, "", MessageKind::OnlineResponse, embed(&card))
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Topic layout of a ThatsApp deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    namespace: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl TopicScheme {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.trim_end_matches('/').to_string(),
        }
    }

    pub fn global(&self) -> String {
        format!("{}/global", self.namespace)
    }

    pub fn direct(&self, recipient_id: &str) -> String {
        format!("{}/{}/messages", self.namespace, recipient_id)
    }

    pub fn wildcard(&self) -> String {
        format!("{}/#", self.namespace)
    }

    pub fn topic_for(&self, kind: MessageKind, recipient_id: &str) -> String {
        match kind {
            MessageKind::OnlinePoll | MessageKind::OnlineResponse => self.global(),
            _ => self.direct(recipient_id),
        }
    }
}

/// A canned example message for one kind, as offered by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template(pub MessageKind);

impl FromStr for Template {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Template)
    }
}

impl Template {
    pub fn build(&self, sender_id: &str, recipient_id: &str) -> ThatsAppMessage {
        match self.0 {
            MessageKind::Text => ThatsAppMessage::text(sender_id, recipient_id, SAMPLE_TEXT),
            MessageKind::Image => ThatsAppMessage::image(sender_id, recipient_id, SAMPLE_IMAGE_URL),
            MessageKind::Location => ThatsAppMessage::location(
                sender_id,
                recipient_id,
                SAMPLE_LOCATION.latitude,
                SAMPLE_LOCATION.longitude,
            ),
            MessageKind::ProfileUpdate => ThatsAppMessage::profile_update(
                sender_id,
                recipient_id,
                SAMPLE_NAME,
                Some(SAMPLE_AVATAR_URL),
            ),
            MessageKind::RequestProfile => ThatsAppMessage::request_profile(sender_id, recipient_id),
            MessageKind::Typing => ThatsAppMessage::typing(sender_id, recipient_id),
            MessageKind::OnlinePoll => {
                ThatsAppMessage::online_poll(sender_id, SAMPLE_NAME, Some(SAMPLE_AVATAR_URL))
            }
            MessageKind::OnlineResponse => {
                ThatsAppMessage::online_response(sender_id, SAMPLE_NAME, Some(SAMPLE_AVATAR_URL))
            }
        }
    }
}
