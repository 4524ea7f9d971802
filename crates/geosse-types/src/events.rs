//! Stream events, from the raw wire record to the typed union the sync
//! layer acts on.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::EventKind;
use crate::feature::{DecodeError, Feature};

/// One event as dispatched by the `text/event-stream` parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SseEvent {
    /// Event name; `message` when the stream sent no `event:` field.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id in effect when the event was dispatched.
    pub id: Option<String>,
}

impl SseEvent {
    /// Build an event with no id.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }
}

/// Everything the sync layer can be told by a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Add the feature.
    Create(Feature),
    /// Replace stored features sharing the feature's identity key.
    Update(Feature),
    /// Remove stored features sharing the feature's identity key.
    Delete(Feature),
    /// A generic `message` event with its raw data.
    Message(String),
    /// The connection reported it is open.
    Open,
    /// The connection reported an error.
    Error,
}

impl StreamEvent {
    /// Interpret a dispatched wire event.
    ///
    /// Returns `Ok(None)` for event names nobody subscribed to. Payloads of
    /// `create`, `update` and `delete` go through [`Feature::decode`].
    pub fn from_sse(event: &SseEvent) -> Result<Option<Self>, DecodeError> {
        let Some(kind) = EventKind::from_name(&event.event) else {
            return Ok(None);
        };
        let decoded = match kind {
            EventKind::Create => Self::Create(Feature::decode(&event.data)?),
            EventKind::Update => Self::Update(Feature::decode(&event.data)?),
            EventKind::Delete => Self::Delete(Feature::decode(&event.data)?),
            EventKind::Message => Self::Message(event.data.clone()),
        };
        Ok(Some(decoded))
    }

    /// Short name for log fields.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Message(_) => "message",
            Self::Open => "open",
            Self::Error => "error",
        }
    }
}

/// Optional label scoping a subscription to one logical feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(try_from = "String")]
#[ts(export, export_to = "bindings/")]
pub struct ChannelName(String);

impl ChannelName {
    /// Create a channel name. Blank names are rejected.
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            None
        } else {
            Some(Self(name))
        }
    }

    /// The channel name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelName {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name).ok_or_else(|| "channel name must not be blank".to_owned())
    }
}

impl core::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureKey;

    #[test]
    fn named_events_decode_features() {
        let sse = SseEvent::new("update", r#"{"properties":{"id":"a1"}}"#);
        let event = StreamEvent::from_sse(&sse).ok().flatten();
        let key = match event {
            Some(StreamEvent::Update(feature)) => feature.key("id"),
            _ => None,
        };
        assert_eq!(key, Some(FeatureKey::from("a1")));
    }

    #[test]
    fn message_events_keep_raw_data() {
        let sse = SseEvent::new("message", "not json at all");
        let event = StreamEvent::from_sse(&sse).ok().flatten();
        assert_eq!(event, Some(StreamEvent::Message("not json at all".to_owned())));
    }

    #[test]
    fn unknown_event_names_are_ignored() {
        let sse = SseEvent::new("heartbeat", "{}");
        assert!(matches!(StreamEvent::from_sse(&sse), Ok(None)));
    }

    #[test]
    fn invalid_payload_is_a_decode_error() {
        let sse = SseEvent::new("create", "{oops");
        assert!(StreamEvent::from_sse(&sse).is_err());
    }

    #[test]
    fn blank_channel_names_are_rejected() {
        assert!(ChannelName::new("").is_none());
        assert!(ChannelName::new("   ").is_none());
        assert_eq!(
            ChannelName::new("trucks").map(|c| c.to_string()),
            Some("trucks".to_owned())
        );
    }

    #[test]
    fn blank_channel_names_do_not_deserialize() {
        assert!(serde_json::from_str::<ChannelName>(r#""""#).is_err());
        assert!(serde_json::from_str::<ChannelName>(r#""  ""#).is_err());
        assert_eq!(
            serde_json::from_str::<ChannelName>(r#""trucks""#).ok(),
            ChannelName::new("trucks")
        );
    }
}
