//! Enumeration types shared by the sync core and the transport.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

/// Ready state of an event-stream connection.
///
/// Numbering follows the browser `EventSource.readyState` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ReadyState {
    /// Establishing or re-establishing the connection.
    Connecting,
    /// Connected and receiving events.
    Open,
    /// Closed for good; the transport will not retry on its own.
    Closed,
}

impl ReadyState {
    /// The `EventSource` numeric code (0, 1, 2).
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }

    /// Inverse of [`ReadyState::as_u8`]. Unknown codes map to `Closed`.
    pub const fn from_u8(code: u8) -> Self {
        match code {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

impl core::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// The named event kinds the sync layer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// A new feature to add.
    Create,
    /// A replacement for features sharing its identity key.
    Update,
    /// Removal of features sharing its identity key.
    Delete,
    /// The default, unnamed event type.
    Message,
}

impl EventKind {
    /// Map a wire event name to a kind. Unrecognized names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "message" => Some(Self::Message),
            _ => None,
        }
    }

    /// The wire event name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Message => "message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_codes_roundtrip() {
        for state in [ReadyState::Connecting, ReadyState::Open, ReadyState::Closed] {
            assert_eq!(ReadyState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ReadyState::from_u8(9), ReadyState::Closed);
    }

    #[test]
    fn event_names() {
        assert_eq!(EventKind::from_name("create"), Some(EventKind::Create));
        assert_eq!(EventKind::from_name("Create"), None);
        assert_eq!(EventKind::from_name("ping"), None);
        assert_eq!(EventKind::Delete.as_str(), "delete");
    }
}
