//! Shared type definitions for GeoSSE.
//!
//! This crate is the single source of truth for the data that flows
//! between the event-stream transport, the sync core, and the map front
//! end. Plain types are exported to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Subscription and stored-feature identifiers
//! - [`enums`] -- Connection ready state and event kinds
//! - [`feature`] -- `GeoJSON` features, geometries, and identity keys
//! - [`events`] -- Wire events and the typed stream event union

pub mod enums;
pub mod events;
pub mod feature;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use enums::{EventKind, ReadyState};
pub use events::{ChannelName, SseEvent, StreamEvent};
pub use feature::{DecodeError, Feature, FeatureKey, Geometry, Position};
pub use ids::{ConnectionId, LayerId};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs generates TypeScript bindings when types with
        // #[ts(export)] are used. The files are written to the
        // `bindings/` directory relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::ConnectionId::export_all();
        let _ = crate::ids::LayerId::export_all();

        let _ = crate::enums::ReadyState::export_all();
        let _ = crate::enums::EventKind::export_all();

        let _ = crate::events::SseEvent::export_all();
        let _ = crate::events::ChannelName::export_all();
    }
}
