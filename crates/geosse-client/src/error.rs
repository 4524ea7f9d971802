//! Error types for the GeoSSE client.
//!
//! Uses `thiserror` for typed errors that surface through the client:
//! option validation and payload decoding from the core, URL and HTTP
//! client setup from the transport, and handle misuse from the layer.

use geosse_core::SyncError;
use geosse_types::ConnectionId;

/// Errors raised by an [`EventTransport`](crate::transport::EventTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The subscription URL cannot be used.
    #[error("invalid event stream url {url}: {message}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// The underlying connection could not be created.
    #[error("event stream connection error: {0}")]
    Connection(String),
}

/// Errors that can occur while driving a [`GeoSse`](crate::layer::GeoSse) layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An event payload or the options were rejected.
    #[error("sync error: {source}")]
    Sync {
        /// The underlying sync error.
        #[from]
        source: SyncError,
    },

    /// A connection could not be opened.
    #[error("transport error: {source}")]
    Transport {
        /// The underlying transport error.
        #[from]
        source: TransportError,
    },

    /// The handle does not belong to the active subscription.
    #[error("subscription {id} is not connected")]
    NotConnected {
        /// The stale or unknown subscription.
        id: ConnectionId,
    },

    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),
}
