//! Client side of GeoSSE: keeps a feature layer in step with a server-sent
//! event stream.
//!
//! The server pushes `create`, `update`, and `delete` events whose data is
//! a GeoJSON feature. [`GeoSse`] subscribes over HTTP, parses the stream,
//! applies each event to its [`FeatureCollection`](geosse_core::FeatureCollection),
//! and reconnects when the connection is closed for good.
//!
//! # Architecture
//!
//! ```text
//! HTTP body --> SseParser --> EventSource --> GeoSse --> FeatureSync --> collection
//! ```
//!
//! The transport is a trait seam ([`EventTransport`]); [`HttpTransport`] is
//! the `reqwest` implementation.

pub mod config;
pub mod error;
pub mod layer;
pub mod sse;
pub mod transport;

pub use config::FollowConfig;
pub use error::{ClientError, TransportError};
pub use layer::{ConnectionHandle, GeoSse, SyncOutcome, SyncStats, geo_sse};
pub use sse::SseParser;
pub use transport::{EventSource, EventTransport, HttpEventSource, HttpTransport, TransportSignal};
