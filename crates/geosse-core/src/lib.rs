//! Feature collection model and stream-event application rules for GeoSSE.
//!
//! This crate holds everything about keeping a feature collection in step
//! with a `create`/`update`/`delete` event stream that does not touch the
//! network. The transport lives in `geosse-client`.
//!
//! # Modules
//!
//! - [`collection`] -- [`FeatureCollection`] trait and the in-memory
//!   [`FeatureLayer`] with an optional identity-key index.
//! - [`options`] -- Layer and subscription options, subscription URL building.
//! - [`reconnect`] -- What to do when a connection reports an error.
//! - [`sync`] -- [`FeatureSync`], which applies stream events to a collection.
//!
//! [`FeatureCollection`]: collection::FeatureCollection
//! [`FeatureLayer`]: collection::FeatureLayer
//! [`FeatureSync`]: sync::FeatureSync

pub mod collection;
pub mod options;
pub mod reconnect;
pub mod sync;

pub use collection::{FeatureCollection, FeatureLayer};
pub use options::{LayerOptions, SubscriptionOptions, subscription_url};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use sync::{ApplyOutcome, FeatureSync, SyncError};
