//! The live feature layer: a feature collection kept in step with an
//! event stream.
//!
//! [`GeoSse`] owns the collection, the transport, and at most one active
//! subscription. Signals are pulled with [`GeoSse::next_event`] (or driven
//! by [`GeoSse::run_until`]) and applied on the caller's task, one at a
//! time, in the order the transport delivered them.
//!
//! # Lifecycle
//!
//! ```text
//! connect ──> open ──> create/update/delete ... ──> error
//!                                                      │
//!                     closed? ── yes ──> reopen, same options
//!                        │
//!                        no ──> leave it to the transport's retry
//! ```
//!
//! Connecting again closes the previous source before opening the new
//! one, so a superseded connection can never deliver into the collection.

use std::future::Future;

use chrono::{DateTime, Utc};
use geosse_core::{
    ApplyOutcome, FeatureCollection, FeatureLayer, FeatureSync, LayerOptions, ReconnectDecision,
    ReconnectPolicy, SubscriptionOptions, subscription_url,
};
use geosse_types::{ConnectionId, EventKind, Feature, ReadyState, SseEvent};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::transport::{EventSource, EventTransport, HttpTransport, TransportSignal};

/// Owned proof of an active subscription, required by [`GeoSse::disconnect`].
///
/// Not `Clone`: a subscription is disconnected at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct ConnectionHandle {
    id: ConnectionId,
}

impl ConnectionHandle {
    /// The subscription this handle refers to.
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

/// What one pulled signal amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A `create`, `update`, or `delete` event was applied.
    Applied {
        /// The event kind.
        kind: EventKind,
        /// Its effect on the collection.
        outcome: ApplyOutcome,
    },
    /// The source reported it is open. Not a reliable "connected" signal
    /// for every server; send a `message` event to probe connectivity.
    Opened,
    /// A generic `message` event, left to the caller.
    Message(String),
    /// An event with a name nobody subscribed to.
    Ignored {
        /// The event name.
        event: String,
    },
    /// The source reported an error and will retry on its own.
    TransportError {
        /// Ready state observed with the error.
        state: ReadyState,
    },
    /// The source was closed after an error and a new one was opened.
    Reconnected {
        /// The URL of the new connection.
        url: String,
    },
}

/// Running counters for a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// `create`/`update`/`delete` events applied.
    pub events_applied: u64,
    /// Events whose payload failed to decode.
    pub decode_failures: u64,
    /// Reconnects performed by the layer itself.
    pub reconnects: u64,
    /// When the last event was received.
    pub last_event_at: Option<DateTime<Utc>>,
}

/// The subscription currently feeding the collection.
struct ActiveSubscription<S> {
    id: ConnectionId,
    options: SubscriptionOptions,
    sync: FeatureSync,
    source: S,
}

/// A feature collection synchronized with a server-sent event stream.
pub struct GeoSse<C = FeatureLayer, T: EventTransport = HttpTransport> {
    collection: C,
    transport: T,
    options: LayerOptions,
    policy: ReconnectPolicy,
    active: Option<ActiveSubscription<T::Source>>,
    stats: SyncStats,
}

/// Build a layer over `data` that streams from `options.url` over HTTP.
pub fn geo_sse(data: impl IntoIterator<Item = Feature>, options: LayerOptions) -> GeoSse {
    GeoSse::new(data, options)
}

impl GeoSse {
    /// Build a layer over `data` that streams from `options.url` over HTTP.
    pub fn new(data: impl IntoIterator<Item = Feature>, options: LayerOptions) -> Self {
        Self::with_transport(
            FeatureLayer::new().with_features(data),
            HttpTransport::new(),
            options,
        )
    }
}

impl<C, T> GeoSse<C, T>
where
    C: FeatureCollection,
    T: EventTransport,
{
    /// Build a layer from its parts.
    pub fn with_transport(collection: C, transport: T, options: LayerOptions) -> Self {
        let policy = ReconnectPolicy::with_delay(options.reconnect_delay());
        Self {
            collection,
            transport,
            options,
            policy,
            active: None,
            stats: SyncStats::default(),
        }
    }

    /// The synchronized collection.
    pub const fn collection(&self) -> &C {
        &self.collection
    }

    /// Mutable access to the collection, e.g. for features added locally.
    pub const fn collection_mut(&mut self) -> &mut C {
        &mut self.collection
    }

    /// The layer's construction options.
    pub const fn options(&self) -> &LayerOptions {
        &self.options
    }

    /// Running counters.
    pub const fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// The active subscription, if any.
    pub fn active_subscription(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Ready state of the active connection, if any.
    pub fn ready_state(&self) -> Option<ReadyState> {
        self.active.as_ref().map(|a| a.source.ready_state())
    }

    /// URL of the active connection, if any.
    pub fn connected_url(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.source.url())
    }

    /// Subscribe to the event stream.
    ///
    /// Any previous subscription is closed first. Stored features are
    /// expected to carry unique values under `options.feature_id_field`;
    /// when they do not, updates and deletes affect every match.
    pub fn connect(&mut self, options: SubscriptionOptions) -> Result<ConnectionHandle, ClientError> {
        self.options.validate()?;
        options.validate()?;

        if let Some(mut previous) = self.active.take() {
            previous.source.close();
            info!(subscription = %previous.id, "closed previous subscription");
        }

        let url = subscription_url(&self.options.url, options.channel.as_ref());
        let source = self.transport.open(&url)?;
        let id = ConnectionId::new();
        info!(
            subscription = %id,
            url = %url,
            feature_id_field = %options.feature_id_field,
            "subscribed to event stream"
        );

        self.active = Some(ActiveSubscription {
            id,
            sync: FeatureSync::new(options.feature_id_field.clone()),
            options,
            source,
        });
        Ok(ConnectionHandle { id })
    }

    /// Close the subscription identified by `handle`.
    ///
    /// Events still buffered by the closed connection are discarded.
    pub fn disconnect(&mut self, handle: ConnectionHandle) -> Result<(), ClientError> {
        match self.active.take() {
            Some(mut active) if active.id == handle.id => {
                active.source.close();
                info!(subscription = %active.id, "disconnected from event stream");
                Ok(())
            }
            other => {
                self.active = other;
                Err(ClientError::NotConnected { id: handle.id })
            }
        }
    }

    /// Wait for the next signal of the active connection and act on it.
    ///
    /// Returns `None` when nothing is connected or the source stopped.
    /// A payload that fails to decode yields `Some(Err(..))` and leaves the
    /// subscription in place.
    pub async fn next_event(&mut self) -> Option<Result<SyncOutcome, ClientError>> {
        let active = self.active.as_mut()?;
        let Some(signal) = active.source.next_signal().await else {
            info!(subscription = %active.id, "event source stopped");
            self.active = None;
            return None;
        };

        let result = match signal {
            TransportSignal::Open => {
                debug!(subscription = %active.id, "event stream reported open");
                Ok(SyncOutcome::Opened)
            }
            TransportSignal::Event(event) => {
                self.stats.last_event_at = Some(Utc::now());
                Self::handle_event(&mut self.collection, &mut self.stats, &active.sync, event)
            }
            TransportSignal::Error => {
                let state = active.source.ready_state();
                warn!(subscription = %active.id, state = %state, "event stream error");
                match self.policy.on_error(state) {
                    ReconnectDecision::Wait => Ok(SyncOutcome::TransportError { state }),
                    ReconnectDecision::Reconnect { delay } => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        Self::reopen(&self.transport, &self.options.url, &mut self.stats, active)
                            .map(|url| SyncOutcome::Reconnected { url })
                    }
                }
            }
        };
        Some(result)
    }

    /// Apply events until `shutdown` completes or the source stops, then
    /// disconnect.
    ///
    /// Decode failures are logged and skipped. Only a failed reconnect
    /// ends the loop with an error.
    pub async fn run_until<F>(&mut self, handle: ConnectionHandle, shutdown: F) -> Result<(), ClientError>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                next = self.next_event() => match next {
                    None => break,
                    Some(Ok(SyncOutcome::Applied { kind, outcome })) => {
                        if outcome.changed() {
                            info!(
                                event = kind.as_str(),
                                features = self.collection.len(),
                                "layer updated"
                            );
                        }
                    }
                    Some(Ok(outcome)) => debug!(?outcome, "stream signal handled"),
                    Some(Err(ClientError::Sync { source })) => {
                        warn!(error = %source, "skipping malformed event");
                    }
                    Some(Err(e)) => return Err(e),
                },
            }
        }

        if self.active_subscription() == Some(handle.id()) {
            self.disconnect(handle)?;
        }
        Ok(())
    }

    fn handle_event(
        collection: &mut C,
        stats: &mut SyncStats,
        sync: &FeatureSync,
        event: SseEvent,
    ) -> Result<SyncOutcome, ClientError> {
        match EventKind::from_name(&event.event) {
            Some(EventKind::Message) => Ok(SyncOutcome::Message(event.data)),
            Some(kind) => match sync.apply_sse(collection, &event) {
                Ok(outcome) => {
                    stats.events_applied = stats.events_applied.saturating_add(1);
                    Ok(SyncOutcome::Applied { kind, outcome })
                }
                Err(e) => {
                    stats.decode_failures = stats.decode_failures.saturating_add(1);
                    warn!(event = kind.as_str(), error = %e, "event payload rejected");
                    Err(e.into())
                }
            },
            None => {
                debug!(event = %event.event, "ignoring unsubscribed event");
                Ok(SyncOutcome::Ignored { event: event.event })
            }
        }
    }

    /// Replace a closed source with a new one using the same options.
    fn reopen(
        transport: &T,
        base_url: &str,
        stats: &mut SyncStats,
        active: &mut ActiveSubscription<T::Source>,
    ) -> Result<String, ClientError> {
        active.source.close();

        let url = subscription_url(base_url, active.options.channel.as_ref());
        active.source = transport.open(&url)?;
        stats.reconnects = stats.reconnects.saturating_add(1);
        info!(
            subscription = %active.id,
            url = %url,
            reconnects = stats.reconnects,
            "reconnected to event stream"
        );
        Ok(url)
    }
}

impl<C, T> core::fmt::Debug for GeoSse<C, T>
where
    C: FeatureCollection,
    T: EventTransport,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GeoSse")
            .field("url", &self.options.url)
            .field("features", &self.collection.len())
            .field("subscription", &self.active_subscription())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
