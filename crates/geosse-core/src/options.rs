//! Layer and subscription options.
//!
//! [`LayerOptions`] is fixed when the layer is built; [`SubscriptionOptions`]
//! is supplied on every `connect` and reused verbatim, by name, when the
//! layer reconnects after a fatal transport error.

use std::time::Duration;

use geosse_types::ChannelName;
use serde::Deserialize;

use crate::sync::SyncError;

/// Construction-time options of a sync layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LayerOptions {
    /// Base URL of the event server's stream endpoint.
    pub url: String,
    /// Fixed wait before reconnecting after the connection closed.
    ///
    /// Zero (the default) reconnects immediately.
    #[serde(default)]
    pub reconnect_delay_ms: u64,
}

impl LayerOptions {
    /// Options for `url` with immediate reconnects.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay_ms: 0,
        }
    }

    /// Builder-style reconnect delay setter.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The reconnect delay as a [`Duration`].
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reject a blank URL.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.url.trim().is_empty() {
            return Err(SyncError::InvalidOptions {
                message: "layer url must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// Options of one subscription.
///
/// Features stored in the target collection are expected to carry unique
/// values under `feature_id_field`. Nothing enforces this; when it does
/// not hold, updates and deletes affect every feature sharing the key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionOptions {
    /// Property name correlating stream events with stored features.
    pub feature_id_field: String,
    /// Channel to subscribe to; `None` subscribes to the unscoped stream.
    #[serde(default)]
    pub channel: Option<ChannelName>,
}

impl SubscriptionOptions {
    /// Subscribe to the unscoped stream, correlating on `feature_id_field`.
    pub fn new(feature_id_field: impl Into<String>) -> Self {
        Self {
            feature_id_field: feature_id_field.into(),
            channel: None,
        }
    }

    /// Builder-style channel setter.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelName) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Reject a blank identity field.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.feature_id_field.trim().is_empty() {
            return Err(SyncError::InvalidOptions {
                message: "feature id field must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// Build the URL a subscription connects to.
///
/// `{base}` without a channel, `{base}?channel={channel}` with one. If
/// `base` already carries a query string the parameter is appended with
/// `&`. The channel is percent-encoded.
pub fn subscription_url(base: &str, channel: Option<&ChannelName>) -> String {
    match channel {
        None => base.to_owned(),
        Some(channel) => {
            let separator = if base.contains('?') { '&' } else { '?' };
            format!(
                "{base}{separator}channel={}",
                urlencoding::encode(channel.as_str())
            )
        }
    }
}
