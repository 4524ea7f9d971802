//! Configuration for the `geosse-follow` binary.
//!
//! All configuration is loaded from environment variables: where the event
//! server lives, which property identifies features, and optionally which
//! channel to follow.

use std::time::Duration;

use geosse_core::{LayerOptions, SubscriptionOptions};
use geosse_types::ChannelName;

use crate::error::ClientError;

/// Default wait before reconnecting after the stream closed, in milliseconds.
const DEFAULT_RECONNECT_DELAY_MS: &str = "0";

/// Complete follower configuration loaded from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowConfig {
    /// Base URL of the event stream endpoint.
    pub url: String,
    /// Property name correlating events with stored features.
    pub feature_id_field: String,
    /// Channel to follow, if any.
    pub channel: Option<ChannelName>,
    /// Wait before reconnecting after the stream closed.
    pub reconnect_delay: Duration,
}

impl FollowConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `GEOSSE_URL` -- event stream endpoint
    /// - `GEOSSE_FEATURE_ID_FIELD` -- identity property name
    ///
    /// Optional variables:
    /// - `GEOSSE_CHANNEL` -- channel to follow (blank means none)
    /// - `GEOSSE_RECONNECT_DELAY_MS` -- reconnect delay in milliseconds (default 0)
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ClientError::Config(format!("missing environment variable: {key}")))
        };

        let url = required("GEOSSE_URL")?;
        let feature_id_field = required("GEOSSE_FEATURE_ID_FIELD")?;
        let channel = lookup("GEOSSE_CHANNEL").and_then(ChannelName::new);

        let delay_ms: u64 = lookup("GEOSSE_RECONNECT_DELAY_MS")
            .unwrap_or_else(|| DEFAULT_RECONNECT_DELAY_MS.to_owned())
            .parse()
            .map_err(|e| ClientError::Config(format!("invalid GEOSSE_RECONNECT_DELAY_MS: {e}")))?;

        Ok(Self {
            url,
            feature_id_field,
            channel,
            reconnect_delay: Duration::from_millis(delay_ms),
        })
    }

    /// Options for building the layer.
    pub fn layer_options(&self) -> LayerOptions {
        LayerOptions::new(self.url.clone()).with_reconnect_delay(self.reconnect_delay)
    }

    /// Options for the subscription.
    pub fn subscription_options(&self) -> SubscriptionOptions {
        let options = SubscriptionOptions::new(self.feature_id_field.clone());
        match self.channel.clone() {
            Some(channel) => options.with_channel(channel),
            None => options,
        }
    }
}
