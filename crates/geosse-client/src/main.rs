//! `geosse-follow`: follow a GeoSSE stream and log how the layer changes.
//!
//! Connects to the configured event stream, applies every `create`,
//! `update`, and `delete` to an in-memory layer, and runs until Ctrl-C.
//! Configuration comes from the environment (see [`FollowConfig`]).

use anyhow::Context;
use geosse_client::{FollowConfig, geo_sse};
use geosse_core::FeatureCollection;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Initializes logging, loads configuration from environment variables,
/// subscribes to the stream, and applies events until interrupted.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the subscription fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("geosse-follow starting");

    let config = FollowConfig::from_env().context("loading configuration")?;
    info!(
        url = config.url,
        feature_id_field = config.feature_id_field,
        channel = config.channel.as_ref().map(|c| c.as_str()),
        reconnect_delay_ms = config.reconnect_delay.as_millis(),
        "configuration loaded"
    );

    let mut layer = geo_sse(Vec::new(), config.layer_options());
    let handle = layer
        .connect(config.subscription_options())
        .context("subscribing to event stream")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    layer.run_until(handle, shutdown).await?;

    let stats = layer.stats();
    info!(
        features = layer.collection().len(),
        events_applied = stats.events_applied,
        decode_failures = stats.decode_failures,
        reconnects = stats.reconnects,
        "geosse-follow stopped"
    );
    Ok(())
}
