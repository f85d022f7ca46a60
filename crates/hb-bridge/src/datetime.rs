//! Periodic clock publisher.
//!
//! Sends the bridge's Unix time to `{prefix}/datetime` so subscribers can
//! tell the bridge is alive independently of router activity.

use std::time::Duration;

use chrono::Utc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use hb_mqtt_channel::{BridgePublisher, Channel};

/// Publish at `interval` until `token` is cancelled.
pub async fn run<C: Channel>(
    publisher: &BridgePublisher<C>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    // Skip the first tick (fires immediately).
    ticker.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Utc::now().timestamp();
        if let Err(e) = publisher.publish_datetime(now).await {
            tracing::warn!(error = %e, "failed to publish datetime");
        } else {
            tracing::trace!(unix_secs = now, "datetime sent");
        }
    }
}
