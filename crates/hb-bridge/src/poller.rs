//! Periodic resource polling.
//!
//! One [`ResourcePoller`] per resource kind. Each cycle fetches a fresh
//! snapshot and publishes it when it differs from the last one seen
//! (Status publishes every cycle). A failed fetch or publish skips the
//! cycle without touching the remembered snapshot.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use hb_hilink::DeviceApi;
use hb_mqtt_channel::{BridgePublisher, Channel};
use hb_protocol::{ResourceKind, Snapshot};

/// Result of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Published,
    Unchanged,
    Failed,
}

pub struct ResourcePoller {
    kind: ResourceKind,
    last: Option<Snapshot>,
}

impl ResourcePoller {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind, last: None }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Last snapshot successfully published.
    pub fn last(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    pub async fn poll_once<C: Channel>(
        &mut self,
        device: &dyn DeviceApi,
        publisher: &BridgePublisher<C>,
    ) -> PollOutcome {
        let snapshot = match device.fetch_snapshot(self.kind).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(resource = %self.kind, error = %e, "resource fetch failed");
                return PollOutcome::Failed;
            }
        };

        let changed = self.last.as_ref() != Some(&snapshot);
        if !changed && !self.kind.always_publish() {
            tracing::trace!(resource = %self.kind, "snapshot unchanged");
            return PollOutcome::Unchanged;
        }

        if let Err(e) = publisher.publish_snapshot(self.kind, &snapshot).await {
            tracing::warn!(resource = %self.kind, error = %e, "failed to publish snapshot");
            return PollOutcome::Failed;
        }

        tracing::debug!(resource = %self.kind, fields = snapshot.len(), changed, "snapshot published");
        self.last = Some(snapshot);
        PollOutcome::Published
    }

    /// Poll every `interval` until `token` is cancelled. The first cycle
    /// runs immediately.
    pub async fn run<C: Channel>(
        mut self,
        device: &dyn DeviceApi,
        publisher: &BridgePublisher<C>,
        interval: Duration,
        token: CancellationToken,
    ) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                () = token.cancelled() => break,
                _ = self.poll_once(device, publisher) => {}
            }
        }
        tracing::debug!(resource = %self.kind, "poller stopped");
    }
}
