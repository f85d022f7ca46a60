//! Router reachability watchdog.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use hb_hilink::DeviceApi;
use hb_mqtt_channel::{BridgePublisher, Channel, RouterState};

use crate::lifecycle::{RunState, StopReason};

#[derive(Debug, Clone, Copy)]
pub struct WatchdogSettings {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub failure_threshold: u32,
}

/// Probe the router every `interval`. Each failure publishes
/// `router_status = disconnected`; the first success after a failure
/// publishes `connected`. Reaching the failure threshold stops the bridge.
pub struct Watchdog {
    settings: WatchdogSettings,
    consecutive_failures: u32,
    disconnected: bool,
}

impl Watchdog {
    pub fn new(settings: WatchdogSettings) -> Self {
        Self {
            settings,
            consecutive_failures: 0,
            disconnected: false,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one probe. Returns `true` once the failure threshold is reached.
    pub async fn check<C: Channel>(
        &mut self,
        device: &dyn DeviceApi,
        publisher: &BridgePublisher<C>,
    ) -> bool {
        let failure = match time::timeout(self.settings.probe_timeout, device.probe()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "probe timed out after {}s",
                self.settings.probe_timeout.as_secs()
            )),
        };

        match failure {
            None => {
                self.consecutive_failures = 0;
                if self.disconnected {
                    tracing::info!("router reachable again");
                    self.publish(publisher, RouterState::Connected).await;
                    self.disconnected = false;
                }
                false
            }
            Some(error) => {
                self.consecutive_failures += 1;
                self.disconnected = true;
                tracing::warn!(
                    failures = self.consecutive_failures,
                    threshold = self.settings.failure_threshold,
                    error = %error,
                    "router probe failed"
                );
                self.publish(publisher, RouterState::Disconnected).await;
                self.consecutive_failures >= self.settings.failure_threshold
            }
        }
    }

    /// Probe until the threshold is hit (requesting a stop) or the bridge
    /// stops for another reason.
    pub async fn run<C: Channel>(
        mut self,
        device: &dyn DeviceApi,
        publisher: &BridgePublisher<C>,
        state: Arc<RunState>,
    ) {
        let token = state.token();
        let mut ticker = time::interval_at(
            time::Instant::now() + self.settings.interval,
            self.settings.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let fatal = tokio::select! {
                () = token.cancelled() => break,
                fatal = self.check(device, publisher) => fatal,
            };
            if fatal {
                tracing::error!(
                    failures = self.consecutive_failures,
                    "router unreachable, stopping bridge"
                );
                state.request_stop(StopReason::ConnectionLost);
                break;
            }
        }
        tracing::debug!("watchdog stopped");
    }

    async fn publish<C: Channel>(&self, publisher: &BridgePublisher<C>, router: RouterState) {
        if let Err(e) = publisher.publish_router_status(router).await {
            tracing::warn!(state = router.as_str(), error = %e, "failed to publish router status");
        }
    }
}
