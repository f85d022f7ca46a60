//! Bridge context: owns every component and their tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use hb_hilink::DeviceApi;
use hb_mqtt_channel::{BridgePublisher, Channel};
use hb_protocol::{ResourceKind, SendCommand};

use crate::config::BridgeConfig;
use crate::datetime;
use crate::dispatcher::{Dispatcher, SendSettings};
use crate::lifecycle::{Phase, RunState, StopReason};
use crate::poller::ResourcePoller;
use crate::sms_intake::{IntakeSettings, SmsIntake};
use crate::watchdog::{Watchdog, WatchdogSettings};

/// Capacity of the MQTT loop → dispatcher queue.
pub const REQUEST_QUEUE_CAPACITY: usize = 32;

/// Timings and limits used by the bridge tasks.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub status_interval: Duration,
    pub signal_interval: Duration,
    pub network_interval: Duration,
    pub sms_interval: Duration,
    pub datetime_interval: Duration,
    pub intake: IntakeSettings,
    pub send: SendSettings,
    pub watchdog: WatchdogSettings,
}

impl BridgeSettings {
    pub fn interval(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Status => self.status_interval,
            ResourceKind::Signal => self.signal_interval,
            ResourceKind::Network => self.network_interval,
        }
    }
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        let sms = &config.sms;
        Self {
            status_interval: config.polling.interval(ResourceKind::Status),
            signal_interval: config.polling.interval(ResourceKind::Signal),
            network_interval: config.polling.interval(ResourceKind::Network),
            sms_interval: Duration::from_secs(sms.check_interval_secs),
            datetime_interval: Duration::from_secs(config.datetime_interval_secs),
            intake: IntakeSettings {
                page_size: sms.page_size,
                max_per_cycle: sms.max_per_cycle,
                pace: Duration::from_millis(sms.pace_millis),
            },
            send: SendSettings {
                cooldown: Duration::from_secs(sms.cooldown_secs),
                retry_delay: Duration::from_secs(sms.retry_delay_secs),
                max_retries: sms.max_retries,
            },
            watchdog: WatchdogSettings {
                interval: Duration::from_secs(config.watchdog.interval_secs),
                probe_timeout: Duration::from_secs(config.watchdog.timeout_secs),
                failure_threshold: config.watchdog.failure_threshold,
            },
        }
    }
}

/// What `shutdown` observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every task finished within the grace period.
    pub drained: bool,
}

/// The running bridge.
///
/// Holds the device client, the publisher and the shared run state; all
/// periodic tasks and in-flight sends are tracked so shutdown can wait on
/// them.
pub struct Bridge<C: Channel + 'static> {
    device: Arc<dyn DeviceApi>,
    publisher: BridgePublisher<C>,
    settings: BridgeSettings,
    state: Arc<RunState>,
    tracker: TaskTracker,
}

impl<C: Channel + 'static> Bridge<C> {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        publisher: BridgePublisher<C>,
        settings: BridgeSettings,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            device,
            publisher,
            settings,
            state,
            tracker: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    pub fn publisher(&self) -> &BridgePublisher<C> {
        &self.publisher
    }

    /// Enter Running and spawn every periodic task plus the dispatcher fed
    /// by `requests`.
    pub fn start(&self, requests: mpsc::Receiver<SendCommand>) {
        let token = self.state.token();
        self.state.mark_running();

        for kind in ResourceKind::ALL {
            let device = Arc::clone(&self.device);
            let publisher = self.publisher.clone();
            let interval = self.settings.interval(kind);
            let token = token.clone();
            self.spawn_periodic(kind.topic_suffix(), async move {
                ResourcePoller::new(kind)
                    .run(device.as_ref(), &publisher, interval, token)
                    .await;
            });
        }

        {
            let device = Arc::clone(&self.device);
            let publisher = self.publisher.clone();
            let intake = SmsIntake::new(self.settings.intake);
            let interval = self.settings.sms_interval;
            let token = token.clone();
            self.spawn_periodic("sms_intake", async move {
                intake.run(device.as_ref(), &publisher, interval, token).await;
            });
        }

        {
            let device = Arc::clone(&self.device);
            let publisher = self.publisher.clone();
            let watchdog = Watchdog::new(self.settings.watchdog);
            let state = Arc::clone(&self.state);
            self.spawn_periodic("watchdog", async move {
                watchdog.run(device.as_ref(), &publisher, state).await;
            });
        }

        {
            let publisher = self.publisher.clone();
            let interval = self.settings.datetime_interval;
            let token = token.clone();
            self.spawn_periodic("datetime", async move {
                datetime::run(&publisher, interval, token).await;
            });
        }

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.device),
            self.publisher.clone(),
            self.settings.send,
        );
        let tracker = self.tracker.clone();
        self.spawn_periodic("dispatcher", async move {
            dispatcher.run(requests, tracker, token).await;
        });

        tracing::info!("bridge running");
    }

    /// Stop the bridge: wait up to `grace` for tasks, then up to `grace`
    /// again to publish retained `connected = 0` and disconnect. Only the
    /// first call does anything. Without an earlier stop request this
    /// counts as a signal.
    pub async fn shutdown(&self, grace: Duration) -> Option<ShutdownReport> {
        self.state.request_stop(StopReason::Signal);
        if self.state.phase() != Phase::Stopping || !self.tracker.close() {
            return None;
        }

        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if drained {
            tracing::info!("all tasks stopped");
        } else {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                remaining = self.tracker.len(),
                "tasks still running after grace period"
            );
        }

        if tokio::time::timeout(grace, self.farewell()).await.is_err() {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "MQTT queue stalled, leaving the disconnected flag to the last will"
            );
        }

        self.state.mark_stopped();
        tracing::info!(reason = ?self.state.reason(), "bridge stopped");
        Some(ShutdownReport { drained })
    }

    async fn farewell(&self) {
        if let Err(e) = self.publisher.publish_connected(false).await {
            tracing::warn!(error = %e, "failed to publish disconnected flag");
        }
        if let Err(e) = self.publisher.disconnect().await {
            tracing::warn!(error = %e, "MQTT disconnect failed");
        }
    }

    /// Spawn a task that should live as long as the bridge. If it returns
    /// while the bridge is running, the bridge is stopped.
    fn spawn_periodic<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        self.tracker.spawn(async move {
            task.await;
            if state.is_running() {
                tracing::error!(task = name, "task exited unexpectedly");
                state.request_stop(StopReason::TaskExited(name));
            }
        });
    }
}
