//! Shared test harness for E2E integration tests.
//!
//! Wires a `MockDevice` and a `MockChannel` into a real `Bridge`, with
//! inbound MQTT traffic fed through the same event handler the live loop
//! uses. All tests run on tokio's paused clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{ConnAck, ConnectReturnCode, Event, Packet, Publish, QoS};
use tokio::sync::mpsc;

use hb_bridge::mqtt_loop::{self, LoopControl};
use hb_bridge::{Bridge, BridgeConfig, BridgeSettings, REQUEST_QUEUE_CAPACITY, RunState};
use hb_hilink::MockDevice;
use hb_mqtt_channel::{BridgePublisher, MockChannel, PublishedMessage};
use hb_protocol::{ResourceKind, SendCommand, Snapshot};

pub const PREFIX: &str = "huawei";

const BASE_CONFIG: &str = r#"
[device]
host = "192.168.8.1"

[mqtt]
broker_host = "localhost"
topic_prefix = "huawei"
"#;

/// A running bridge against mock router and broker.
pub struct TestHarness {
    pub device: Arc<MockDevice>,
    pub mqtt: Arc<MockChannel>,
    pub bridge: Bridge<MockChannel>,
    pub config: BridgeConfig,
    requests: mpsc::Sender<SendCommand>,
}

impl TestHarness {
    /// Default configuration, router reporting a stable connection.
    pub fn start() -> Self {
        Self::start_with(|_| {})
    }

    /// Adjust the default configuration before the bridge starts.
    pub fn start_with(customize: impl FnOnce(&mut BridgeConfig)) -> Self {
        let device = Arc::new(MockDevice::new());
        device.set_snapshot(ResourceKind::Status, status("901"));
        device.set_snapshot(ResourceKind::Signal, signal("-65dBm"));
        device.set_snapshot(ResourceKind::Network, network("E5577"));
        Self::start_on(device, customize)
    }

    /// Start on a pre-scripted device.
    pub fn start_on(device: Arc<MockDevice>, customize: impl FnOnce(&mut BridgeConfig)) -> Self {
        let mut config: BridgeConfig = toml::from_str(BASE_CONFIG).unwrap();
        customize(&mut config);
        config.validate().unwrap();

        let mqtt = Arc::new(MockChannel::new());
        let (requests, requests_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let bridge = Bridge::new(
            device.clone(),
            BridgePublisher::new(mqtt.clone(), PREFIX),
            BridgeSettings::from(&config),
            Arc::new(RunState::new()),
        );
        bridge.start(requests_rx);

        Self {
            device,
            mqtt,
            bridge,
            config,
            requests,
        }
    }

    /// Simulate the broker accepting the connection.
    pub async fn connack(&self) {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)));
        self.handle(event).await;
    }

    /// Simulate an inbound publish on `topic`.
    pub async fn inbound(&self, topic: &str, payload: &[u8]) {
        let event = Event::Incoming(Packet::Publish(Publish::new(topic, QoS::AtLeastOnce, payload)));
        self.handle(event).await;
    }

    /// Simulate a send request on `{prefix}/send`.
    pub async fn request_send(&self, number: &str, message: &str) {
        let payload = serde_json::json!({ "number": number, "message": message });
        self.inbound(&format!("{PREFIX}/send"), payload.to_string().as_bytes())
            .await;
    }

    /// JSON payloads published on `{prefix}/{suffix}`.
    pub fn json_on(&self, suffix: &str) -> Vec<serde_json::Value> {
        self.published_on(suffix).iter().map(|m| m.json()).collect()
    }

    pub fn published_on(&self, suffix: &str) -> Vec<PublishedMessage> {
        self.mqtt.published_to(&format!("{PREFIX}/{suffix}"))
    }

    pub fn payloads_on(&self, suffix: &str) -> Vec<String> {
        self.published_on(suffix)
            .iter()
            .map(|m| m.payload_str().to_string())
            .collect()
    }

    pub fn grace(&self) -> Duration {
        self.config.shutdown_grace()
    }

    async fn handle(&self, event: Event) {
        match mqtt_loop::handle_event(event, self.bridge.publisher(), &self.requests) {
            LoopControl::Continue => {}
            LoopControl::Connected => mqtt_loop::announce(self.bridge.publisher().clone()).await,
            LoopControl::Disconnected => panic!("unexpected disconnect"),
        }
    }
}

pub fn status(connection: &str) -> Snapshot {
    [("ConnectionStatus", connection), ("SignalIcon", "4"), ("CurrentNetworkType", "19")]
        .into_iter()
        .collect()
}

pub fn signal(rssi: &str) -> Snapshot {
    [("rssi", rssi), ("cell_id", "20631331"), ("mode", "7")]
        .into_iter()
        .collect()
}

pub fn network(device_name: &str) -> Snapshot {
    [("DeviceName", device_name), ("workmode", "LTE"), ("Imei", "861234567890123")]
        .into_iter()
        .collect()
}

/// Advance the paused clock, letting every task run in between.
pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
