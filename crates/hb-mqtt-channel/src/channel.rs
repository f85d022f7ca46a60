//! MQTT channel: async client for the broker.
//!
//! Wraps `rumqttc::AsyncClient`. Typed helpers per topic live in
//! [`crate::publisher`] so they work over any `Channel`.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};

use hb_protocol::topics;

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

/// Payload published on `{prefix}/connected` while the bridge is up.
pub const CONNECTED_PAYLOAD: &str = "1";
/// Payload published on `{prefix}/connected` when the bridge goes away,
/// either explicitly or through the broker-held last will.
pub const DISCONNECTED_PAYLOAD: &str = "0";

/// Requests the client buffers before `publish` starts waiting on the
/// event loop.
pub const REQUEST_CAPACITY: usize = 64;

// ── Channel trait ─────────────────────────────────────────────

/// Abstraction for MQTT message publishing and subscribing.
///
/// Enables mocking in tests without a real MQTT broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool)
    -> MqttResult<()>;

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()>;

    /// Ask the broker connection to close after queued publishes.
    async fn disconnect(&self) -> MqttResult<()>;
}

// ── MqttChannel ───────────────────────────────────────────────

/// MQTT channel connected to the configured broker.
///
/// Owns the `AsyncClient` for publishing/subscribing. The `EventLoop`
/// is returned separately from `new()`; the caller must drive it in a
/// spawned task via `eventloop.poll()`.
pub struct MqttChannel {
    client: AsyncClient,
}

impl MqttChannel {
    /// Create a new channel.
    ///
    /// Registers a retained last will of `"0"` on `{prefix}/connected`
    /// so subscribers learn about an unclean exit.
    pub fn new(config: &MqttConfig) -> (Self, EventLoop) {
        Self::with_capacity(config, REQUEST_CAPACITY)
    }

    /// Like [`MqttChannel::new`] with a custom request queue size.
    pub fn with_capacity(config: &MqttConfig, capacity: usize) -> (Self, EventLoop) {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(std::time::Duration::from_secs(config.keepalive_secs.into()));

        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        options.set_last_will(LastWill::new(
            topics::connected(&config.topic_prefix),
            DISCONNECTED_PAYLOAD,
            QoS::AtLeastOnce,
            true,
        ));

        tracing::debug!(
            broker = %config.broker_host,
            port = config.broker_port,
            client_id = %config.client_id,
            authenticated = config.username.is_some(),
            "MQTT options configured"
        );

        let (client, eventloop) = AsyncClient::new(options, capacity);
        (Self { client }, eventloop)
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> MqttResult<()> {
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| MqttError::Publish {
                topic: topic.to_string(),
                detail: e.to_string(),
            })
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.client
            .subscribe(filter, qos)
            .await
            .map_err(|e| MqttError::Subscribe {
                filter: filter.to_string(),
                detail: e.to_string(),
            })
    }

    async fn disconnect(&self) -> MqttResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| MqttError::Disconnect(e.to_string()))
    }
}
