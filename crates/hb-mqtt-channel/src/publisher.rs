//! Typed publish helpers for the bridge topics.
//!
//! Wraps any `Channel` (real or mock) so components publish events
//! without knowing topic layout, QoS or retain flags.

use std::sync::Arc;

use rumqttc::QoS;
use serde::Serialize;

use hb_protocol::{ReceivedSms, ResourceKind, SentEvent, Snapshot, topics};

use crate::channel::{CONNECTED_PAYLOAD, Channel, DISCONNECTED_PAYLOAD};
use crate::error::{MqttError, MqttResult};

/// Router reachability as seen by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Connected,
    Disconnected,
}

impl RouterState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Bridge publish operations backed by a `Channel` implementation.
pub struct BridgePublisher<C: Channel> {
    channel: Arc<C>,
    prefix: String,
}

impl<C: Channel> Clone for BridgePublisher<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            prefix: self.prefix.clone(),
        }
    }
}

impl<C: Channel> BridgePublisher<C> {
    pub fn new(channel: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            channel,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Retained bridge liveness flag (`"1"` / `"0"`).
    pub async fn publish_connected(&self, connected: bool) -> MqttResult<()> {
        let payload = if connected {
            CONNECTED_PAYLOAD
        } else {
            DISCONNECTED_PAYLOAD
        };
        self.channel
            .publish(
                &topics::connected(&self.prefix),
                payload.as_bytes(),
                QoS::AtLeastOnce,
                true,
            )
            .await
    }

    /// Publish a resource snapshot as a flat JSON object.
    pub async fn publish_snapshot(&self, kind: ResourceKind, snapshot: &Snapshot) -> MqttResult<()> {
        let topic = topics::resource(&self.prefix, kind);
        self.publish_json(&topic, snapshot, kind.retained()).await
    }

    pub async fn publish_received(&self, sms: &ReceivedSms) -> MqttResult<()> {
        let topic = topics::received(&self.prefix);
        self.publish_json(&topic, sms, false).await
    }

    pub async fn publish_sent(&self, event: &SentEvent) -> MqttResult<()> {
        let topic = topics::sent(&self.prefix);
        self.publish_json(&topic, event, false).await
    }

    /// Retained router reachability (`"connected"` / `"disconnected"`).
    pub async fn publish_router_status(&self, state: RouterState) -> MqttResult<()> {
        self.channel
            .publish(
                &topics::router_status(&self.prefix),
                state.as_str().as_bytes(),
                QoS::AtLeastOnce,
                true,
            )
            .await
    }

    /// Bridge clock as Unix seconds.
    pub async fn publish_datetime(&self, unix_secs: i64) -> MqttResult<()> {
        self.channel
            .publish(
                &topics::datetime(&self.prefix),
                unix_secs.to_string().as_bytes(),
                QoS::AtMostOnce,
                false,
            )
            .await
    }

    /// Subscribe to inbound send-SMS commands.
    pub async fn subscribe_commands(&self) -> MqttResult<()> {
        self.channel
            .subscribe(&topics::send(&self.prefix), QoS::AtLeastOnce)
            .await
    }

    pub async fn disconnect(&self) -> MqttResult<()> {
        self.channel.disconnect().await
    }

    async fn publish_json<T: Serialize>(&self, topic: &str, payload: &T, retain: bool) -> MqttResult<()> {
        let bytes = serde_json::to_vec(payload).map_err(|e| MqttError::Encode {
            topic: topic.to_string(),
            detail: e.to_string(),
        })?;
        self.channel
            .publish(topic, &bytes, QoS::AtLeastOnce, retain)
            .await
    }
}
