//! Mock MQTT channel for testing without a real broker.
//!
//! Records all published messages, subscription filters and disconnects
//! for assertion in tests. Can also stall every call, the way a real client
//! behaves once its request queue is full and nothing drains it.

use async_trait::async_trait;
use rumqttc::QoS;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;

use crate::channel::Channel;
use crate::error::{MqttError, MqttResult};

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Mock implementation of the `Channel` trait.
///
/// Stores all publishes and subscriptions in memory for test verification.
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    disconnects: AtomicUsize,
    fail_publish: AtomicBool,
    stalled: watch::Sender<bool>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            fail_publish: AtomicBool::new(false),
            stalled: watch::Sender::new(false),
        }
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Get all subscription filters.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Check whether a subscription was made to the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|(f, _)| f == filter)
    }

    /// Number of `disconnect` calls.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Make subsequent publishes fail (nothing is recorded while failing).
    pub fn fail_publishes(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }

    /// While stalled, `publish`, `subscribe` and `disconnect` stay pending.
    /// Releasing lets the waiting calls complete.
    pub fn stall(&self, stalled: bool) {
        self.stalled.send_replace(stalled);
    }

    async fn wait_unstalled(&self) {
        let mut rx = self.stalled.subscribe();
        // The sender lives in `self`, so the wait can only end by release.
        let _ = rx.wait_for(|stalled| !*stalled).await;
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        self.published.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
        self.disconnects.store(0, Ordering::SeqCst);
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> MqttResult<()> {
        self.wait_unstalled().await;
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MqttError::Publish {
                topic: topic.to_string(),
                detail: "mock publish failure".into(),
            });
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.wait_unstalled().await;
        self.subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), qos));
        Ok(())
    }

    async fn disconnect(&self) -> MqttResult<()> {
        self.wait_unstalled().await;
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
