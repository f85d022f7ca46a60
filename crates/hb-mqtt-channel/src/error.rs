//! MQTT channel error types.

use thiserror::Error;

/// Failures handing a request to the MQTT client. These never mean the
/// broker received (or rejected) anything; delivery happens in the event
/// loop.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("publish to '{topic}' failed: {detail}")]
    Publish { topic: String, detail: String },

    #[error("subscribe to '{filter}' failed: {detail}")]
    Subscribe { filter: String, detail: String },

    #[error("disconnect failed: {0}")]
    Disconnect(String),

    #[error("cannot encode payload for '{topic}': {detail}")]
    Encode { topic: String, detail: String },
}

pub type MqttResult<T> = Result<T, MqttError>;
