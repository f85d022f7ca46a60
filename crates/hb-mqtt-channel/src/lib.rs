//! MQTT channel for the bridge.
//!
//! Provides a typed MQTT abstraction:
//! - `Channel` trait for publish/subscribe/disconnect (mockable in tests)
//! - `MqttChannel` over rumqttc, with broker credentials and a last will
//! - `MockChannel` for testing without a broker
//! - `BridgePublisher` with one helper per outbound topic
//! - `IncomingMessage` classification of inbound publishes

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod mock;
pub mod publisher;

// Re-exports for convenience.
pub use channel::{Channel, MqttChannel};
pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use handler::{IncomingMessage, classify};
pub use mock::{MockChannel, PublishedMessage};
pub use publisher::{BridgePublisher, RouterState};
