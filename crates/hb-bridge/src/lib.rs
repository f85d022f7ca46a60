//! HiLink bridge: library crate for the router to MQTT bridge.
//!
//! Re-exports all modules so external crates (e.g. `hb-e2e-tests`) can
//! drive the bridge against mock devices and channels.

pub mod bridge;
pub mod config;
pub mod datetime;
pub mod dispatcher;
pub mod lifecycle;
pub mod mqtt_loop;
pub mod poller;
pub mod sms_intake;
pub mod watchdog;

pub use bridge::{Bridge, BridgeSettings, REQUEST_QUEUE_CAPACITY, ShutdownReport};
pub use config::{BridgeConfig, ConfigError};
pub use lifecycle::{Phase, RunState, StopReason};
