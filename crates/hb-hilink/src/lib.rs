//! HiLink router API client.
//!
//! Provides the device side of the bridge:
//! - `SessionManager` fetching a fresh session/token pair per request
//! - `DeviceApi` trait with one operation per resource kind (mockable in tests)
//! - `HilinkClient` speaking the router's XML-over-HTTP API
//! - `MockDevice` with a scripted inbox and send outcomes

pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod session;
pub mod types;
pub mod xml;

pub use client::{DeviceApi, HilinkClient};
pub use config::DeviceConfig;
pub use error::{DeviceError, DeviceResult};
pub use mock::{DeviceCall, MockDevice, MockSend};
pub use session::SessionManager;
pub use types::{CredentialPair, WriteOutcome};
