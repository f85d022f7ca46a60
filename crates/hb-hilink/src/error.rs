//! Device API error types.

use thiserror::Error;

/// Errors that can occur while talking to the router.
///
/// `resource` names the endpoint (e.g. `"signal"`, `"sms-list"`) so log
/// lines identify which exchange failed.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{resource}: transport error: {detail}")]
    Transport {
        resource: &'static str,
        detail: String,
    },

    #[error("{resource}: no response after {timeout_ms}ms")]
    Timeout {
        resource: &'static str,
        timeout_ms: u64,
    },

    #[error("{resource}: malformed response: {detail}")]
    Malformed {
        resource: &'static str,
        detail: String,
    },

    #[error("{resource}: device error code {code}")]
    Api { resource: &'static str, code: String },
}

impl DeviceError {
    /// Whether the failure happened before a credential pair was obtained.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Convenience alias for device results.
pub type DeviceResult<T> = Result<T, DeviceError>;
