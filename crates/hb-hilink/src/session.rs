//! Session/token acquisition.

use crate::error::{DeviceError, DeviceResult};
use crate::types::CredentialPair;
use crate::xml;

const SESSION_PATH: &str = "/api/webserver/SesTokInfo";

/// Fetches a fresh [`CredentialPair`] from the router.
///
/// Nothing is cached: the router can drop a session at any moment and
/// does not expose an expiry, so callers refresh right before each
/// privileged request.
#[derive(Debug, Clone)]
pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
}

impl SessionManager {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Request a new session id and anti-forgery token.
    pub async fn refresh(&self) -> DeviceResult<CredentialPair> {
        let url = format!("{}{SESSION_PATH}", self.base_url);

        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                DeviceError::Auth("token endpoint timed out".into())
            } else {
                DeviceError::Auth(format!("token endpoint unreachable: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Auth(format!("token endpoint returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DeviceError::Auth(format!("failed to read token response: {e}")))?;

        let credentials = xml::parse_credentials(&body)?;
        tracing::trace!("session credentials refreshed");
        Ok(credentials)
    }
}
