use std::time::Duration;

use serde::Deserialize;

/// Router connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Router address, bare IP/hostname or full `http://` base URL.
    pub host: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
