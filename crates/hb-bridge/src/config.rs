//! Bridge configuration, loadable from TOML or environment.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use hb_hilink::DeviceConfig;
use hb_mqtt_channel::MqttConfig;
use hb_protocol::{ResourceKind, topics};

/// Invalid or missing settings. Always fatal at launch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("environment variable {var} is not a valid number: '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("invalid setting {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Top-level configuration for the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Router connection settings.
    pub device: DeviceConfig,
    /// MQTT connection settings.
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    /// Interval of the `{prefix}/datetime` clock publication.
    #[serde(default = "default_datetime_interval")]
    pub datetime_interval_secs: u64,
    /// How long the broker has to accept the first connection at launch.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Upper bound on waiting for tasks during shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON log lines (default) or human-readable text.
    #[serde(default = "default_log_json")]
    pub log_json: bool,
}

/// Per-resource polling intervals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub status_interval_secs: u64,
    pub signal_interval_secs: u64,
    pub network_interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 10,
            signal_interval_secs: 60,
            network_interval_secs: 10,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self, kind: ResourceKind) -> Duration {
        let secs = match kind {
            ResourceKind::Status => self.status_interval_secs,
            ResourceKind::Signal => self.signal_interval_secs,
            ResourceKind::Network => self.network_interval_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Inbox intake and outbound send settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub check_interval_secs: u64,
    /// Messages requested per `sms-list` page.
    pub page_size: u32,
    /// Upper bound of messages published and acknowledged per cycle.
    pub max_per_cycle: usize,
    /// Pause after each acknowledged message.
    pub pace_millis: u64,
    /// Minimum spacing between two send attempts.
    pub cooldown_secs: u64,
    pub retry_delay_secs: u64,
    /// Retries after the initial attempt.
    pub max_retries: u32,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            page_size: 20,
            max_per_cycle: 5,
            pace_millis: 500,
            cooldown_secs: 10,
            retry_delay_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub interval_secs: u64,
    /// Bound on a single reachability probe.
    pub timeout_secs: u64,
    /// Consecutive failures that stop the bridge.
    pub failure_threshold: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 10,
            failure_threshold: 3,
        }
    }
}

fn default_datetime_interval() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_json() -> bool {
    true
}

impl BridgeConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from environment variables, after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from a variable lookup (environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::MissingVar(key));
        let number = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            get(key)
                .map(|value| {
                    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                        var: key,
                        value,
                    })
                })
                .transpose()
        };

        let mut mqtt = MqttConfig::new(require("MQTT_IP")?);
        if let Some(port) = number("PORT")? {
            mqtt.broker_port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
                field: "PORT",
                reason: "must be a TCP port",
            })?;
        }
        if let Some(client_id) = get("CLIENTID") {
            mqtt.client_id = client_id;
        }
        mqtt.username = get("MQTT_ACCOUNT");
        mqtt.password = get("MQTT_PASSWORD");
        if let Some(prefix) = get("MQTT_TOPIC") {
            mqtt.topic_prefix = prefix;
        }

        let mut polling = PollingConfig::default();
        if let Some(secs) = number("DELAY_SECOND")? {
            polling.status_interval_secs = secs;
            polling.network_interval_secs = secs;
        }
        if let Some(secs) = number("SIGNAL_CHECK_INTERVAL")? {
            polling.signal_interval_secs = secs;
        }

        let mut sms = SmsConfig::default();
        if let Some(secs) = number("SMS_CHECK_INTERVAL")? {
            sms.check_interval_secs = secs;
        }

        Ok(Self {
            device: DeviceConfig::new(require("HUAWEI_ROUTER_IP_ADDRESS")?),
            mqtt,
            polling,
            sms,
            watchdog: WatchdogConfig::default(),
            datetime_interval_secs: default_datetime_interval(),
            connect_timeout_secs: default_connect_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            log_level: get("LOG_LEVEL").unwrap_or_else(default_log_level),
            log_json: default_log_json(),
        })
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.device.host.trim().is_empty() {
            return invalid("device.host", "must not be empty");
        }
        if self.device.timeout_secs == 0 {
            return invalid("device.timeout_secs", "must be positive");
        }
        if self.mqtt.broker_host.trim().is_empty() {
            return invalid("mqtt.broker_host", "must not be empty");
        }
        if self.mqtt.client_id.trim().is_empty() {
            return invalid("mqtt.client_id", "must not be empty");
        }
        if !topics::is_valid_prefix(&self.mqtt.topic_prefix) {
            return invalid(
                "mqtt.topic_prefix",
                "must be non-empty, without wildcards or trailing '/'",
            );
        }

        let intervals = [
            ("polling.status_interval_secs", self.polling.status_interval_secs),
            ("polling.signal_interval_secs", self.polling.signal_interval_secs),
            ("polling.network_interval_secs", self.polling.network_interval_secs),
            ("sms.check_interval_secs", self.sms.check_interval_secs),
            ("watchdog.interval_secs", self.watchdog.interval_secs),
            ("watchdog.timeout_secs", self.watchdog.timeout_secs),
            ("datetime_interval_secs", self.datetime_interval_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ];
        if let Some((field, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return invalid(*field, "must be positive");
        }

        if self.sms.page_size == 0 {
            return invalid("sms.page_size", "must be positive");
        }
        if self.sms.max_per_cycle == 0 {
            return invalid("sms.max_per_cycle", "must be positive");
        }
        if self.watchdog.failure_threshold == 0 {
            return invalid("watchdog.failure_threshold", "must be positive");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
