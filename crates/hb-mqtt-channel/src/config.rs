use serde::Deserialize;

/// MQTT connection configuration, loadable from TOML or environment.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP.
    pub broker_host: String,
    /// MQTT broker port (default 1883).
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// MQTT client ID (should be unique per bridge instance).
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Broker account. Anonymous when unset.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Root of every bridge topic (e.g. "huawei").
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "hilink-bridge".to_string()
}

fn default_topic_prefix() -> String {
    "huawei".to_string()
}

fn default_keepalive() -> u16 {
    30
}

impl MqttConfig {
    /// Config with defaults for everything but the broker host.
    pub fn new(broker_host: impl Into<String>) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
            keepalive_secs: default_keepalive(),
        }
    }
}
