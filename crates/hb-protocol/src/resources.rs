use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Device resources polled on an interval and published on change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// `/api/monitoring/status`: connection state, signal bars, operator.
    Status,
    /// `/api/device/signal`: RSRP/RSRQ/SINR and cell identity.
    Signal,
    /// `/api/device/information`: model, firmware, IMEI, uptime.
    Network,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Status, Self::Signal, Self::Network];

    /// Last path segment of the bus topic for this kind.
    pub fn topic_suffix(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Signal => "signal",
            Self::Network => "network",
        }
    }

    /// Device API path serving this kind.
    pub fn api_path(self) -> &'static str {
        match self {
            Self::Status => "/api/monitoring/status",
            Self::Signal => "/api/device/signal",
            Self::Network => "/api/device/information",
        }
    }

    /// Status is republished every tick so late subscribers always
    /// see a fresh retained value.
    pub fn always_publish(self) -> bool {
        matches!(self, Self::Status)
    }

    /// Whether the broker should retain the latest snapshot.
    pub fn retained(self) -> bool {
        matches!(self, Self::Status)
    }

    /// Fields a document must carry to be accepted as this kind.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Status => &["ConnectionStatus", "SignalIcon"],
            Self::Signal => &["rssi", "cell_id", "mode"],
            Self::Network => &["DeviceName", "workmode"],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.topic_suffix())
    }
}

/// Flattened field → value view of a device resource document.
///
/// Ordered so that serialized payloads and equality checks are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, String>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First required field of `kind` that is absent, if any.
    pub fn missing_field(&self, kind: ResourceKind) -> Option<&'static str> {
        kind.required_fields()
            .iter()
            .copied()
            .find(|field| !self.0.contains_key(*field))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_status_is_always_published() {
        assert!(ResourceKind::Status.always_publish());
        assert!(!ResourceKind::Signal.always_publish());
        assert!(!ResourceKind::Network.always_publish());
    }

    #[test]
    fn snapshot_serializes_as_flat_object() {
        let snapshot: Snapshot = [("rsrp", "-95dBm"), ("cell_id", "1234")]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json, serde_json::json!({"cell_id": "1234", "rsrp": "-95dBm"}));
    }

    #[test]
    fn snapshot_equality_is_structural() {
        let a: Snapshot = [("a", "1"), ("b", "2")].into_iter().collect();
        let b: Snapshot = [("b", "2"), ("a", "1")].into_iter().collect();
        let c: Snapshot = [("a", "1"), ("b", "3")].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn missing_required_field_reported() {
        let snapshot: Snapshot = [("rssi", "-70dBm"), ("mode", "7")].into_iter().collect();
        assert_eq!(snapshot.missing_field(ResourceKind::Signal), Some("cell_id"));

        let complete: Snapshot = [("rssi", "-70dBm"), ("mode", "7"), ("cell_id", "42")]
            .into_iter()
            .collect();
        assert_eq!(complete.missing_field(ResourceKind::Signal), None);
    }

    #[test]
    fn display_matches_topic_suffix() {
        assert_eq!(ResourceKind::Network.to_string(), "network");
    }
}
