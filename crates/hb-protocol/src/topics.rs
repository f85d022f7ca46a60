//! MQTT topic builders and parsers for the bridge topic hierarchy.
//!
//! Every topic lives under a configurable prefix:
//! ```text
//! {prefix}/connected        retained "1" / "0", also the last will
//! {prefix}/status           retained, monitoring status snapshot
//! {prefix}/signal           signal quality snapshot
//! {prefix}/network          device information snapshot
//! {prefix}/received         inbound SMS events
//! {prefix}/sent             outbound SMS delivery results
//! {prefix}/router_status    retained "connected" / "disconnected"
//! {prefix}/datetime         periodic bridge clock
//! {prefix}/send             subscribed, send-SMS commands
//! ```

use crate::resources::ResourceKind;

// ─── Bridge health ───

pub fn connected(prefix: &str) -> String {
    format!("{prefix}/connected")
}

pub fn router_status(prefix: &str) -> String {
    format!("{prefix}/router_status")
}

pub fn datetime(prefix: &str) -> String {
    format!("{prefix}/datetime")
}

// ─── Device resources ───

/// Topic carrying snapshots of the given resource kind.
pub fn resource(prefix: &str, kind: ResourceKind) -> String {
    format!("{prefix}/{}", kind.topic_suffix())
}

// ─── SMS topics ───

pub fn received(prefix: &str) -> String {
    format!("{prefix}/received")
}

pub fn sent(prefix: &str) -> String {
    format!("{prefix}/sent")
}

pub fn send(prefix: &str) -> String {
    format!("{prefix}/send")
}

// ─── Topic parsing ───

/// Inbound topics the bridge reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    Send,
}

/// Match an incoming topic against the bridge's subscriptions.
/// Returns `None` for anything outside `prefix` or not handled.
pub fn parse_topic(prefix: &str, topic: &str) -> Option<InboundTopic> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    match rest {
        "send" => Some(InboundTopic::Send),
        _ => None,
    }
}

/// Reject prefixes that would produce invalid publish topics.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && !prefix.ends_with('/')
        && !prefix.contains(['+', '#'])
        && !prefix.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_topics() {
        assert_eq!(connected("huawei"), "huawei/connected");
        assert_eq!(router_status("huawei"), "huawei/router_status");
        assert_eq!(datetime("huawei"), "huawei/datetime");
    }

    #[test]
    fn resource_topics() {
        assert_eq!(resource("huawei", ResourceKind::Status), "huawei/status");
        assert_eq!(resource("huawei", ResourceKind::Signal), "huawei/signal");
        assert_eq!(resource("huawei", ResourceKind::Network), "huawei/network");
    }

    #[test]
    fn sms_topics() {
        assert_eq!(received("home/lte"), "home/lte/received");
        assert_eq!(sent("home/lte"), "home/lte/sent");
        assert_eq!(send("home/lte"), "home/lte/send");
    }

    #[test]
    fn parse_send_topic() {
        assert_eq!(
            parse_topic("home/lte", "home/lte/send"),
            Some(InboundTopic::Send)
        );
    }

    #[test]
    fn parse_foreign_topics() {
        assert_eq!(parse_topic("home/lte", "home/lte/sent"), None);
        assert_eq!(parse_topic("home/lte", "home/lteX/send"), None);
        assert_eq!(parse_topic("home/lte", "other/send"), None);
        assert_eq!(parse_topic("home/lte", ""), None);
    }

    #[test]
    fn prefix_validation() {
        assert!(is_valid_prefix("huawei"));
        assert!(is_valid_prefix("home/lte"));
        assert!(!is_valid_prefix(""));
        assert!(!is_valid_prefix("home/"));
        assert!(!is_valid_prefix("home/+"));
        assert!(!is_valid_prefix("#"));
    }
}
