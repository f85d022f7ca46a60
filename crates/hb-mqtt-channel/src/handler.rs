//! Incoming message classification for the MQTT event loop.
//!
//! Parses raw MQTT publishes into typed `IncomingMessage` variants
//! so the bridge can dispatch them without topic string matching.

use rumqttc::Publish;

use hb_protocol::SendCommand;
use hb_protocol::topics::{self, InboundTopic};

/// A classified incoming MQTT message.
#[derive(Debug)]
pub enum IncomingMessage {
    /// Valid send-SMS request.
    SendRequest(SendCommand),
    /// Publish on a handled topic whose payload failed validation.
    Malformed { topic: String, reason: String },
    /// Unrecognized topic.
    Unknown { topic: String, payload: Vec<u8> },
}

/// Classify a raw MQTT publish into a typed message.
pub fn classify(prefix: &str, publish: &Publish) -> IncomingMessage {
    let topic = &publish.topic;

    match topics::parse_topic(prefix, topic) {
        Some(InboundTopic::Send) => match SendCommand::parse(&publish.payload) {
            Ok(command) => IncomingMessage::SendRequest(command),
            Err(e) => IncomingMessage::Malformed {
                topic: topic.clone(),
                reason: e.to_string(),
            },
        },
        None => IncomingMessage::Unknown {
            topic: topic.clone(),
            payload: publish.payload.to_vec(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::QoS;

    fn make_publish(topic: &str, payload: &[u8]) -> Publish {
        let mut publish = Publish::new(topic, QoS::AtLeastOnce, payload);
        publish.pkid = 1;
        publish
    }

    #[test]
    fn classify_send_request() {
        let publish = make_publish(
            "huawei/send",
            br#"{"number":"+33600000000","message":"hello"}"#,
        );
        let msg = classify("huawei", &publish);
        assert!(
            matches!(msg, IncomingMessage::SendRequest(ref c) if c.number == "+33600000000" && c.message == "hello")
        );
    }

    #[test]
    fn classify_missing_field() {
        let publish = make_publish("huawei/send", br#"{"number":"+33600000000"}"#);
        let msg = classify("huawei", &publish);
        assert!(matches!(msg, IncomingMessage::Malformed { ref reason, .. } if reason.contains("message")));
    }

    #[test]
    fn classify_bad_payload() {
        let publish = make_publish("huawei/send", b"not-json");
        assert!(matches!(
            classify("huawei", &publish),
            IncomingMessage::Malformed { .. }
        ));
    }

    #[test]
    fn classify_unknown_topic() {
        let publish = make_publish("some/random/topic", b"data");
        assert!(matches!(
            classify("huawei", &publish),
            IncomingMessage::Unknown { .. }
        ));
    }

    #[test]
    fn classify_own_outbound_topic_is_unknown() {
        // `sent` is outbound only, seeing it inbound is not a command.
        let publish = make_publish("huawei/sent", br#"{"number":"1","message":"x"}"#);
        assert!(matches!(
            classify("huawei", &publish),
            IncomingMessage::Unknown { .. }
        ));
    }
}
