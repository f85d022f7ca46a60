//! E2E tests for bus-requested SMS sends: delivery, retries, cooldown.

mod helpers;

use std::time::Duration;

use hb_hilink::{DeviceCall, MockSend};

use helpers::{PREFIX, TestHarness, advance};

#[tokio::test(start_paused = true)]
async fn e2e_connack_announces_bridge() {
    let h = TestHarness::start();
    h.connack().await;

    assert_eq!(h.payloads_on("connected"), ["1"]);
    assert!(h.published_on("connected")[0].retain);
    assert!(h.mqtt.is_subscribed_to(&format!("{PREFIX}/send")));
}

#[tokio::test(start_paused = true)]
async fn e2e_send_request_delivered() {
    let h = TestHarness::start();
    h.request_send("+33600000000", "hello").await;
    advance(1).await;

    assert_eq!(
        h.device.count(|c| matches!(c, DeviceCall::SendSms { .. })),
        1
    );
    assert!(h.device.calls().contains(&DeviceCall::SendSms {
        recipient: "+33600000000".into(),
        body: "hello".into(),
    }));

    let events = h.json_on("sent");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["status"], "success");
    assert_eq!(events[0]["number"], "+33600000000");
    assert_eq!(events[0]["message"], "hello");
    assert_eq!(events[0]["attempt"], 0);
    assert!(events[0]["timestamp"].is_string());
}

#[tokio::test(start_paused = true)]
async fn e2e_failed_send_retried_after_delay() {
    let h = TestHarness::start();
    h.device
        .script_sends([MockSend::Rejected("<error><code>113004</code></error>".into())]);
    h.request_send("+33600000000", "hello").await;
    advance(1).await;

    let events = h.json_on("sent");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["status"], "failure");
    assert_eq!(events[0]["attempt"], 0);
    assert!(events[0]["error"].as_str().unwrap().contains("113004"));

    // Nothing more until the retry delay has passed.
    advance(20).await;
    assert_eq!(h.device.send_instants().len(), 1);

    advance(15).await;
    let sends = h.device.send_instants();
    assert_eq!(sends.len(), 2);
    assert!(sends[1] - sends[0] >= Duration::from_secs(30));

    let events = h.json_on("sent");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["status"], "success");
    assert_eq!(events[1]["attempt"], 1);
}

#[tokio::test(start_paused = true)]
async fn e2e_unreachable_router_gives_up_after_three_retries() {
    let h = TestHarness::start();
    h.device.script_sends(std::iter::repeat_n(MockSend::Unreachable, 10));
    h.request_send("+33600000000", "hello").await;

    advance(200).await;

    assert_eq!(h.device.send_instants().len(), 4);
    let events = h.json_on("sent");
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e["status"] == "failure"));
    assert_eq!(events[3]["attempt"], 3);
}

#[tokio::test(start_paused = true)]
async fn e2e_back_to_back_requests_respect_cooldown() {
    let h = TestHarness::start();
    h.request_send("+33611111111", "first").await;
    h.request_send("+33622222222", "second").await;

    advance(5).await;
    assert_eq!(h.device.send_instants().len(), 1);

    advance(10).await;
    let sends = h.device.send_instants();
    assert_eq!(sends.len(), 2);
    assert!(sends[1] - sends[0] >= Duration::from_secs(10));
    assert_eq!(h.json_on("sent").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn e2e_malformed_requests_ignored() {
    let h = TestHarness::start();
    let topic = format!("{PREFIX}/send");
    h.inbound(&topic, b"not json").await;
    h.inbound(&topic, br#"{"number":"+33600000000"}"#).await;
    h.inbound(&topic, br#"{"number":"","message":"hi"}"#).await;
    advance(1).await;

    assert!(h.device.send_instants().is_empty());
    assert!(h.published_on("sent").is_empty());
}
