//! MQTT event loop driver and incoming message dispatcher.
//!
//! Drives the rumqttc event loop, re-announcing the bridge and
//! re-subscribing on every (re)connect, and hands decoded send requests to
//! the dispatcher over a bounded channel.
//!
//! Only this loop drains the client's request queue, so nothing here may
//! await a publish. The announce after a ConnAck runs in its own task.

use std::time::Duration;

use rumqttc::{Event, EventLoop, Outgoing, Packet};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hb_mqtt_channel::{BridgePublisher, Channel, IncomingMessage, classify};
use hb_protocol::SendCommand;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// What the loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    /// The broker accepted the connection; announce and resubscribe.
    Connected,
    /// Our own disconnect went out; nothing more to drive.
    Disconnected,
}

/// Drive the event loop until the bridge disconnects or `token` is
/// cancelled. `connected` follows the broker session: true from each
/// ConnAck until the next connection error.
///
/// `token` is separate from the bridge run token so the final
/// `connected = 0` publish and disconnect are still flushed after the
/// other tasks have stopped.
pub async fn run<C: Channel + 'static>(
    mut eventloop: EventLoop,
    publisher: BridgePublisher<C>,
    requests: mpsc::Sender<SendCommand>,
    connected: watch::Sender<bool>,
    token: CancellationToken,
) {
    let mut announcing: Option<JoinHandle<()>> = None;
    loop {
        let polled = tokio::select! {
            () = token.cancelled() => break,
            polled = eventloop.poll() => polled,
        };

        match polled {
            Ok(event) => match handle_event(event, &publisher, &requests) {
                LoopControl::Continue => {}
                LoopControl::Connected => {
                    connected.send_replace(true);
                    if let Some(previous) = announcing.take() {
                        previous.abort();
                    }
                    announcing = Some(tokio::spawn(announce(publisher.clone())));
                }
                LoopControl::Disconnected => {
                    tracing::info!("MQTT disconnected");
                    break;
                }
            },
            Err(e) => {
                connected.send_replace(false);
                tracing::error!(error = %e, "MQTT event loop error, reconnecting in 5s");
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
    if let Some(pending) = announcing {
        pending.abort();
    }
    connected.send_replace(false);
    tracing::debug!("MQTT loop stopped");
}

/// Publish retained `connected = 1` and subscribe to the send topic.
///
/// Waits for room in the client's request queue, so it must not run on
/// the task that drives the event loop.
pub async fn announce<C: Channel>(publisher: BridgePublisher<C>) {
    if let Err(e) = publisher.publish_connected(true).await {
        tracing::warn!(error = %e, "failed to publish connected flag");
    }
    if let Err(e) = publisher.subscribe_commands().await {
        tracing::error!(error = %e, "failed to subscribe to send topic");
    }
}

/// Handle one event without touching the outgoing queue.
pub fn handle_event<C: Channel>(
    event: Event,
    publisher: &BridgePublisher<C>,
    requests: &mpsc::Sender<SendCommand>,
) -> LoopControl {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            tracing::info!(code = ?ack.code, "MQTT connected");
            return LoopControl::Connected;
        }
        Event::Incoming(Packet::Publish(publish)) => {
            handle_message(classify(publisher.prefix(), &publish), requests);
        }
        Event::Outgoing(Outgoing::Disconnect) => return LoopControl::Disconnected,
        _ => {}
    }
    LoopControl::Continue
}

fn handle_message(msg: IncomingMessage, requests: &mpsc::Sender<SendCommand>) {
    match msg {
        IncomingMessage::SendRequest(command) => {
            tracing::debug!(number = %command.number, "send request received");
            match requests.try_send(command) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(command)) => {
                    tracing::warn!(number = %command.number, "send queue full, dropping request");
                }
                Err(mpsc::error::TrySendError::Closed(command)) => {
                    tracing::warn!(number = %command.number, "dispatcher gone, dropping request");
                }
            }
        }
        IncomingMessage::Malformed { topic, reason } => {
            tracing::warn!(topic = %topic, reason = %reason, "ignoring malformed send request");
        }
        IncomingMessage::Unknown { topic, .. } => {
            tracing::debug!(topic = %topic, "ignoring unrecognized message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rumqttc::{ConnAck, ConnectReturnCode, Publish, QoS};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use hb_mqtt_channel::{MockChannel, MqttChannel, MqttConfig};

    fn setup() -> (Arc<MockChannel>, BridgePublisher<MockChannel>) {
        let mock = Arc::new(MockChannel::new());
        (mock.clone(), BridgePublisher::new(mock, "huawei"))
    }

    fn incoming(topic: &str, payload: &[u8]) -> Event {
        Event::Incoming(Packet::Publish(Publish::new(topic, QoS::AtLeastOnce, payload)))
    }

    fn connack() -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)))
    }

    #[tokio::test]
    async fn connack_announces_and_subscribes() {
        let (mock, publisher) = setup();
        let (tx, _rx) = mpsc::channel(4);

        for _ in 0..2 {
            assert_eq!(handle_event(connack(), &publisher, &tx), LoopControl::Connected);
            announce(publisher.clone()).await;
        }

        let connected = mock.published_to("huawei/connected");
        assert_eq!(connected.len(), 2);
        assert!(connected.iter().all(|m| m.payload_str() == "1" && m.retain));
        assert_eq!(mock.subscriptions().len(), 2);
        assert!(mock.is_subscribed_to("huawei/send"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_bus_does_not_block_event_handling() {
        let (mock, publisher) = setup();
        let (tx, mut rx) = mpsc::channel(4);
        mock.stall(true);

        assert_eq!(handle_event(connack(), &publisher, &tx), LoopControl::Connected);
        let announcing = tokio::spawn(announce(publisher.clone()));
        let payload = br#"{"number":"+33600000000","message":"hello"}"#;
        handle_event(incoming("huawei/send", payload), &publisher, &tx);
        assert!(rx.try_recv().is_ok());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!announcing.is_finished());

        mock.stall(false);
        announcing.await.unwrap();
        assert_eq!(mock.published_to("huawei/connected").len(), 1);
        assert!(mock.is_subscribed_to("huawei/send"));
    }

    #[tokio::test]
    async fn send_request_forwarded() {
        let (_mock, publisher) = setup();
        let (tx, mut rx) = mpsc::channel(4);

        let event = incoming(
            "huawei/send",
            br#"{"number":"+33600000000","message":"hello"}"#,
        );
        assert_eq!(handle_event(event, &publisher, &tx), LoopControl::Continue);

        let command = rx.try_recv().unwrap();
        assert_eq!(command.number, "+33600000000");
        assert_eq!(command.message, "hello");
    }

    #[tokio::test]
    async fn malformed_and_foreign_messages_dropped() {
        let (mock, publisher) = setup();
        let (tx, mut rx) = mpsc::channel(4);

        handle_event(incoming("huawei/send", b"{\"number\":\"\"}"), &publisher, &tx);
        handle_event(incoming("huawei/send", b"garbage"), &publisher, &tx);
        handle_event(incoming("other/send", b"{}"), &publisher, &tx);

        assert!(rx.try_recv().is_err());
        assert!(mock.published().is_empty());
    }

    #[tokio::test]
    async fn full_queue_drops_request() {
        let (_mock, publisher) = setup();
        let (tx, mut rx) = mpsc::channel(1);
        let payload = br#"{"number":"+33600000000","message":"hello"}"#;

        handle_event(incoming("huawei/send", payload), &publisher, &tx);
        handle_event(incoming("huawei/send", payload), &publisher, &tx);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn outgoing_disconnect_ends_loop() {
        let (_mock, publisher) = setup();
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(
            handle_event(Event::Outgoing(Outgoing::Disconnect), &publisher, &tx),
            LoopControl::Disconnected
        );
    }

    // ── Against a socket ──────────────────────────────────────

    /// Accept one client, answer its CONNECT and collect what it sends
    /// until `needle` shows up or `window` runs out. The socket is handed
    /// back so the session stays up.
    async fn fake_broker(
        listener: TcpListener,
        needle: &'static [u8],
        window: Duration,
    ) -> (Vec<u8>, TcpStream) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0 && buf[0] == 0x10, "expected CONNECT");
        socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

        let mut seen = Vec::new();
        let _ = tokio::time::timeout(window, async {
            loop {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if seen.windows(needle.len()).any(|w| w == needle) {
                    break;
                }
            }
        })
        .await;
        (seen, socket)
    }

    #[tokio::test]
    async fn connack_with_full_request_queue_still_subscribes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = MqttConfig::new("127.0.0.1");
        config.broker_port = listener.local_addr().unwrap().port();

        let (channel, eventloop) = MqttChannel::with_capacity(&config, 2);
        let publisher = BridgePublisher::new(Arc::new(channel), "huawei");
        // Fill the queue while nothing drives the loop, as during an outage.
        publisher.publish_datetime(1).await.unwrap();
        publisher.publish_datetime(2).await.unwrap();

        let broker = tokio::spawn(fake_broker(listener, b"huawei/send", Duration::from_secs(5)));
        let (tx, _rx) = mpsc::channel(4);
        let (connected_tx, mut connected) = watch::channel(false);
        let token = CancellationToken::new();
        let driver = tokio::spawn(run(eventloop, publisher, tx, connected_tx, token.clone()));

        let (seen, _session) = broker.await.unwrap();
        assert!(*connected.wait_for(|c| *c).await.unwrap());
        assert!(seen.windows(16).any(|w| w == b"huawei/connected"));
        assert!(seen.windows(11).any(|w| w == b"huawei/send"));

        token.cancel();
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn refused_broker_never_reports_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = MqttConfig::new("127.0.0.1");
        config.broker_port = listener.local_addr().unwrap().port();
        drop(listener);

        let (channel, eventloop) = MqttChannel::new(&config);
        let publisher = BridgePublisher::new(Arc::new(channel), "huawei");
        let (tx, _rx) = mpsc::channel(4);
        let (connected_tx, mut connected) = watch::channel(true);
        let token = CancellationToken::new();
        let driver = tokio::spawn(run(eventloop, publisher, tx, connected_tx, token.clone()));

        connected.wait_for(|c| !*c).await.unwrap();
        let accepted =
            tokio::time::timeout(Duration::from_secs(1), connected.wait_for(|c| *c)).await;
        assert!(accepted.is_err());
        drop(accepted);
        token.cancel();
        driver.await.unwrap();
    }
}
