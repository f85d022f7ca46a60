//! HiLink bridge: exposes a HiLink cellular router over MQTT.
//!
//! Polls router status, signal and network information, forwards incoming
//! SMS and sends SMS requested over the bus.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hb_bridge::{
    Bridge, BridgeConfig, BridgeSettings, REQUEST_QUEUE_CAPACITY, RunState, StopReason, mqtt_loop,
};
use hb_hilink::{DeviceApi, HilinkClient};
use hb_mqtt_channel::{BridgePublisher, MqttChannel};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // ── Load config ─────────────────────────────────────────────
    let config = match std::env::args().nth(1) {
        Some(path) => BridgeConfig::from_file(&path)?,
        None => BridgeConfig::from_env()?,
    };
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        router = %config.device.base_url(),
        broker = %config.mqtt.broker_host,
        prefix = %config.mqtt.topic_prefix,
        "hilink-bridge starting"
    );

    // ── Router ──────────────────────────────────────────────────
    let device = HilinkClient::new(&config.device)?;
    device
        .probe()
        .await
        .context("router did not answer the session request")?;
    tracing::info!("router reachable");

    // ── MQTT channel ────────────────────────────────────────────
    let (channel, eventloop) = MqttChannel::new(&config.mqtt);
    let publisher = BridgePublisher::new(Arc::new(channel), config.mqtt.topic_prefix.clone());

    let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
    let (connected_tx, mut connected) = watch::channel(false);
    let bus_token = CancellationToken::new();
    let mut mqtt_task = tokio::spawn(mqtt_loop::run(
        eventloop,
        publisher.clone(),
        requests_tx,
        connected_tx,
        bus_token.clone(),
    ));

    let connect_timeout = config.connect_timeout();
    let accepted = matches!(
        tokio::time::timeout(connect_timeout, connected.wait_for(|up| *up)).await,
        Ok(Ok(_))
    );
    if !accepted {
        bus_token.cancel();
        let _ = mqtt_task.await;
        anyhow::bail!(
            "broker {}:{} did not accept a connection within {}s",
            config.mqtt.broker_host,
            config.mqtt.broker_port,
            connect_timeout.as_secs()
        );
    }
    tracing::info!("broker reachable");

    // ── Bridge tasks ────────────────────────────────────────────
    let state = Arc::new(RunState::new());
    let bridge = Bridge::new(
        Arc::new(device),
        publisher,
        BridgeSettings::from(&config),
        Arc::clone(&state),
    );
    bridge.start(requests_rx);
    tokio::spawn(wait_for_signal(Arc::clone(&state)));

    state.token().cancelled().await;

    // ── Shutdown ────────────────────────────────────────────────
    let grace = config.shutdown_grace();
    bridge.shutdown(grace).await;
    if tokio::time::timeout(grace, &mut mqtt_task).await.is_err() {
        tracing::warn!("MQTT loop did not flush in time");
        bus_token.cancel();
        let _ = mqtt_task.await;
    }

    match state.reason() {
        Some(reason) if reason.is_clean() => {
            tracing::info!("hilink-bridge stopped");
            Ok(ExitCode::SUCCESS)
        }
        reason => {
            tracing::error!(reason = ?reason, "hilink-bridge stopped abnormally");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// JSON or plain logs; `RUST_LOG` overrides the configured level.
fn init_tracing(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Request a stop on SIGINT or SIGTERM.
async fn wait_for_signal(state: Arc<RunState>) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "cannot listen for SIGINT");
                return;
            }
        }
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
    state.request_stop(StopReason::Signal);
}
