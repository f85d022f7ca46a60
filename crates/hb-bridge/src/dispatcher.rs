//! Outbound SMS dispatch.
//!
//! Send requests arrive from the MQTT loop over an mpsc channel. Each one
//! gets its own delivery task that loops over attempts; every attempt
//! (fresh or retry) goes through the shared [`RateLimiter`], so device
//! transmissions stay serialized and spaced by the cooldown while retries
//! of different requests proceed independently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use hb_hilink::{DeviceApi, WriteOutcome};
use hb_mqtt_channel::{BridgePublisher, Channel};
use hb_protocol::{DeliveryStatus, SendCommand, SentEvent};

// ── Rate limiter ──────────────────────────────────────────────

/// One-slot FIFO gate enforcing a minimum spacing between sends.
///
/// The lock is held from the cooldown wait until the attempt finishes;
/// tokio's mutex is fair, so waiters are served in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_attempt: Mutex<Option<Instant>>,
}

/// Exclusive right to talk to the device. Dropping it records the end of
/// the attempt.
pub struct SendPermit<'a> {
    last_attempt: MutexGuard<'a, Option<Instant>>,
}

impl Drop for SendPermit<'_> {
    fn drop(&mut self) {
        *self.last_attempt = Some(Instant::now());
    }
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_attempt: Mutex::new(None),
        }
    }

    /// Wait for the slot and the cooldown. `None` if cancelled first.
    pub async fn acquire(&self, token: &CancellationToken) -> Option<SendPermit<'_>> {
        let last_attempt = tokio::select! {
            () = token.cancelled() => return None,
            guard = self.last_attempt.lock() => guard,
        };

        if let Some(previous) = *last_attempt {
            tokio::select! {
                () = token.cancelled() => return None,
                () = time::sleep_until(previous + self.cooldown) => {}
            }
        }
        Some(SendPermit { last_attempt })
    }
}

// ── Dispatcher ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SendSettings {
    pub cooldown: Duration,
    pub retry_delay: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
}

/// Final result of a send request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { attempts: u32 },
    GaveUp { attempts: u32 },
    Cancelled,
}

pub struct Dispatcher<C: Channel> {
    device: Arc<dyn DeviceApi>,
    publisher: BridgePublisher<C>,
    limiter: Arc<RateLimiter>,
    settings: SendSettings,
}

impl<C: Channel> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            publisher: self.publisher.clone(),
            limiter: Arc::clone(&self.limiter),
            settings: self.settings,
        }
    }
}

impl<C: Channel + 'static> Dispatcher<C> {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        publisher: BridgePublisher<C>,
        settings: SendSettings,
    ) -> Self {
        Self {
            device,
            publisher,
            limiter: Arc::new(RateLimiter::new(settings.cooldown)),
            settings,
        }
    }

    /// Accept requests until the token is cancelled or every sender is
    /// gone, spawning one delivery task per request on `tracker`.
    pub async fn run(
        self,
        mut requests: mpsc::Receiver<SendCommand>,
        tracker: TaskTracker,
        token: CancellationToken,
    ) {
        loop {
            let command = tokio::select! {
                () = token.cancelled() => break,
                command = requests.recv() => command,
            };
            let Some(command) = command else {
                tracing::debug!("send request channel closed");
                break;
            };

            tracing::info!(number = %command.number, "send request accepted");
            let dispatcher = self.clone();
            let token = token.clone();
            tracker.spawn(async move {
                dispatcher.deliver(command, token).await;
            });
        }
        tracing::debug!("dispatcher stopped");
    }

    /// Attempt a send, retrying failures after `retry_delay` up to
    /// `max_retries` times. A `sent` event is published for every attempt.
    pub async fn deliver(&self, command: SendCommand, token: CancellationToken) -> SendOutcome {
        let mut attempt = 0;
        loop {
            let Some(permit) = self.limiter.acquire(&token).await else {
                return SendOutcome::Cancelled;
            };
            let result = self.device.send_sms(&command.number, &command.message).await;
            drop(permit);

            let error = match result {
                Ok(WriteOutcome::Ok) => None,
                Ok(WriteOutcome::Failed { raw_response }) => Some(raw_response),
                Err(e) => Some(e.to_string()),
            };
            self.publish_attempt(&command, attempt, error.clone()).await;

            let Some(error) = error else {
                tracing::info!(number = %command.number, attempt, "sms sent");
                return SendOutcome::Delivered {
                    attempts: attempt + 1,
                };
            };

            if attempt >= self.settings.max_retries {
                tracing::error!(
                    number = %command.number,
                    attempts = attempt + 1,
                    error = %error,
                    "giving up on sms"
                );
                return SendOutcome::GaveUp {
                    attempts: attempt + 1,
                };
            }

            tracing::warn!(
                number = %command.number,
                attempt,
                error = %error,
                retry_in_secs = self.settings.retry_delay.as_secs(),
                "sms send failed, retry scheduled"
            );
            tokio::select! {
                () = token.cancelled() => return SendOutcome::Cancelled,
                () = time::sleep(self.settings.retry_delay) => {}
            }
            attempt += 1;
        }
    }

    async fn publish_attempt(&self, command: &SendCommand, attempt: u32, error: Option<String>) {
        let event = SentEvent {
            status: if error.is_none() {
                DeliveryStatus::Success
            } else {
                DeliveryStatus::Failure
            },
            number: command.number.clone(),
            message: command.message.clone(),
            attempt,
            timestamp: Utc::now(),
            error,
        };
        if let Err(e) = self.publisher.publish_sent(&event).await {
            tracing::warn!(number = %command.number, attempt, error = %e, "failed to publish sent event");
        }
    }
}
