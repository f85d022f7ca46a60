//! Inbox intake.
//!
//! Each cycle lists the device inbox (unread first) and, for every unread
//! message, publishes it on `{prefix}/received` and only then marks it
//! read on the device. A message whose publish fails stays unread and is
//! picked up again next cycle.
//!
//! Acknowledged messages sort behind the unread ones, so after a full
//! page has been handled the first page is listed again rather than the
//! next one.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use hb_hilink::{DeviceApi, WriteOutcome};
use hb_mqtt_channel::{BridgePublisher, Channel};
use hb_protocol::{ReceivedSms, SmsMessage};

/// Every listing asks for page 1. The router sorts unread messages first
/// (`UnreadPreferred=1`), so acknowledged ones move behind the backlog and
/// advancing pages would skip unread messages. Firmware that ignores that
/// flag only gets the first `page_size` messages looked at per listing.
const FIRST_PAGE: u32 = 1;

/// Intake limits.
#[derive(Debug, Clone, Copy)]
pub struct IntakeSettings {
    pub page_size: u32,
    pub max_per_cycle: usize,
    /// Pause after each acknowledged message.
    pub pace: Duration,
}

/// What a single cycle achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub published: usize,
    pub acknowledged: usize,
}

pub struct SmsIntake {
    settings: IntakeSettings,
}

impl SmsIntake {
    pub fn new(settings: IntakeSettings) -> Self {
        Self { settings }
    }

    /// Run one intake cycle. Any device or publish failure ends the cycle.
    pub async fn run_cycle<C: Channel>(
        &self,
        device: &dyn DeviceApi,
        publisher: &BridgePublisher<C>,
        token: &CancellationToken,
    ) -> IntakeReport {
        let mut report = IntakeReport::default();

        'pages: while report.acknowledged < self.settings.max_per_cycle {
            let page = match device.list_sms(FIRST_PAGE, self.settings.page_size).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to list inbox");
                    break;
                }
            };

            let unread: Vec<&SmsMessage> = page.iter().filter(|m| m.is_unread()).collect();
            if unread.is_empty() {
                break;
            }

            for msg in unread {
                if report.acknowledged >= self.settings.max_per_cycle || token.is_cancelled() {
                    break 'pages;
                }

                if let Err(e) = publisher.publish_received(&ReceivedSms::from(msg)).await {
                    tracing::warn!(index = msg.index, error = %e, "failed to publish received sms");
                    break 'pages;
                }
                report.published += 1;

                match device.mark_read(msg.index).await {
                    Ok(WriteOutcome::Ok) => {
                        report.acknowledged += 1;
                        tracing::info!(index = msg.index, sender = %msg.sender, "sms received");
                    }
                    Ok(WriteOutcome::Failed { raw_response }) => {
                        tracing::warn!(index = msg.index, response = %raw_response, "set-read rejected");
                        break 'pages;
                    }
                    Err(e) => {
                        tracing::warn!(index = msg.index, error = %e, "set-read failed");
                        break 'pages;
                    }
                }

                tokio::select! {
                    () = token.cancelled() => break 'pages,
                    () = time::sleep(self.settings.pace) => {}
                }
            }

            if page.len() < self.settings.page_size as usize {
                break;
            }
        }

        if report.published > 0 {
            tracing::debug!(
                published = report.published,
                acknowledged = report.acknowledged,
                "intake cycle finished"
            );
        }
        report
    }

    /// Run a cycle every `interval` until `token` is cancelled.
    pub async fn run<C: Channel>(
        self,
        device: &dyn DeviceApi,
        publisher: &BridgePublisher<C>,
        interval: Duration,
        token: CancellationToken,
    ) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                () = token.cancelled() => break,
                _ = self.run_cycle(device, publisher, &token) => {}
            }
        }
        tracing::debug!("sms intake stopped");
    }
}
