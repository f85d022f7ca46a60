//! Mock router for testing.
//!
//! Holds per-kind snapshots, an in-memory inbox and scripted send/probe
//! outcomes, and records every call so tests can assert on ordering and
//! timing. All tests above this crate use it instead of real hardware.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use hb_protocol::{ReadState, ResourceKind, Snapshot, SmsMessage};

use crate::client::DeviceApi;
use crate::error::{DeviceError, DeviceResult};
use crate::types::WriteOutcome;

/// Scripted result of a `send_sms` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockSend {
    /// Router answers `<response>OK</response>`.
    Ok,
    /// Router answers with an error body.
    Rejected(String),
    /// Request never reaches the router.
    Unreachable,
}

/// A recorded call, with the (tokio) instant it started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Fetch(ResourceKind),
    ListSms { page_index: u32, page_size: u32 },
    MarkRead(i64),
    SendSms { recipient: String, body: String },
    Probe,
}

/// Mock implementation of the `DeviceApi` trait.
pub struct MockDevice {
    snapshots: Mutex<HashMap<ResourceKind, Snapshot>>,
    failing_kinds: Mutex<HashSet<ResourceKind>>,
    inbox: Mutex<Vec<SmsMessage>>,
    /// Indexes whose set-read is rejected.
    ack_rejections: Mutex<HashSet<i64>>,
    list_failure: Mutex<bool>,
    /// Consumed front to back; `MockSend::Ok` once empty.
    send_script: Mutex<VecDeque<MockSend>>,
    /// Consumed front to back; falls back to `reachable` once empty.
    probe_script: Mutex<VecDeque<bool>>,
    reachable: Mutex<bool>,
    calls: Mutex<Vec<(Instant, DeviceCall)>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            failing_kinds: Mutex::new(HashSet::new()),
            inbox: Mutex::new(Vec::new()),
            ack_rejections: Mutex::new(HashSet::new()),
            list_failure: Mutex::new(false),
            send_script: Mutex::new(VecDeque::new()),
            probe_script: Mutex::new(VecDeque::new()),
            reachable: Mutex::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the document returned for `kind`.
    pub fn set_snapshot(&self, kind: ResourceKind, snapshot: Snapshot) {
        self.snapshots.lock().unwrap().insert(kind, snapshot);
    }

    /// Make fetches of `kind` fail with a transport error.
    pub fn fail_resource(&self, kind: ResourceKind, failing: bool) {
        let mut kinds = self.failing_kinds.lock().unwrap();
        if failing {
            kinds.insert(kind);
        } else {
            kinds.remove(&kind);
        }
    }

    /// Store an unread message in the inbox.
    pub fn deliver(&self, index: i64, sender: &str, body: &str) {
        self.inbox.lock().unwrap().push(SmsMessage {
            index,
            sender: sender.to_string(),
            body: body.to_string(),
            received_at: "2024-05-01 10:00:00".to_string(),
            read_state: ReadState::Unread,
        });
    }

    pub fn fail_listing(&self, failing: bool) {
        *self.list_failure.lock().unwrap() = failing;
    }

    pub fn reject_ack(&self, index: i64) {
        self.ack_rejections.lock().unwrap().insert(index);
    }

    pub fn script_sends(&self, outcomes: impl IntoIterator<Item = MockSend>) {
        self.send_script.lock().unwrap().extend(outcomes);
    }

    pub fn script_probes(&self, results: impl IntoIterator<Item = bool>) {
        self.probe_script.lock().unwrap().extend(results);
    }

    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock().unwrap() = reachable;
    }

    /// Messages still unread in the inbox.
    pub fn unread_count(&self) -> usize {
        self.inbox
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.is_unread())
            .count()
    }

    /// All calls in order.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    /// All calls in order, with their start instants.
    pub fn timed_calls(&self) -> Vec<(Instant, DeviceCall)> {
        self.calls.lock().unwrap().clone()
    }

    /// Start instants of every `send_sms` call.
    pub fn send_instants(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| matches!(c, DeviceCall::SendSms { .. }))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| predicate(c))
            .count()
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceApi for MockDevice {
    async fn fetch_snapshot(&self, kind: ResourceKind) -> DeviceResult<Snapshot> {
        self.record(DeviceCall::Fetch(kind));
        if self.failing_kinds.lock().unwrap().contains(&kind) {
            return Err(DeviceError::Transport {
                resource: kind.topic_suffix(),
                detail: "mock failure".into(),
            });
        }
        self.snapshots
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .ok_or(DeviceError::Malformed {
                resource: kind.topic_suffix(),
                detail: "no snapshot scripted".into(),
            })
    }

    async fn list_sms(&self, page_index: u32, page_size: u32) -> DeviceResult<Vec<SmsMessage>> {
        self.record(DeviceCall::ListSms {
            page_index,
            page_size,
        });
        if *self.list_failure.lock().unwrap() {
            return Err(DeviceError::Transport {
                resource: "sms-list",
                detail: "mock failure".into(),
            });
        }

        // Unread first, then by index, like `UnreadPreferred=1`.
        let mut messages = self.inbox.lock().unwrap().clone();
        messages.sort_by_key(|m| (!m.is_unread(), m.index));

        let skip = page_index.saturating_sub(1) as usize * page_size as usize;
        Ok(messages
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .collect())
    }

    async fn mark_read(&self, index: i64) -> DeviceResult<WriteOutcome> {
        self.record(DeviceCall::MarkRead(index));
        if self.ack_rejections.lock().unwrap().contains(&index) {
            return Ok(WriteOutcome::Failed {
                raw_response: "<error><code>100005</code></error>".into(),
            });
        }

        let mut inbox = self.inbox.lock().unwrap();
        match inbox.iter_mut().find(|m| m.index == index) {
            Some(msg) => {
                msg.read_state = ReadState::Read;
                Ok(WriteOutcome::Ok)
            }
            None => Ok(WriteOutcome::Failed {
                raw_response: "<error><code>113018</code></error>".into(),
            }),
        }
    }

    async fn send_sms(&self, recipient: &str, body: &str) -> DeviceResult<WriteOutcome> {
        self.record(DeviceCall::SendSms {
            recipient: recipient.to_string(),
            body: body.to_string(),
        });
        let next = self
            .send_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockSend::Ok);
        match next {
            MockSend::Ok => Ok(WriteOutcome::Ok),
            MockSend::Rejected(raw_response) => Ok(WriteOutcome::Failed { raw_response }),
            MockSend::Unreachable => Err(DeviceError::Transport {
                resource: "send-sms",
                detail: "mock failure".into(),
            }),
        }
    }

    async fn probe(&self) -> DeviceResult<()> {
        self.record(DeviceCall::Probe);
        let ok = self
            .probe_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| *self.reachable.lock().unwrap());
        if ok {
            Ok(())
        } else {
            Err(DeviceError::Auth("mock router unreachable".into()))
        }
    }
}
