use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read flag of a message stored on the device (`Smstat`: 0 unread, 1 read).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadState {
    Unread,
    Read,
}

impl ReadState {
    /// Map the device's `Smstat` code. Anything other than 0 counts as read.
    pub fn from_smstat(code: u8) -> Self {
        if code == 0 { Self::Unread } else { Self::Read }
    }
}

/// A message held in the device's local inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsMessage {
    /// Device-side storage index, used to acknowledge the message.
    pub index: i64,
    /// Originating phone number.
    pub sender: String,
    pub body: String,
    /// Timestamp as reported by the device (local time, no zone).
    pub received_at: String,
    pub read_state: ReadState,
}

impl SmsMessage {
    pub fn is_unread(&self) -> bool {
        self.read_state == ReadState::Unread
    }
}

/// Event published on `{prefix}/received` for every inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedSms {
    #[serde(rename = "datetime")]
    pub received_at: String,
    #[serde(rename = "number")]
    pub sender: String,
    #[serde(rename = "text")]
    pub body: String,
}

impl From<&SmsMessage> for ReceivedSms {
    fn from(msg: &SmsMessage) -> Self {
        Self {
            received_at: msg.received_at.clone(),
            sender: msg.sender.clone(),
            body: msg.body.clone(),
        }
    }
}

/// Outcome of a single outbound send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failure,
}

/// Event published on `{prefix}/sent` after every send attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentEvent {
    pub status: DeliveryStatus,
    /// Recipient phone number.
    pub number: String,
    pub message: String,
    /// 0 for the initial send, incremented per retry.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    /// Device response or transport error for failed attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
