//! Device resource client.
//!
//! `DeviceApi` is the seam the bridge is written against. Two impls:
//! - `HilinkClient`: real router over HTTP
//! - `MockDevice`: scripted, for tests (in `mock.rs`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use hb_protocol::{ResourceKind, Snapshot, SmsMessage};

use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};
use crate::session::SessionManager;
use crate::types::{CredentialPair, WriteOutcome};
use crate::xml;

const SMS_LIST_PATH: &str = "/api/sms/sms-list";
const SEND_SMS_PATH: &str = "/api/sms/send-sms";
const SET_READ_PATH: &str = "/api/sms/set-read";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Operations the bridge performs against the router.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Fetch and flatten one monitored resource.
    async fn fetch_snapshot(&self, kind: ResourceKind) -> DeviceResult<Snapshot>;

    /// Fetch one inbox page (`page_index` starts at 1), unread first.
    async fn list_sms(&self, page_index: u32, page_size: u32) -> DeviceResult<Vec<SmsMessage>>;

    /// Mark a stored message as read.
    async fn mark_read(&self, index: i64) -> DeviceResult<WriteOutcome>;

    /// Send a text message to one recipient.
    async fn send_sms(&self, recipient: &str, body: &str) -> DeviceResult<WriteOutcome>;

    /// Cheapest call proving the router answers and issues sessions.
    async fn probe(&self) -> DeviceResult<()>;
}

/// HTTP client for a HiLink router.
///
/// Every request carries the client-wide timeout, so no call can hang
/// the scheduler.
pub struct HilinkClient {
    http: reqwest::Client,
    session: SessionManager,
    base_url: String,
    timeout: Duration,
}

impl HilinkClient {
    pub fn new(config: &DeviceConfig) -> DeviceResult<Self> {
        let timeout = config.timeout();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeviceError::Transport {
                resource: "client",
                detail: e.to_string(),
            })?;
        let base_url = config.base_url();

        Ok(Self {
            session: SessionManager::new(http.clone(), base_url.clone()),
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        creds: &CredentialPair,
    ) -> reqwest::RequestBuilder {
        builder
            .header("Cookie", &creds.session_id)
            .header("__RequestVerificationToken", &creds.anti_forgery_token)
    }

    async fn get(&self, resource: &'static str, path: &str) -> DeviceResult<String> {
        let creds = self.session.refresh().await?;
        let url = format!("{}{path}", self.base_url);
        let request = self.authorized(self.http.get(&url), &creds);
        self.execute(resource, request).await
    }

    async fn post(&self, resource: &'static str, path: &str, body: String) -> DeviceResult<String> {
        let creds = self.session.refresh().await?;
        let url = format!("{}{path}", self.base_url);
        let request = self
            .authorized(self.http.post(&url), &creds)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body);
        self.execute(resource, request).await
    }

    async fn execute(
        &self,
        resource: &'static str,
        request: reqwest::RequestBuilder,
    ) -> DeviceResult<String> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(resource, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Transport {
                resource,
                detail: format!("HTTP {status}"),
            });
        }

        response
            .text()
            .await
            .map_err(|e| self.transport_error(resource, e))
    }

    fn transport_error(&self, resource: &'static str, err: reqwest::Error) -> DeviceError {
        if err.is_timeout() {
            DeviceError::Timeout {
                resource,
                timeout_ms: saturating_millis(self.timeout),
            }
        } else {
            DeviceError::Transport {
                resource,
                detail: err.to_string(),
            }
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl DeviceApi for HilinkClient {
    async fn fetch_snapshot(&self, kind: ResourceKind) -> DeviceResult<Snapshot> {
        let body = self.get(kind.topic_suffix(), kind.api_path()).await?;
        xml::parse_snapshot(kind, &body)
    }

    async fn list_sms(&self, page_index: u32, page_size: u32) -> DeviceResult<Vec<SmsMessage>> {
        let request = xml::sms_list_request(page_index, page_size);
        let body = self.post("sms-list", SMS_LIST_PATH, request).await?;
        xml::parse_sms_list(&body)
    }

    async fn mark_read(&self, index: i64) -> DeviceResult<WriteOutcome> {
        let body = self
            .post("set-read", SET_READ_PATH, xml::set_read_request(index))
            .await?;
        Ok(xml::parse_write_ack(&body))
    }

    async fn send_sms(&self, recipient: &str, body: &str) -> DeviceResult<WriteOutcome> {
        let date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let request = xml::send_sms_request(recipient, body, &date);
        let response = self.post("send-sms", SEND_SMS_PATH, request).await?;
        Ok(xml::parse_write_ack(&response))
    }

    async fn probe(&self) -> DeviceResult<()> {
        self.session.refresh().await.map(|_| ())
    }
}
