//! XML envelopes of the HiLink API.
//!
//! Responses come as `<response>...</response>` documents or, on failure,
//! `<error><code>...</code><message/></error>`. Requests are small
//! `<request>` documents built here with escaped content.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use hb_protocol::{ReadState, ResourceKind, Snapshot, SmsMessage};

use crate::error::{DeviceError, DeviceResult};
use crate::types::{CredentialPair, WriteOutcome};

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Inbox box type on the router (1 = local inbox).
const BOX_LOCAL_INBOX: u8 = 1;

/// Minimal element tree; attributes are not used by the API.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn new(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Default::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Collect every leaf below this element as `name → text`.
    /// Later duplicates overwrite earlier ones.
    pub fn flatten(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        let mut pending: Vec<&Element> = self.children.iter().rev().collect();
        while let Some(el) = pending.pop() {
            if el.is_leaf() {
                snapshot.insert(el.name.clone(), el.text.clone());
            } else {
                pending.extend(el.children.iter().rev());
            }
        }
        snapshot
    }
}

/// Parse a document into its root element.
pub fn parse_document(body: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(body);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element::new(e.name().as_ref())),
            Ok(Event::Empty(e)) => attach(&mut stack, &mut root, Element::new(e.name().as_ref()))?,
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| "unbalanced closing tag".to_string())?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!("at byte {}: {e}", reader.buffer_position()));
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "empty document".to_string())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
        Ok(())
    } else if root.is_none() {
        *root = Some(el);
        Ok(())
    } else {
        Err("multiple root elements".to_string())
    }
}

/// Parse a `<response>` document, turning `<error>` envelopes into
/// [`DeviceError::Api`].
fn parse_response(resource: &'static str, body: &str) -> DeviceResult<Element> {
    let root = parse_document(body).map_err(|detail| DeviceError::Malformed { resource, detail })?;
    match root.name.as_str() {
        "response" => Ok(root),
        "error" => Err(DeviceError::Api {
            resource,
            code: root.child_text("code").unwrap_or("unknown").trim().to_string(),
        }),
        other => Err(DeviceError::Malformed {
            resource,
            detail: format!("unexpected root element <{other}>"),
        }),
    }
}

// ── Responses ────────────────────────────────────────────────

/// Parse the `SesTokInfo` document.
pub fn parse_credentials(body: &str) -> DeviceResult<CredentialPair> {
    let root = parse_response("session", body).map_err(|e| DeviceError::Auth(e.to_string()))?;

    let session_id = root.child_text("SesInfo").map(str::trim).unwrap_or_default();
    let token = root.child_text("TokInfo").map(str::trim).unwrap_or_default();
    if session_id.is_empty() || token.is_empty() {
        return Err(DeviceError::Auth(
            "SesTokInfo response lacks SesInfo or TokInfo".into(),
        ));
    }

    Ok(CredentialPair {
        session_id: session_id.to_string(),
        anti_forgery_token: token.to_string(),
    })
}

/// Parse a flat resource document and check the kind's required fields.
pub fn parse_snapshot(kind: ResourceKind, body: &str) -> DeviceResult<Snapshot> {
    let resource = kind.topic_suffix();
    let snapshot = parse_response(resource, body)?.flatten();
    if let Some(field) = snapshot.missing_field(kind) {
        return Err(DeviceError::Malformed {
            resource,
            detail: format!("required field <{field}> missing"),
        });
    }
    Ok(snapshot)
}

/// Parse an `sms-list` page into messages, in document order.
pub fn parse_sms_list(body: &str) -> DeviceResult<Vec<SmsMessage>> {
    const RESOURCE: &str = "sms-list";
    let root = parse_response(RESOURCE, body)?;
    let Some(messages) = root.child("Messages") else {
        return Ok(Vec::new());
    };

    messages
        .children
        .iter()
        .filter(|el| el.name == "Message")
        .map(|el| {
            let field = |name: &str| el.child_text(name).map(str::trim);
            let index = field("Index")
                .and_then(|v| v.parse::<i64>().ok())
                .ok_or_else(|| DeviceError::Malformed {
                    resource: RESOURCE,
                    detail: "message without numeric <Index>".into(),
                })?;
            let smstat = field("Smstat")
                .and_then(|v| v.parse::<u8>().ok())
                .ok_or_else(|| DeviceError::Malformed {
                    resource: RESOURCE,
                    detail: format!("message {index} without numeric <Smstat>"),
                })?;

            Ok(SmsMessage {
                index,
                sender: field("Phone").unwrap_or_default().to_string(),
                body: el.child_text("Content").unwrap_or_default().to_string(),
                received_at: field("Date").unwrap_or_default().to_string(),
                read_state: ReadState::from_smstat(smstat),
            })
        })
        .collect()
}

/// Interpret the body of a write request.
///
/// Only `<response>OK</response>` is success; error envelopes and any
/// other body are reported back verbatim.
pub fn parse_write_ack(body: &str) -> WriteOutcome {
    match parse_document(body) {
        Ok(root) if root.name == "response" && root.is_leaf() && root.text.trim() == "OK" => {
            WriteOutcome::Ok
        }
        _ => WriteOutcome::Failed {
            raw_response: body.trim().to_string(),
        },
    }
}

// ── Requests ─────────────────────────────────────────────────

/// Page request for the local inbox, unread messages first.
pub fn sms_list_request(page_index: u32, page_size: u32) -> String {
    format!(
        "{XML_DECL}<request><PageIndex>{page_index}</PageIndex><ReadCount>{page_size}</ReadCount>\
         <BoxType>{BOX_LOCAL_INBOX}</BoxType><SortType>0</SortType><Ascending>0</Ascending>\
         <UnreadPreferred>1</UnreadPreferred></request>"
    )
}

/// Send request for a single recipient. `date` is the router-local
/// `YYYY-MM-DD hh:mm:ss` timestamp.
pub fn send_sms_request(recipient: &str, content: &str, date: &str) -> String {
    let length = content.chars().count();
    let recipient: Cow<'_, str> = escape(recipient);
    let content: Cow<'_, str> = escape(content);
    format!(
        "{XML_DECL}<request><Index>-1</Index><Phones><Phone>{recipient}</Phone></Phones>\
         <Sca></Sca><Content>{content}</Content><Length>{length}</Length>\
         <Reserved>1</Reserved><Date>{date}</Date></request>"
    )
}

pub fn set_read_request(index: i64) -> String {
    format!("{XML_DECL}<request><Index>{index}</Index></request>")
}
