/// Session cookie and anti-forgery token issued by `/api/webserver/SesTokInfo`.
///
/// The router may invalidate either at any time, so a pair is fetched
/// right before every privileged request and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    /// Value for the `Cookie` header (`SessionID=...`).
    pub session_id: String,
    /// Value for the `__RequestVerificationToken` header.
    pub anti_forgery_token: String,
}

/// Result of a write request (send-SMS, set-read).
///
/// The router answers HTTP 200 either way; success is the literal
/// `<response>OK</response>` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok,
    Failed { raw_response: String },
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}
