use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Send-SMS command received on `{prefix}/send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCommand {
    /// Recipient phone number.
    pub number: String,
    /// Message body.
    pub message: String,
}

/// Reasons an inbound command is dropped.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Loose shape used to report which field is missing.
#[derive(Deserialize)]
struct RawSendCommand {
    number: Option<String>,
    message: Option<String>,
}

impl SendCommand {
    /// Decode and validate a raw bus payload.
    ///
    /// Both fields must be present and non-empty.
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        let raw: RawSendCommand = serde_json::from_slice(payload)
            .map_err(|e| CommandError::MalformedPayload(e.to_string()))?;

        let number = raw
            .number
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| CommandError::MalformedPayload("'number' missing".into()))?;
        let message = raw
            .message
            .filter(|m| !m.is_empty())
            .ok_or_else(|| CommandError::MalformedPayload("'message' missing".into()))?;

        Ok(Self {
            number: number.trim().to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_command() {
        let cmd = SendCommand::parse(br#"{"number":"+33600000000","message":"hello"}"#).unwrap();
        assert_eq!(cmd.number, "+33600000000");
        assert_eq!(cmd.message, "hello");
    }

    #[test]
    fn parse_ignores_extra_fields() {
        let cmd =
            SendCommand::parse(br#"{"number":" 0611 ","message":"hi","priority":1}"#).unwrap();
        assert_eq!(cmd.number, "0611");
    }

    #[test]
    fn missing_number_rejected() {
        let err = SendCommand::parse(br#"{"message":"hello"}"#).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn empty_message_rejected() {
        let err = SendCommand::parse(br#"{"number":"+336","message":""}"#).unwrap_err();
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn non_json_rejected() {
        assert!(SendCommand::parse(b"send hello to bob").is_err());
    }

    #[test]
    fn non_object_rejected() {
        assert!(SendCommand::parse(b"[1,2,3]").is_err());
        assert!(SendCommand::parse(br#""hello""#).is_err());
    }
}
