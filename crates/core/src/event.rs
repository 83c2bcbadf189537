//! Events streamed from the pipeline to the client.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A source passage referenced by the answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based position of the passage in the retrieved set, matching the
    /// `[n]` markers in the answer.
    pub number: usize,
    /// The passage text.
    pub content: String,
    /// Name of the source document.
    pub source: String,
}

/// Stable, machine-readable error codes reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The request is missing required input.
    BadRequest,
    /// The account has not been granted access to the model yet.
    ModelAccessRequired,
    /// The model subscription is still being provisioned.
    MarketplaceSubscription,
    /// The provider is rate limiting us.
    Throttled,
    /// Generation took too long.
    Timeout,
    /// Anything else.
    InternalError,
}

impl ErrorCode {
    /// All codes, in no particular order.
    pub const ALL: [ErrorCode; 6] = [
        ErrorCode::BadRequest,
        ErrorCode::ModelAccessRequired,
        ErrorCode::MarketplaceSubscription,
        ErrorCode::Throttled,
        ErrorCode::Timeout,
        ErrorCode::InternalError,
    ];

    /// The wire representation of this code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::ModelAccessRequired => "MODEL_ACCESS_REQUIRED",
            ErrorCode::MarketplaceSubscription => "MARKETPLACE_SUBSCRIPTION",
            ErrorCode::Throttled => "THROTTLED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// A short summary shown as the error message.
    pub fn summary(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "Invalid request",
            ErrorCode::ModelAccessRequired => "Model access required",
            ErrorCode::MarketplaceSubscription => {
                "Model subscription pending"
            }
            ErrorCode::Throttled => "Too many requests",
            ErrorCode::Timeout => "The answer took too long",
            ErrorCode::InternalError => "Internal server error",
        }
    }

    /// Guidance for the user on what to do next.
    pub fn detail(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => {
                "The request could not be processed. Check that a message \
                 was provided."
            }
            ErrorCode::ModelAccessRequired => {
                "The account running this service has not been granted \
                 access to the generation model yet. Request model access \
                 in the provider console; it is usually granted within a \
                 few minutes."
            }
            ErrorCode::MarketplaceSubscription => {
                "The provider is still completing the model subscription. \
                 Wait two or three minutes and try again."
            }
            ErrorCode::Throttled => {
                "The service is temporarily rate-limited. Please wait a \
                 moment and try again."
            }
            ErrorCode::Timeout => {
                "The model did not finish in time. Try a shorter or more \
                 specific question."
            }
            ErrorCode::InternalError => {
                "An unexpected error occurred. Please try again later."
            }
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The string is not a known error code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownErrorCode(s.to_owned()))
    }
}

/// An event of a chat response stream.
///
/// A stream carries any number of `Chunk` events, at most one `Citations`
/// event, and ends with exactly one `Done` or `Error`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// An incremental piece of the answer.
    Chunk {
        /// The text delta.
        text: String,
    },
    /// Sources cited by the answer.
    Citations {
        /// The citations, one per distinct number.
        data: Vec<Citation>,
    },
    /// The answer is complete.
    Done,
    /// The request failed. Chunks received earlier are incomplete.
    Error {
        /// A short human-readable message.
        error: String,
        /// The machine-readable code, see [`ErrorCode`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        /// Guidance for the user.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

const EVENT_TYPES: [&str; 4] = ["chunk", "citations", "done", "error"];

/// Why a payload could not be decoded into a [`ChatEvent`].
#[derive(Debug)]
pub enum DecodeError {
    /// The payload is not JSON.
    Json(serde_json::Error),
    /// The payload has no string `type` field.
    MissingType,
    /// The `type` field names an event we don't know.
    UnknownType(String),
    /// The fields don't match the shape of the named event.
    InvalidFields {
        /// The event type.
        ty: String,
        /// The underlying error.
        source: serde_json::Error,
    },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Json(err) => write!(f, "invalid JSON: {err}"),
            DecodeError::MissingType => write!(f, "missing event type"),
            DecodeError::UnknownType(ty) => write!(f, "unknown event type {ty:?}"),
            DecodeError::InvalidFields { ty, source } => {
                write!(f, "invalid {ty} event: {source}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl ChatEvent {
    /// Creates an error event with the code's standard summary and detail.
    #[inline]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::error(code, code.summary())
    }

    /// Creates an error event with a custom message.
    #[inline]
    pub fn error<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        ChatEvent::Error {
            error: message.into(),
            code: Some(code.as_str().to_owned()),
            detail: Some(code.detail().to_owned()),
        }
    }

    /// Returns whether this event ends the stream.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done | ChatEvent::Error { .. })
    }

    /// Decodes an event from its JSON payload.
    ///
    /// The `type` discriminator is checked before the remaining fields, so
    /// an unknown event is reported as such instead of as a shape mismatch.
    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(payload).map_err(DecodeError::Json)?;
        let ty = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?;
        if !EVENT_TYPES.contains(&ty) {
            return Err(DecodeError::UnknownType(ty.to_owned()));
        }
        let ty = ty.to_owned();
        serde_json::from_value(value)
            .map_err(|source| DecodeError::InvalidFields { ty, source })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_wire_shapes() {
        let events = [
            (
                ChatEvent::Chunk {
                    text: "Pre-rotation".to_owned(),
                },
                json!({"type": "chunk", "text": "Pre-rotation"}),
            ),
            (
                ChatEvent::Citations {
                    data: vec![Citation {
                        number: 1,
                        content: "excerpt".to_owned(),
                        source: "kid0001.md".to_owned(),
                    }],
                },
                json!({
                    "type": "citations",
                    "data": [{"number": 1, "content": "excerpt", "source": "kid0001.md"}]
                }),
            ),
            (ChatEvent::Done, json!({"type": "done"})),
            (
                ChatEvent::Error {
                    error: "message is required".to_owned(),
                    code: Some("BAD_REQUEST".to_owned()),
                    detail: None,
                },
                json!({"type": "error", "error": "message is required", "code": "BAD_REQUEST"}),
            ),
        ];
        for (event, expected) in events {
            assert_eq!(serde_json::to_value(&event).unwrap(), expected);
        }
    }

    #[test]
    fn test_from_json_checks_type_first() {
        assert!(matches!(
            ChatEvent::from_json("not-json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            ChatEvent::from_json(r#"{"text":"hi"}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(
            ChatEvent::from_json(r#"{"type":"ping"}"#),
            Err(DecodeError::UnknownType(ty)) if ty == "ping"
        ));
        assert!(matches!(
            ChatEvent::from_json(r#"{"type":"chunk"}"#),
            Err(DecodeError::InvalidFields { ty, .. }) if ty == "chunk"
        ));
        assert_eq!(
            ChatEvent::from_json(r#"{"type":"done"}"#).unwrap(),
            ChatEvent::Done
        );
    }

    #[test]
    fn test_error_code_round_trip() {
        for code in ErrorCode::ALL {
            assert_eq!(code.as_str().parse::<ErrorCode>(), Ok(code));
        }
        assert!("UNKNOWN".parse::<ErrorCode>().is_err());
    }
}
