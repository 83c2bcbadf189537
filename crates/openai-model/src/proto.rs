use keri_chat_model::{ErrorKind, ModelMessage, ModelRequest};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Some compatible servers report failures inside the stream.
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ApiError {
    /// Derives the error kind from the `type` and `code` fields.
    pub fn kind(&self) -> ErrorKind {
        let code = self.code.as_ref().and_then(|c| c.as_str());
        let markers = [self.r#type.as_deref(), code];
        let has = |needle: &str| {
            markers.iter().flatten().any(|m| m.contains(needle))
        };
        if has("rate_limit") || has("insufficient_quota") {
            ErrorKind::RateLimitExceeded
        } else if has("subscription") || has("marketplace") {
            ErrorKind::SubscriptionPending
        } else if has("permission") || has("access_denied") {
            ErrorKind::AccessDenied
        } else if has("timeout") {
            ErrorKind::Timeout
        } else {
            ErrorKind::Other
        }
    }
}

/// Maps a failed HTTP status to an error kind.
///
/// The response body is consulted for forbidden responses, since providers
/// use the same status for "not entitled" and "entitlement still being
/// provisioned".
pub fn classify_status(status: StatusCode, body: &str) -> ErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ErrorKind::Timeout
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            if body.to_ascii_lowercase().contains("marketplace") {
                ErrorKind::SubscriptionPending
            } else {
                ErrorKind::AccessDenied
            }
        }
        _ => serde_json::from_str::<ErrorResponse>(body)
            .map(|resp| resp.error.kind())
            .unwrap_or(ErrorKind::Other),
    }
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant { content: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        max_tokens: config.max_tokens,
        stream: true,
    }
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(content) => Message::Assistant {
            content: content.clone(),
        },
    }
}
