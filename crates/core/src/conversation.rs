//! Conversation-related types.

use keri_chat_model::ModelMessage;
use serde::{Deserialize, Serialize};

/// The author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The chat assistant.
    Assistant,
}

/// A turn in the conversation history.
///
/// History is always supplied by the caller, the server never keeps it
/// between requests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Turn {
    /// Who wrote this turn.
    pub role: Role,
    /// The text of this turn.
    pub content: String,
}

impl Turn {
    /// Creates a user turn.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ModelMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => ModelMessage::User(turn.content.clone()),
            Role::Assistant => ModelMessage::Assistant(turn.content.clone()),
        }
    }
}

/// A file attached to a question.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    /// File name shown to the model.
    pub name: String,
    /// Media type reported by the uploader.
    #[serde(rename = "type", default)]
    pub media_type: String,
    /// Base64 encoded file content.
    pub content: String,
}

/// The body of a chat request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The question. Required, an empty message is rejected.
    #[serde(default)]
    pub message: String,
    /// Previous turns, oldest first.
    #[serde(default)]
    pub history: Vec<Turn>,
    /// Files whose content is prepended to the question.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ChatRequest {
    /// Creates a request with the given question and history.
    #[inline]
    pub fn new<S: Into<String>>(message: S, history: Vec<Turn>) -> Self {
        Self {
            message: message.into(),
            history,
            attachments: vec![],
        }
    }
}
