use serde::{Deserialize, Serialize};

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The input messages, in conversation order.
    pub messages: Vec<ModelMessage>,
}

impl ModelRequest {
    /// Creates a request with a system instruction followed by the given
    /// conversation messages.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(
        prompt: S,
        messages: impl IntoIterator<Item = ModelMessage>,
    ) -> Self {
        let mut all = vec![ModelMessage::System(prompt.into())];
        all.extend(messages);
        Self { messages: all }
    }
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
}
