use keri_chat_model::{ErrorKind, RetrievalResult};
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    /// Breaks the stream with an error.
    #[serde(rename = "failure")]
    Failure(PresetFailure),
    /// Ends the stream without reporting completion, like a dropped
    /// connection.
    #[serde(rename = "end_of_stream")]
    EndOfStream,
}

/// An error returned by a fake provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetFailure {
    /// Kind reported by the error.
    pub kind: ErrorKind,
    /// Message of the error.
    pub message: String,
}

impl PresetFailure {
    /// Creates a failure with the given kind and message.
    #[inline]
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request itself fails and no events are produced.
    pub failure: Option<PresetFailure>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failure: None,
        }
    }

    /// Creates a `PresetResponse` streaming the given text deltas.
    #[inline]
    pub fn with_deltas<S: Into<String>>(
        deltas: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::with_events(
            deltas
                .into_iter()
                .map(|d| PresetEvent::MessageDelta(d.into()))
                .collect::<Vec<_>>(),
        )
    }

    /// Creates a `PresetResponse` whose request fails.
    #[inline]
    pub fn with_failure(failure: PresetFailure) -> Self {
        Self {
            events: vec![],
            failure: Some(failure),
        }
    }
}

/// The preset answer of a [`TestRetriever`](crate::TestRetriever).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetRetrieval {
    /// Passages to return, most relevant first.
    Results(Vec<RetrievalResult>),
    /// The retrieval fails.
    Failure(PresetFailure),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::MessageDelta("Pre-rotation [1] ".to_string()),
            PresetEvent::Failure(PresetFailure::new(
                ErrorKind::RateLimitExceeded,
                "ThrottlingException",
            )),
        ]);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
        assert!(serialized.contains("\"rate_limit_exceeded\""));
    }
}
