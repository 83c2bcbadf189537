//! Pipeline failures and their mapping to client-facing error codes.

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::time::Duration;

use keri_chat_model::{ErrorKind, ModelProviderError};

use crate::event::{ChatEvent, ErrorCode};

/// Error codes for provider error kinds.
///
/// `ErrorKind::Other` is intentionally absent, errors of that kind go
/// through [`MESSAGE_MARKERS`].
const KIND_CODES: [(ErrorKind, ErrorCode); 4] = [
    (ErrorKind::AccessDenied, ErrorCode::ModelAccessRequired),
    (ErrorKind::SubscriptionPending, ErrorCode::MarketplaceSubscription),
    (ErrorKind::RateLimitExceeded, ErrorCode::Throttled),
    (ErrorKind::Timeout, ErrorCode::Timeout),
];

/// Substrings of upstream error messages, checked in order when the
/// provider could not tell the kind of an error.
///
/// Marketplace markers come before the generic access-denied marker, since
/// subscription errors are reported as access denials too.
const MESSAGE_MARKERS: [(&str, ErrorCode); 7] = [
    ("use case details have not been submitted", ErrorCode::ModelAccessRequired),
    ("Fill out the", ErrorCode::ModelAccessRequired),
    ("aws-marketplace:", ErrorCode::MarketplaceSubscription),
    ("Marketplace", ErrorCode::MarketplaceSubscription),
    ("AccessDeniedException", ErrorCode::ModelAccessRequired),
    ("ThrottlingException", ErrorCode::Throttled),
    ("Too many requests", ErrorCode::Throttled),
];

/// Maps a provider error to the client-facing code.
///
/// The structured kind wins. Message markers are a last resort for
/// providers that report everything as [`ErrorKind::Other`].
pub fn classify(err: &dyn ModelProviderError) -> ErrorCode {
    code_for_kind(err.kind())
        .or_else(|| code_for_message(&err.to_string()))
        .unwrap_or(ErrorCode::InternalError)
}

#[inline]
fn code_for_kind(kind: ErrorKind) -> Option<ErrorCode> {
    KIND_CODES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, code)| *code)
}

#[inline]
fn code_for_message(message: &str) -> Option<ErrorCode> {
    MESSAGE_MARKERS
        .iter()
        .find(|(marker, _)| message.contains(*marker))
        .map(|(_, code)| *code)
}

/// A failure that ends a chat request.
#[derive(Debug)]
pub enum PipelineError {
    /// The request is invalid, nothing was attempted.
    BadRequest(String),
    /// The knowledge base search failed.
    Retrieval(Box<dyn ModelProviderError>),
    /// The model failed to generate (or finish) the answer.
    Generation(Box<dyn ModelProviderError>),
    /// Generation did not finish within the deadline.
    Timeout(Duration),
}

impl PipelineError {
    /// Returns the client-facing code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::BadRequest(_) => ErrorCode::BadRequest,
            PipelineError::Retrieval(err) | PipelineError::Generation(err) => {
                classify(err.as_ref())
            }
            PipelineError::Timeout(_) => ErrorCode::Timeout,
        }
    }

    /// Converts this error into the terminal event of a stream.
    ///
    /// Upstream messages are not forwarded to the client, only the code's
    /// standard texts.
    pub fn to_event(&self) -> ChatEvent {
        match self {
            PipelineError::BadRequest(message) => ChatEvent::Error {
                error: message.clone(),
                code: Some(ErrorCode::BadRequest.as_str().to_owned()),
                detail: None,
            },
            _ => ChatEvent::from_code(self.code()),
        }
    }
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::BadRequest(message) => {
                write!(f, "bad request: {message}")
            }
            PipelineError::Retrieval(err) => write!(f, "retrieval failed: {err}"),
            PipelineError::Generation(err) => {
                write!(f, "generation failed: {err}")
            }
            PipelineError::Timeout(deadline) => {
                write!(f, "generation timed out after {deadline:?}")
            }
        }
    }
}

impl StdError for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeError(ErrorKind, &'static str);

    impl Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.1)
        }
    }

    impl StdError for FakeError {}

    impl ModelProviderError for FakeError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    #[test]
    fn test_structured_kinds() {
        let cases = [
            (ErrorKind::AccessDenied, ErrorCode::ModelAccessRequired),
            (
                ErrorKind::SubscriptionPending,
                ErrorCode::MarketplaceSubscription,
            ),
            (ErrorKind::RateLimitExceeded, ErrorCode::Throttled),
            (ErrorKind::Timeout, ErrorCode::Timeout),
        ];
        for (kind, code) in cases {
            // The kind wins over a misleading message.
            let err = FakeError(kind, "ThrottlingException");
            assert_eq!(classify(&err), code);
        }
    }

    #[test]
    fn test_message_fallback() {
        let cases = [
            (
                "Model use case details have not been submitted for this account.",
                ErrorCode::ModelAccessRequired,
            ),
            (
                "AccessDeniedException: not authorized to perform aws-marketplace:Subscribe",
                ErrorCode::MarketplaceSubscription,
            ),
            ("AccessDeniedException: denied", ErrorCode::ModelAccessRequired),
            ("ThrottlingException: slow down", ErrorCode::Throttled),
            ("connection reset by peer", ErrorCode::InternalError),
        ];
        for (message, code) in cases {
            assert_eq!(classify(&FakeError(ErrorKind::Other, message)), code);
        }
    }

    #[test]
    fn test_to_event() {
        let err = PipelineError::BadRequest("message is required".to_owned());
        assert_eq!(
            err.to_event(),
            ChatEvent::Error {
                error: "message is required".to_owned(),
                code: Some("BAD_REQUEST".to_owned()),
                detail: None,
            }
        );

        let err = PipelineError::Generation(Box::new(FakeError(
            ErrorKind::Other,
            "secret upstream detail",
        )));
        let ChatEvent::Error { error, code, .. } = err.to_event() else {
            panic!("expected an error event");
        };
        assert_eq!(code.as_deref(), Some("INTERNAL_ERROR"));
        assert!(!error.contains("secret"));

        let err = PipelineError::Timeout(Duration::from_secs(50));
        assert_eq!(err.code(), ErrorCode::Timeout);
    }
}
