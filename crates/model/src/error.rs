use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The kind of error that occurred.
///
/// Providers should report the most specific kind they can derive from
/// the upstream response (status codes, error type fields, etc.), so that
/// callers don't need to inspect error messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The account has not been granted access to the model yet.
    AccessDenied,
    /// Access was granted, but the provider is still setting up the
    /// subscription for the model.
    SubscriptionPending,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The provider did not answer in time.
    Timeout,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::AccessDenied => write!(f, "Access denied"),
            ErrorKind::SubscriptionPending => write!(f, "Subscription pending"),
            ErrorKind::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            ErrorKind::Timeout => write!(f, "Timed out"),
            ErrorKind::Other => write!(f, "Other error"),
        }
    }
}
