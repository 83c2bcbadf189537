use keri_chat_model::{ErrorKind, RetrievalResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    retrieval_query: RetrievalQuery,
    retrieval_configuration: RetrievalConfiguration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct RetrievalQuery {
    text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfiguration {
    vector_search_configuration: VectorSearchConfiguration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct VectorSearchConfiguration {
    number_of_results: usize,
}

#[inline]
pub fn create_request(query: &str, limit: usize) -> RetrieveRequest {
    RetrieveRequest {
        retrieval_query: RetrievalQuery {
            text: query.to_owned(),
        },
        retrieval_configuration: RetrievalConfiguration {
            vector_search_configuration: VectorSearchConfiguration {
                number_of_results: limit,
            },
        },
    }
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveResponse {
    #[serde(default)]
    pub retrieval_results: Vec<ResultItem>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResultItem {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub s3_location: Option<S3Location>,
    #[serde(default)]
    pub web_location: Option<WebLocation>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct S3Location {
    pub uri: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebLocation {
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
}

impl From<ResultItem> for RetrievalResult {
    fn from(item: ResultItem) -> Self {
        let location = item.location.and_then(|location| {
            location
                .s3_location
                .and_then(|s3| s3.uri)
                .or_else(|| location.web_location.and_then(|web| web.url))
        });
        RetrievalResult {
            content: item.content.and_then(|c| c.text).unwrap_or_default(),
            location,
        }
    }
}

/// Maps a failed response to an error kind.
///
/// `error_type` is the service's error type header (for example
/// `ThrottlingException`), which is more reliable than the status code.
pub fn classify_error(
    status: StatusCode,
    error_type: Option<&str>,
    message: &str,
) -> ErrorKind {
    // The header may carry a suffix such as `:http://internal.amazon.com/...`.
    let error_type = error_type
        .map(|ty| ty.split(':').next().unwrap_or(ty))
        .unwrap_or_default();
    match error_type {
        "ThrottlingException" | "ServiceQuotaExceededException" => {
            return ErrorKind::RateLimitExceeded;
        }
        "AccessDeniedException" => {
            return if message.contains("aws-marketplace:") {
                ErrorKind::SubscriptionPending
            } else {
                ErrorKind::AccessDenied
            };
        }
        _ => {}
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            ErrorKind::AccessDenied
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ErrorKind::Timeout
        }
        _ => ErrorKind::Other,
    }
}
