//! A retriever for knowledge bases exposing a vector "retrieve" HTTP API.
//!
//! The request and response shapes follow the managed knowledge-base
//! runtime API: the query goes in `retrievalQuery.text`, and every result
//! carries its passage text and the location of its source document.

#[macro_use]
extern crate tracing;

mod config;
mod proto;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use keri_chat_model::{
    ErrorKind, ModelProviderError, RetrievalResult, Retriever,
};
use reqwest::{Client, Response, header};

pub use config::{KnowledgeBaseConfig, KnowledgeBaseConfigBuilder};

const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// Error type for [`KnowledgeBaseRetriever`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Knowledge-base retriever.
#[derive(Clone, Debug)]
pub struct KnowledgeBaseRetriever {
    client: Client,
    config: Arc<KnowledgeBaseConfig>,
}

impl KnowledgeBaseRetriever {
    /// Creates a new `KnowledgeBaseRetriever` with the given configuration.
    #[inline]
    pub fn new(config: KnowledgeBaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Creates a new `KnowledgeBaseRetriever` sharing an existing HTTP
    /// client.
    #[inline]
    pub fn with_client(client: Client, config: KnowledgeBaseConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }
}

impl Retriever for KnowledgeBaseRetriever {
    type Error = Error;

    fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RetrievalResult>, Self::Error>>
    + Send
    + 'static {
        let mut builder = self
            .client
            .post(self.config.retrieve_url())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&proto::create_request(query, limit));
        if let Some(api_key) = &self.config.api_key {
            builder =
                builder.header(header::AUTHORIZATION, format!("Bearer {api_key}"));
        }
        let resp_fut = builder.send();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                let kind = if err.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::Other
                };
                Error::new(format!("{err}"), kind)
            })?;
            let resp = check_status(resp).await?;

            let body = resp
                .json::<proto::RetrieveResponse>()
                .await
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
            let results: Vec<RetrievalResult> = body
                .retrieval_results
                .into_iter()
                .map(Into::into)
                .collect();
            debug!("retrieved {} passages", results.len());
            Ok(results)
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let error_type = resp
        .headers()
        .get(ERROR_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<proto::ErrorBody>(&body)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));
    let kind = proto::classify_error(status, error_type.as_deref(), &message);

    // Keep the error type in the message, callers may only see the text.
    let message = match error_type {
        Some(ty) => format!("{}: {message}", ty.split(':').next().unwrap_or(&ty)),
        None => message,
    };
    Err(Error::new(message, kind))
}
