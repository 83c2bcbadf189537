use std::pin::Pin;
use std::sync::Arc;

use keri_chat_model::{ModelProviderError, RetrievalResult, Retriever};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

/// A retrieved passage, ready to be shown to the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    /// The passage text.
    pub content: String,
    /// Name of the source document.
    pub source: String,
}

impl From<RetrievalResult> for Chunk {
    fn from(result: RetrievalResult) -> Self {
        Self {
            source: source_from_location(result.location.as_deref()),
            content: result.content,
        }
    }
}

/// Derives a source name from a storage locator: its last path segment,
/// or `"unknown"` when there is none.
pub fn source_from_location(location: Option<&str>) -> String {
    location
        .and_then(|location| location.rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("unknown")
        .to_owned()
}

type RetrieveResult = Result<Vec<Chunk>, Box<dyn ModelProviderError>>;
type BoxedRetrieveFuture = Pin<Box<dyn Future<Output = RetrieveResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(String, usize) -> BoxedRetrieveFuture + Send + Sync>;

/// A type-erased wrapper around a [`Retriever`].
#[derive(Clone)]
pub(crate) struct RetrievalClient {
    handler_fn: HandlerFn,
}

impl RetrievalClient {
    #[inline]
    pub fn new<R: Retriever + 'static>(retriever: R) -> Self {
        let handler_fn: HandlerFn = Arc::new(move |query: String, limit: usize| {
            let fut = retriever.retrieve(&query, limit);
            Box::pin(
                async move {
                    match fut.await {
                        Ok(results) => {
                            trace!("retrieved {} passages", results.len());
                            Ok(results.into_iter().map(Chunk::from).collect())
                        }
                        Err(err) => {
                            error!("retrieval failed: {err:?}");
                            Err(Box::new(err) as Box<dyn ModelProviderError>)
                        }
                    }
                }
                .instrument(trace_span!("retrieval client req")),
            )
        });
        Self { handler_fn }
    }

    /// Returns at most `limit` passages for `query`, most relevant first.
    #[inline]
    pub async fn retrieve(&self, query: &str, limit: usize) -> RetrieveResult {
        (self.handler_fn)(query.to_owned(), limit).await
    }
}
