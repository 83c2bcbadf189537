use serde::{Deserialize, Serialize};

use crate::provider::ModelProviderError;

/// A single passage returned by a retriever.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The text of the passage.
    pub content: String,
    /// Where the passage is stored, usually an URI of the source document.
    pub location: Option<String>,
}

/// A type that searches a knowledge base for passages relevant to a query.
///
/// Results must be ordered by relevance, the most relevant one first. An
/// empty result is a valid answer, not an error.
pub trait Retriever: Send + Sync {
    /// The error type that may be returned by the retriever.
    type Error: ModelProviderError;

    /// Retrieves at most `limit` passages for `query`.
    fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RetrievalResult>, Self::Error>>
    + Send
    + 'static;
}
