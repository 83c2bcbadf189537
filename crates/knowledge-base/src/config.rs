use std::fmt::Debug;

/// Builder for [`KnowledgeBaseConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KnowledgeBaseConfigBuilder {
    endpoint: String,
    knowledge_base_id: String,
    api_key: Option<String>,
}

impl KnowledgeBaseConfigBuilder {
    /// Creates a builder for the knowledge base `knowledge_base_id` served
    /// at `endpoint`.
    #[inline]
    pub fn with_endpoint<S: Into<String>, I: Into<String>>(
        endpoint: S,
        knowledge_base_id: I,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            knowledge_base_id: knowledge_base_id.into(),
            api_key: None,
        }
    }

    /// Sets a bearer token sent with every request.
    #[inline]
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> KnowledgeBaseConfig {
        KnowledgeBaseConfig {
            endpoint: self.endpoint.trim_end_matches('/').to_owned(),
            knowledge_base_id: self.knowledge_base_id,
            api_key: self.api_key,
        }
    }
}

impl Debug for KnowledgeBaseConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseConfigBuilder")
            .field("endpoint", &self.endpoint)
            .field("knowledge_base_id", &self.knowledge_base_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<deducted>"))
            .finish()
    }
}

/// Configuration for [`KnowledgeBaseRetriever`](crate::KnowledgeBaseRetriever).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KnowledgeBaseConfig {
    pub(crate) endpoint: String,
    pub(crate) knowledge_base_id: String,
    pub(crate) api_key: Option<String>,
}

impl KnowledgeBaseConfig {
    pub(crate) fn retrieve_url(&self) -> String {
        format!(
            "{}/knowledgebases/{}/retrieve",
            self.endpoint, self.knowledge_base_id
        )
    }
}

impl Debug for KnowledgeBaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseConfig")
            .field("endpoint", &self.endpoint)
            .field("knowledge_base_id", &self.knowledge_base_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<deducted>"))
            .finish()
    }
}
