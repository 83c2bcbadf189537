use std::time::Duration;

use keri_chat_model::{ModelProvider, Retriever};

use super::Pipeline;
use crate::model_client::ModelClient;
use crate::prompt::SYSTEM_PROMPT_TEMPLATE;
use crate::reformulate::Reformulator;
use crate::retrieval::RetrievalClient;

/// Number of passages retrieved per question by default.
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 10;

/// Default deadline of the answer generation.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(50);

/// Default deadline of the query reformulation.
pub const DEFAULT_REFORMULATION_TIMEOUT: Duration = Duration::from_secs(15);

/// [`Pipeline`] builder.
pub struct PipelineBuilder {
    generator: ModelClient,
    retrieval: RetrievalClient,
    reformulator: Option<ModelClient>,
    system_prompt: String,
    retrieval_limit: usize,
    generation_timeout: Duration,
    reformulation_timeout: Duration,
}

impl PipelineBuilder {
    /// Creates a new builder with the model that writes answers and the
    /// retriever that finds the excerpts.
    ///
    /// The same model reformulates follow-up questions, unless another
    /// one is set with [`with_reformulation_provider`].
    ///
    /// [`with_reformulation_provider`]: Self::with_reformulation_provider
    #[inline]
    pub fn with_providers<P, R>(generator: P, retriever: R) -> Self
    where
        P: ModelProvider + 'static,
        R: Retriever + 'static,
    {
        Self {
            generator: ModelClient::new(generator),
            retrieval: RetrievalClient::new(retriever),
            reformulator: None,
            system_prompt: SYSTEM_PROMPT_TEMPLATE.to_owned(),
            retrieval_limit: DEFAULT_RETRIEVAL_LIMIT,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            reformulation_timeout: DEFAULT_REFORMULATION_TIMEOUT,
        }
    }

    /// Uses a separate, usually smaller, model to reformulate questions.
    #[inline]
    pub fn with_reformulation_provider<P: ModelProvider + 'static>(
        mut self,
        provider: P,
    ) -> Self {
        self.reformulator = Some(ModelClient::new(provider));
        self
    }

    /// Replaces the system prompt template.
    ///
    /// The template should contain a `{CHUNKS}` placeholder, which is
    /// replaced with the retrieved excerpts.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, template: S) -> Self {
        self.system_prompt = template.into();
        self
    }

    /// Sets the number of passages retrieved per question.
    #[inline]
    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    /// Sets the deadline of the answer generation.
    #[inline]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Sets the deadline of the query reformulation.
    #[inline]
    pub fn with_reformulation_timeout(mut self, timeout: Duration) -> Self {
        self.reformulation_timeout = timeout;
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> Pipeline {
        let Self {
            generator,
            retrieval,
            reformulator,
            system_prompt,
            retrieval_limit,
            generation_timeout,
            reformulation_timeout,
        } = self;

        if !system_prompt.contains(crate::prompt::CHUNKS_PLACEHOLDER) {
            warn!("the system prompt has no excerpts placeholder");
        }

        let reformulator = Reformulator::new(
            reformulator.unwrap_or_else(|| generator.clone()),
            reformulation_timeout,
        );
        Pipeline {
            generator,
            retrieval,
            reformulator,
            system_prompt,
            retrieval_limit,
            generation_timeout,
        }
    }
}
