use std::env;
use std::fmt::{self, Debug};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use keri_chat_core::{
    DEFAULT_GENERATION_TIMEOUT, DEFAULT_REFORMULATION_TIMEOUT, Pipeline,
    PipelineBuilder,
};
use keri_chat_knowledge_base::{
    KnowledgeBaseConfigBuilder, KnowledgeBaseRetriever,
};
use keri_chat_openai_model::{OpenAIConfigBuilder, OpenAIProvider};

const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Server settings, read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: SocketAddr,
    openai_api_key: String,
    openai_base_url: Option<String>,
    openai_model: Option<String>,
    reformulation_model: Option<String>,
    knowledge_base_url: String,
    knowledge_base_id: String,
    knowledge_base_api_key: Option<String>,
    generation_timeout: Duration,
    reformulation_timeout: Duration,
}

impl ServerConfig {
    /// Reads the settings from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // Empty values count as unset.
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let required = |name: &str| {
            var(name).with_context(|| {
                format!("{name} environment variable is not set")
            })
        };
        let secs = |name: &str, default: Duration| -> Result<Duration> {
            let Some(value) = var(name) else {
                return Ok(default);
            };
            value.parse().map(Duration::from_secs).with_context(|| {
                format!("{name} is not a number of seconds: {value:?}")
            })
        };

        let bind =
            var("KERI_CHAT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_owned());
        let bind = bind.parse().with_context(|| {
            format!("KERI_CHAT_BIND is not a socket address: {bind:?}")
        })?;

        Ok(Self {
            bind,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url: var("OPENAI_BASE_URL"),
            openai_model: var("OPENAI_MODEL"),
            reformulation_model: var("REFORMULATION_MODEL"),
            knowledge_base_url: required("KNOWLEDGE_BASE_URL")?,
            knowledge_base_id: required("KNOWLEDGE_BASE_ID")?,
            knowledge_base_api_key: var("KNOWLEDGE_BASE_API_KEY"),
            generation_timeout: secs(
                "KERI_CHAT_GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT,
            )?,
            reformulation_timeout: secs(
                "KERI_CHAT_REFORMULATION_TIMEOUT_SECS",
                DEFAULT_REFORMULATION_TIMEOUT,
            )?,
        })
    }

    /// Creates the pipeline backed by the configured services.
    pub fn build_pipeline(&self) -> Pipeline {
        let client = reqwest::Client::new();

        let openai = |model: Option<&String>| {
            let mut builder =
                OpenAIConfigBuilder::with_api_key(&self.openai_api_key);
            if let Some(base_url) = &self.openai_base_url {
                builder = builder.with_base_url(base_url);
            }
            if let Some(model) = model {
                builder = builder.with_model(model);
            }
            OpenAIProvider::with_client(client.clone(), builder.build())
        };

        let mut knowledge_base = KnowledgeBaseConfigBuilder::with_endpoint(
            &self.knowledge_base_url,
            &self.knowledge_base_id,
        );
        if let Some(api_key) = &self.knowledge_base_api_key {
            knowledge_base = knowledge_base.with_api_key(api_key);
        }
        let retriever = KnowledgeBaseRetriever::with_client(
            client.clone(),
            knowledge_base.build(),
        );

        let generator = openai(self.openai_model.as_ref());
        let mut builder = PipelineBuilder::with_providers(generator, retriever)
            .with_generation_timeout(self.generation_timeout)
            .with_reformulation_timeout(self.reformulation_timeout);
        if self.reformulation_model.is_some() {
            builder = builder.with_reformulation_provider(openai(
                self.reformulation_model.as_ref(),
            ));
        }
        builder.build()
    }
}

impl Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("openai_api_key", &"<deducted>")
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("reformulation_model", &self.reformulation_model)
            .field("knowledge_base_url", &self.knowledge_base_url)
            .field("knowledge_base_id", &self.knowledge_base_id)
            .field(
                "knowledge_base_api_key",
                &self.knowledge_base_api_key.as_ref().map(|_| "<deducted>"),
            )
            .field("generation_timeout", &self.generation_timeout)
            .field("reformulation_timeout", &self.reformulation_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(
        vars: &[(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        move |name: &str| vars.get(name).map(|value| value.to_string())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("OPENAI_API_KEY", "sk-secret"),
        ("KNOWLEDGE_BASE_URL", "http://localhost:9000/"),
        ("KNOWLEDGE_BASE_ID", "KB123"),
    ];

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.bind, "127.0.0.1:8787".parse::<SocketAddr>().unwrap());
        assert_eq!(config.generation_timeout, Duration::from_secs(50));
        assert_eq!(config.reformulation_timeout, Duration::from_secs(15));
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("KERI_CHAT_BIND", "0.0.0.0:9000"),
            ("KERI_CHAT_GENERATION_TIMEOUT_SECS", "80"),
            ("OPENAI_MODEL", ""),
        ]);
        let config = ServerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.generation_timeout, Duration::from_secs(80));
        assert_eq!(config.openai_model, None);
    }

    #[test]
    fn test_invalid() {
        let err = ServerConfig::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("KERI_CHAT_REFORMULATION_TIMEOUT_SECS", "soon"));
        assert!(ServerConfig::from_lookup(lookup(&vars)).is_err());
    }
}
