//! LLM client integration using siumai
//!
//! Wraps siumai providers behind the core `LanguageModel` trait. Ollama is
//! the primary target (single local model on constrained hardware); OpenAI
//! and Anthropic are supported for assignments run with remote capacity.

use leadify_core::{async_trait, ErrorContext, LanguageModel, LeadifyError, LeadifyResult, LlmConfig};
use siumai::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Unified LLM client supporting multiple providers
pub struct LeadifyLlmClient {
    client: Box<dyn LlmClient>,
    config: LlmConfig,
}

impl LeadifyLlmClient {
    /// Create a new LLM client
    pub async fn new(config: LlmConfig) -> LeadifyResult<Self> {
        let client = Self::build_client(&config).await?;

        info!(
            "Created LLM client for provider: {} with model: {}",
            config.provider, config.model
        );

        Ok(Self { client, config })
    }

    /// Build the appropriate siumai client based on configuration
    async fn build_client(config: &LlmConfig) -> LeadifyResult<Box<dyn LlmClient>> {
        match config.provider.as_str() {
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let mut builder = LlmBuilder::new()
                    .ollama()
                    .model(&config.model)
                    .base_url(&base_url)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder.build().await.map_err(|e| llm_build_error("ollama", e))?;
                Ok(Box::new(client))
            }
            "openai" => {
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .ok_or_else(|| missing_key_error("openai", "OPENAI_API_KEY"))?;

                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder.build().await.map_err(|e| llm_build_error("openai", e))?;
                Ok(Box::new(client))
            }
            "anthropic" => {
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                    .ok_or_else(|| missing_key_error("anthropic", "ANTHROPIC_API_KEY"))?;

                let mut builder = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder.build().await.map_err(|e| llm_build_error("anthropic", e))?;
                Ok(Box::new(client))
            }
            provider => Err(LeadifyError::Config {
                message: format!("Unsupported LLM provider: {}", provider),
                source: None,
                context: ErrorContext::new("llm_client")
                    .with_operation("build_client")
                    .with_suggestion("Use one of: ollama, openai, anthropic"),
            }),
        }
    }

    /// Generate a response using the LLM
    pub async fn generate_messages(&self, messages: Vec<ChatMessage>) -> LeadifyResult<String> {
        let start_time = Instant::now();

        debug!("Generating response with {} messages", messages.len());

        let response = self.client.chat(messages).await.map_err(|e| LeadifyError::Llm {
            message: format!("LLM generation failed: {}", e),
            provider: Some(self.config.provider.clone()),
            context: ErrorContext::new("llm_client")
                .with_operation("chat")
                .with_suggestion("Check that the model service is running and reachable"),
        })?;

        let generation_time = start_time.elapsed();

        if let Some(content) = response.content_text() {
            debug!(
                "Generated response in {:?} ({} chars)",
                generation_time,
                content.len()
            );
            Ok(content.to_string())
        } else {
            Err(LeadifyError::Llm {
                message: "No text content in LLM response".to_string(),
                provider: Some(self.config.provider.clone()),
                context: ErrorContext::new("llm_client").with_operation("chat"),
            })
        }
    }

    /// Provider name this client was built for
    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// Test the connection to the LLM provider with a one-token prompt
    pub async fn test_connection(&self) -> LeadifyResult<()> {
        debug!(
            "Testing connection to LLM provider: {}",
            self.config.provider
        );

        let messages = vec![user!("Reply with the single word: ok")];
        self.generate_messages(messages).await.map(|_| ())
    }
}

#[async_trait]
impl LanguageModel for LeadifyLlmClient {
    async fn generate(&self, system: &str, user: &str) -> LeadifyResult<String> {
        let messages = vec![system!(system), user!(user)];
        self.generate_messages(messages).await
    }
}

fn llm_build_error(provider: &str, err: impl std::fmt::Display) -> LeadifyError {
    LeadifyError::Llm {
        message: format!("Failed to build {} client: {}", provider, err),
        provider: Some(provider.to_string()),
        context: ErrorContext::new("llm_client").with_operation("build_client"),
    }
}

fn missing_key_error(provider: &str, env_var: &str) -> LeadifyError {
    LeadifyError::Config {
        message: format!("{} API key not found", provider),
        source: None,
        context: ErrorContext::new("llm_client")
            .with_operation("build_client")
            .with_suggestion(&format!("Set {} or llm.api_key in the config", env_var)),
    }
}
