//! Configuration management

use crate::error::{ErrorContext, LeadifyError, LeadifyResult};
use crate::types::{
    EngineConfig, FetchConfig, LeadifyConfig, LlmConfig, SearchConfig, StorageConfig,
};

use std::path::Path;

impl Default for LeadifyConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: "ollama".to_string(),
                model: "dolphin3:latest".to_string(),
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                temperature: 0.7,
                max_tokens: Some(2048),
            },
            search: SearchConfig {
                api_key: None,
                endpoint: "https://api.search.brave.com/res/v1/web/search".to_string(),
                results_per_query: 5,
                timeout_secs: 15,
                min_interval_ms: 1100,
            },
            fetch: FetchConfig {
                timeout_secs: 20,
                max_redirects: 5,
                max_content_chars: 20_000,
                concurrency: 4,
                user_agent: "Leadify/0.1".to_string(),
            },
            engine: EngineConfig {
                fetch_retries: 2,
                llm_failure_budget: 5,
                accept_threshold: 7.0,
                lenient_threshold: 5.0,
                lenient_sources: Vec::new(),
                extraction_token_budget: 1500,
                evaluation_preview_chars: 1000,
                cycles_per_run: None,
            },
            storage: StorageConfig {
                checkpoint_dir: "checkpoints".to_string(),
                output_dir: "output".to_string(),
                input_dir: "assignments".to_string(),
            },
        }
    }
}

impl LeadifyConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> LeadifyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LeadifyError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: LeadifyConfig = toml::from_str(&content).map_err(|e| LeadifyError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> LeadifyResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| LeadifyError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| LeadifyError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> LeadifyResult<()> {
        if self.search.results_per_query == 0 {
            return Err(LeadifyError::Config {
                message: "search.results_per_query must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set search.results_per_query to a positive value"),
            });
        }

        if self.fetch.concurrency == 0 {
            return Err(LeadifyError::Config {
                message: "fetch.concurrency must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set fetch.concurrency to a positive value"),
            });
        }

        if !(0.0..=10.0).contains(&self.engine.accept_threshold)
            || !(0.0..=10.0).contains(&self.engine.lenient_threshold)
        {
            return Err(LeadifyError::Config {
                message: "Evaluation thresholds must be within [0, 10]".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Keep accept_threshold and lenient_threshold in [0, 10]"),
            });
        }

        if self.engine.lenient_threshold > self.engine.accept_threshold {
            return Err(LeadifyError::Config {
                message: "lenient_threshold must not exceed accept_threshold".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("The lenient threshold is meant to be the lower bar"),
            });
        }

        if self.engine.extraction_token_budget == 0 {
            return Err(LeadifyError::Config {
                message: "engine.extraction_token_budget must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        Ok(())
    }
}
