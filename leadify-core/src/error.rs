//! Unified error handling system
//!
//! Structured error types with context, recovery hints, and proper error
//! chaining. Per-source failures carry enough metadata for the orchestrator
//! to decide between retry, rejection, and escalation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type LeadifyResult<T> = Result<T, LeadifyError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the Leadify system
#[derive(Error, Debug)]
pub enum LeadifyError {
    #[error("Search error: {message}")]
    Search {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Fetch error for {url}: {message}")]
    Fetch {
        message: String,
        url: String,
        /// Transient failures (timeouts, connection resets) may be retried;
        /// permanent ones (404, non-text content) may not.
        retryable: bool,
        context: ErrorContext,
    },

    #[error("LLM error: {message}")]
    Llm {
        message: String,
        provider: Option<String>,
        context: ErrorContext,
    },

    #[error("Extraction error: {message}")]
    Extraction {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Resource not found: {resource}")]
    NotFound {
        resource: String,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl LeadifyError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            LeadifyError::Search { context, .. } => Some(context),
            LeadifyError::Fetch { context, .. } => Some(context),
            LeadifyError::Llm { context, .. } => Some(context),
            LeadifyError::Extraction { context, .. } => Some(context),
            LeadifyError::Config { context, .. } => Some(context),
            LeadifyError::Validation { context, .. } => Some(context),
            LeadifyError::Storage { context, .. } => Some(context),
            LeadifyError::NotFound { context, .. } => Some(context),
            LeadifyError::Timeout { context, .. } => Some(context),
            LeadifyError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Check if error is recoverable by retrying the same operation
    pub fn is_recoverable(&self) -> bool {
        match self {
            LeadifyError::Fetch { retryable, .. } => *retryable,
            LeadifyError::Search { .. } => true,
            LeadifyError::Timeout { .. } => true,
            LeadifyError::Llm { .. } => true,
            LeadifyError::Config { .. } => false,
            LeadifyError::Validation { .. } => false,
            LeadifyError::NotFound { .. } => false,
            _ => false,
        }
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            LeadifyError::Fetch { retryable: true, .. } => Some(1000),
            LeadifyError::Search { .. } => Some(1000),
            LeadifyError::Timeout { .. } => Some(2000),
            LeadifyError::Llm { .. } => Some(3000),
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            LeadifyError::Internal { .. }
            | LeadifyError::Config { .. }
            | LeadifyError::Validation { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
            LeadifyError::Fetch { .. }
            | LeadifyError::Search { .. }
            | LeadifyError::Timeout { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Transient error (may be recoverable)"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::error::LeadifyError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::error::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'leadify config --init' to create default config"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::error::LeadifyError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::error::ErrorContext::new($component)
                .with_suggestion("Check your configuration file"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::error::LeadifyError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::error::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! fetch_error {
    ($msg:expr, $url:expr, $retryable:expr, $component:expr) => {
        $crate::error::LeadifyError::Fetch {
            message: $msg.to_string(),
            url: $url.to_string(),
            retryable: $retryable,
            context: $crate::error::ErrorContext::new($component).with_operation("fetch"),
        }
    };
}

#[macro_export]
macro_rules! llm_error {
    ($msg:expr, $component:expr) => {
        $crate::error::LeadifyError::Llm {
            message: $msg.to_string(),
            provider: None,
            context: $crate::error::ErrorContext::new($component)
                .with_suggestion("Check that the model service is running and reachable"),
        }
    };
    ($msg:expr, $provider:expr, $component:expr) => {
        $crate::error::LeadifyError::Llm {
            message: $msg.to_string(),
            provider: Some($provider.to_string()),
            context: $crate::error::ErrorContext::new($component)
                .with_suggestion("Check that the model service is running and reachable"),
        }
    };
}
