//! Error types for the Quarry research core.
//!
//! Uses `thiserror` for public API error types, one enum per collaborator
//! boundary: language model, search, configuration and payload schema.

use std::path::PathBuf;

/// Errors from language-model provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Provider returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Scripted provider exhausted")]
    Exhausted,
}

impl LlmError {
    /// Whether the failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Timeout { .. }
                | LlmError::Connection { .. }
                | LlmError::ServerError { .. }
        )
    }
}

/// Errors from web-search provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {message}")]
    Request { message: String },

    #[error("Search request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Search provider rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Search provider {provider} rejected credentials")]
    AuthFailed { provider: String },

    #[error("Search provider {provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    #[error("Search provider rejected the query with HTTP {status}")]
    Rejected { status: u16 },

    #[error("Search response parse error: {message}")]
    ResponseParse { message: String },
}

impl SearchError {
    /// Network-class failures that a retry may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SearchError::Request { .. } | SearchError::Timeout { .. } | SearchError::RateLimited { .. }
        )
    }

    /// Failures that make the whole provider unusable for the rest of the run.
    pub fn is_provider_fatal(&self) -> bool {
        matches!(
            self,
            SearchError::AuthFailed { .. } | SearchError::NotConfigured { .. }
        )
    }
}

/// Errors from the configuration system.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors raised while validating a model payload against its expected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("no JSON object found in response")]
    NoJson,

    #[error("invalid JSON: {message}")]
    Json { message: String },

    #[error("{field}: {reason}")]
    Field { field: String, reason: String },
}
