//! LLM provider implementations.
//!
//! Provides concrete implementations of the `LlmProvider` trait for:
//! - Ollama's native chat API (local models)
//! - OpenAI-compatible APIs (OpenAI, Azure, vLLM, LM Studio)
//!
//! Use `build_llm()` to instantiate the provider named in config.

pub mod ollama;
pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::{ConfigError, LlmError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatibleProvider;

/// Create the LLM provider named by `config.provider`.
pub fn build_llm(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let provider: Arc<dyn LlmProvider> = match config.provider.to_ascii_lowercase().as_str() {
        "ollama" => Arc::new(OllamaProvider::new(config).map_err(invalid)?),
        "openai" | "openai_compatible" | "openai-compatible" => {
            Arc::new(OpenAiCompatibleProvider::new(config).map_err(invalid)?)
        }
        other => {
            return Err(ConfigError::Invalid {
                message: format!(
                    "unknown llm provider '{}' (expected ollama or openai_compatible)",
                    other
                ),
            });
        }
    };
    Ok(provider)
}

fn invalid(e: LlmError) -> ConfigError {
    ConfigError::Invalid {
        message: e.to_string(),
    }
}

/// Build the shared HTTP client for a provider.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LlmError::Connection {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Map an HTTP status code to the appropriate LlmError.
pub(crate) fn map_http_error(provider: &str, status: reqwest::StatusCode, body: &str) -> LlmError {
    match status.as_u16() {
        401 | 403 => {
            debug!(body = %body, "Authentication failed ({})", status);
            LlmError::AuthFailed {
                provider: provider.to_string(),
            }
        }
        429 => {
            // Try to parse retry-after from "... try again in Xs"
            let retry_secs = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| {
                    v.get("error")?
                        .get("message")?
                        .as_str()
                        .map(|s| s.to_string())
                })
                .and_then(|msg| {
                    msg.split("in ")
                        .last()
                        .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                })
                .unwrap_or(5);
            LlmError::RateLimited {
                retry_after_secs: retry_secs,
            }
        }
        status if status >= 500 => LlmError::ServerError {
            status,
            message: body.chars().take(200).collect(),
        },
        _ => LlmError::ApiRequest {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

/// Map a transport failure to the appropriate LlmError.
pub(crate) fn map_transport_error(e: reqwest::Error, timeout_secs: u64) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout { timeout_secs }
    } else if e.is_connect() || e.is_request() {
        LlmError::Connection {
            message: e.to_string(),
        }
    } else {
        LlmError::ApiRequest {
            message: format!("Request failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_is_ollama() {
        let provider = build_llm(&LlmConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "llama3.1:latest");
    }

    #[test]
    fn test_build_unknown_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..Default::default()
        };
        let err = build_llm(&config).err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_http_error_mapping_401() {
        let err = map_http_error("openai", reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_http_error_mapping_429() {
        let body = r#"{"error":{"message":"Rate limit reached, try again in 7s"}}"#;
        let err = map_http_error("openai", reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(matches!(err, LlmError::RateLimited { retry_after_secs: 7 }));
    }

    #[test]
    fn test_http_error_mapping_500() {
        let err = map_http_error("ollama", reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, LlmError::ServerError { status: 500, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_http_error_mapping_400() {
        let err = map_http_error("ollama", reqwest::StatusCode::BAD_REQUEST, "nope");
        assert!(!err.is_transient());
    }
}
