//! Language-model provider abstraction.
//!
//! Defines the `LlmProvider` trait the research loop talks to, the request and
//! response types that cross it, and a scripted mock for tests.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Rough token estimate: ~4 characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    /// Ask the provider to constrain output to JSON.
    pub json_mode: bool,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            system: String::new(),
            prompt: String::new(),
            json_mode: true,
            temperature: 0.0,
            max_tokens: 800,
        }
    }
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Same request with a correction appended to the prompt.
    pub fn with_reminder(&self, reminder: &str) -> Self {
        let mut next = self.clone();
        next.prompt = format!("{}\n\n{}", self.prompt, reminder);
        next
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.system) + estimate_tokens(&self.prompt)
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// A completion returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    /// Tokens consumed by the exchange, estimated when the provider reports none.
    pub fn tokens_used(&self, request: &CompletionRequest) -> u64 {
        let reported = self.usage.total();
        if reported > 0 {
            reported as u64
        } else {
            (request.estimated_tokens() + estimate_tokens(&self.text)) as u64
        }
    }
}

/// Trait for language-model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// MockLlmProvider
// ---------------------------------------------------------------------------

/// A scripted LLM provider for testing.
///
/// Replies are returned in queue order. Once the queue is empty the fallback
/// reply is used if set, otherwise `LlmError::Exhausted`.
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every call with `text`.
    pub fn with_response(text: &str) -> Self {
        let mut provider = Self::new();
        provider.fallback = Some(text.to_string());
        provider
    }

    /// Queue a raw text reply.
    pub fn queue_text(&self, text: impl Into<String>) -> &Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(text.into()));
        }
        self
    }

    /// Queue a JSON reply.
    pub fn queue_json(&self, value: serde_json::Value) -> &Self {
        self.queue_text(value.to_string())
    }

    /// Queue a failure.
    pub fn queue_error(&self, error: LlmError) -> &Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error));
        }
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        let text = match next {
            Some(reply) => reply?,
            None => self.fallback.clone().ok_or(LlmError::Exhausted)?,
        };
        Ok(CompletionResponse {
            text,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: self.model.clone(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens(&"a".repeat(400)), 100);
    }

    #[test]
    fn test_request_with_reminder() {
        let request = CompletionRequest::new("sys", "plan this");
        let retried = request.with_reminder("JSON only please");
        assert_eq!(retried.prompt, "plan this\n\nJSON only please");
        assert_eq!(retried.system, "sys");
        assert_eq!(request.prompt, "plan this");
    }

    #[test]
    fn test_tokens_used_falls_back_to_estimate() {
        let request = CompletionRequest::new("x".repeat(40), "y".repeat(40));
        let response = CompletionResponse {
            text: "z".repeat(40),
            usage: TokenUsage::default(),
            model: "m".into(),
            finish_reason: None,
        };
        assert_eq!(response.tokens_used(&request), 30);
    }

    #[tokio::test]
    async fn test_mock_replies_in_order_then_exhausts() {
        let mock = MockLlmProvider::new();
        mock.queue_text("first").queue_error(LlmError::Timeout { timeout_secs: 1 });

        let first = mock.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(first.text, "first");
        assert!(matches!(
            mock.complete(CompletionRequest::default()).await,
            Err(LlmError::Timeout { .. })
        ));
        assert!(matches!(
            mock.complete(CompletionRequest::default()).await,
            Err(LlmError::Exhausted)
        ));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_with_response_repeats() {
        let mock = MockLlmProvider::with_response("same");
        for _ in 0..3 {
            let reply = mock.complete(CompletionRequest::default()).await.unwrap();
            assert_eq!(reply.text, "same");
        }
    }
}
