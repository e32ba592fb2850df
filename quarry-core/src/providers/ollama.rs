//! Ollama native chat provider (`/api/chat`).

use crate::brain::{CompletionRequest, CompletionResponse, LlmProvider, TokenUsage};
use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{http_client, map_http_error, map_transport_error};

pub const DEFAULT_HOST: &str = "http://127.0.0.1:11434";

pub struct OllamaProvider {
    client: Client,
    host: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl OllamaProvider {
    /// Host comes from `base_url`, then `OLLAMA_HOST`, then the local default.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let host = config
            .base_url
            .clone()
            .or_else(|| std::env::var("OLLAMA_HOST").ok().filter(|h| !h.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            host: normalize_host(&host),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        if request.json_mode {
            body["format"] = json!("json");
        }
        body
    }

    fn into_response(chat: ChatResponse, model: &str) -> CompletionResponse {
        CompletionResponse {
            text: chat.message.map(|m| m.content).unwrap_or_default(),
            usage: TokenUsage {
                input_tokens: chat.prompt_eval_count.unwrap_or(0),
                output_tokens: chat.eval_count.unwrap_or(0),
            },
            model: chat.model.unwrap_or_else(|| model.to_string()),
            finish_reason: chat.done_reason,
        }
    }
}

/// `OLLAMA_HOST` is often given without a scheme (`0.0.0.0:11434`).
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/api/chat", self.host);
        debug!(url = %url, model = %self.model, "Sending Ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;
        if !status.is_success() {
            return Err(map_http_error("ollama", status, &body));
        }

        let chat: ChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;
        Ok(Self::into_response(chat, &self.model))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
