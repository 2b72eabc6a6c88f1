//! Chat-completions client for OpenAI and API-compatible servers
//! (Azure OpenAI, Ollama, vLLM, LM Studio).

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use crate::providers::with_retry;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Wait used when a 429 carries no usable hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl OpenAiCompatibleProvider {
    /// Resolve the key from config, then the environment.
    ///
    /// Loopback endpoints are assumed to be local servers that accept any
    /// bearer token.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let local = config
            .base_url
            .as_deref()
            .is_some_and(|u| u.contains("localhost") || u.contains("127.0.0.1"));
        let key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .filter(|k| !k.trim().is_empty());

        match key {
            Some(key) => Self::new_with_key(config, key),
            None if local => {
                debug!("No API key for local endpoint, sending placeholder token");
                Self::new_with_key(config, "local".to_string())
            }
            None => Err(LlmError::AuthFailed {
                provider: format!("openai (set {})", config.api_key_env),
            }),
        }
    }

    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("HTTP client setup failed: {}", e),
            })?;
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            retry: config.retry.clone(),
        })
    }

    async fn post(&self, request: &ChatRequest<'_>) -> Result<CompletionResponse, LlmError> {
        debug!(endpoint = %self.endpoint, model = request.model, "Chat completion request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(status_error(status, &body, retry_after));
        }
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid completion body: {}", e),
            })?;
        into_completion(parsed, request.model)
    }

    fn transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if err.is_connect() {
            LlmError::Connection {
                message: err.to_string(),
            }
        } else {
            LlmError::ApiRequest {
                message: err.to_string(),
            }
        }
    }
}

fn into_completion(parsed: ChatResponse, requested_model: &str) -> Result<CompletionResponse, LlmError> {
    let usage = parsed.usage.unwrap_or_default();
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ResponseParse {
            message: "completion has no choices".to_string(),
        })?;

    Ok(CompletionResponse {
        text: choice.message.content.unwrap_or_default(),
        usage: TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        finish_reason: choice.finish_reason,
    })
}

/// Map a non-2xx status onto the retry taxonomy: 429 and 5xx are transient.
fn status_error(status: StatusCode, body: &str, retry_after: Option<u64>) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed {
            provider: "openai".to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            retry_after_secs: retry_after
                .or_else(|| retry_hint_from_body(body))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        s if s.is_server_error() => LlmError::Connection {
            message: format!("server error {}: {}", s.as_u16(), body),
        },
        s => LlmError::ApiRequest {
            message: format!("HTTP {}: {}", s.as_u16(), body),
        },
    }
}

/// Seconds from messages like "... Please try again in 7s." or "in 1.5s".
fn retry_hint_from_body(body: &str) -> Option<u64> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    let tail = envelope.error.message.rsplit("in ").next()?;
    let number: String = tail
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse::<f64>().ok().map(|secs| secs.ceil() as u64)
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            stream: false,
        };
        with_retry(&self.retry, || self.post(&body)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> Result<CompletionResponse, LlmError> {
        into_completion(serde_json::from_value(body).unwrap(), "requested")
    }

    #[test]
    fn test_completion_text_and_usage() {
        let resp = parse(json!({
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{
                "message": { "role": "assistant", "content": "{\"tasks\": []}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128 }
        }))
        .unwrap();
        assert_eq!(resp.text, "{\"tasks\": []}");
        assert_eq!(resp.usage.total(), 128);
        assert_eq!(resp.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_completion_defaults() {
        let resp = parse(json!({ "choices": [{ "message": { "content": null } }] })).unwrap();
        assert_eq!(resp.text, "");
        assert_eq!(resp.model, "requested");
        assert_eq!(resp.usage, TokenUsage::default());
    }

    #[test]
    fn test_completion_without_choices() {
        assert!(matches!(
            parse(json!({ "choices": [] })),
            Err(LlmError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_rate_limit_prefers_header() {
        let body = r#"{"error": {"message": "Rate limit reached. Please try again in 7s."}}"#;
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, body, Some(30)),
            LlmError::RateLimited { retry_after_secs: 30 }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, body, None),
            LlmError::RateLimited { retry_after_secs: 7 }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down", None),
            LlmError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        ));
    }

    #[test]
    fn test_fractional_retry_hint_rounds_up() {
        let body = r#"{"error": {"message": "Please try again in 1.2s"}}"#;
        assert_eq!(retry_hint_from_body(body), Some(2));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream", None),
            LlmError::Connection { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "", None),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad", None),
            LlmError::ApiRequest { .. }
        ));
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let config = LlmConfig {
            base_url: Some("http://localhost:11434/v1/".into()),
            api_key_env: "ALERTSWARM_NONEXISTENT_KEY".into(),
            ..Default::default()
        };
        let provider = OpenAiCompatibleProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:11434/v1/chat/completions");
        assert_eq!(provider.api_key, "local");
    }
}
