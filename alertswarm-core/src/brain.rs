//! Brain module: LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait the planner and synthesis steps talk to,
//! a scriptable `MockLlmProvider` for tests and offline runs, and helpers for
//! pulling structured JSON out of free-form completions.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Trait for LLM completion services.
///
/// The only contract is "returns free text". Callers must tolerate prose,
/// partial JSON, or nothing useful at all.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Return the first balanced `{...}` block in `text` that parses as JSON.
///
/// Braces inside JSON strings are skipped. Blocks that fail to parse are
/// passed over and the scan resumes after their opening brace.
pub fn extract_json_block(text: &str) -> Option<serde_json::Value> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        if let Some(close) = matching_brace(bytes, open)
            && let Ok(value) = serde_json::from_str::<serde_json::Value>(&text[open..=close])
            && value.is_object()
        {
            return Some(value);
        }
        start = open + 1;
    }
    None
}

/// Index of the brace closing the one at `open`, honouring JSON string escapes.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// A mock LLM provider for testing and development.
///
/// Returns queued results in FIFO order; once the queue is drained every call
/// returns the fallback text.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    fallback: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            fallback: "I'm a mock LLM. No queued responses available.".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that answers every call with the given text.
    pub fn with_response(text: &str) -> Self {
        let mut provider = Self::new();
        provider.fallback = text.to_string();
        provider
    }

    /// Queue a text response for the next `complete` call.
    pub fn queue_text(&self, text: &str) {
        self.queue(Ok(Self::text_response(text)));
    }

    /// Queue an error for the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.queue(Err(error));
    }

    pub fn queue(&self, result: Result<CompletionResponse, LlmError>) {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(result);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request);
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(Self::text_response(&self.fallback)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
