//! Provider used when `llm.provider = "mock"`: no network, no credentials.
//!
//! Planning calls get an empty plan, so round 1 runs the entity-based
//! fallback and round 2 concludes. Synthesis gets a plain-text note instead
//! of a verdict.

use crate::brain::LlmProvider;
use crate::error::LlmError;
use crate::multi::planner::PLANNER_SYSTEM_PROMPT;
use crate::types::{CompletionRequest, CompletionResponse, Role, TokenUsage};
use async_trait::async_trait;

const OFFLINE_PLAN: &str = r#"{"tasks": [], "reasoning": "offline mode"}"#;

const OFFLINE_REPORT: &str = "Offline mode: no LLM is configured, so no verdict was \
synthesized. Review the findings below.";

pub struct OfflineProvider;

impl OfflineProvider {
    fn is_planning(request: &CompletionRequest) -> bool {
        request
            .messages
            .iter()
            .any(|m| m.role == Role::System && m.content == PLANNER_SYSTEM_PROMPT)
    }
}

#[async_trait]
impl LlmProvider for OfflineProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let text = if Self::is_planning(&request) {
            OFFLINE_PLAN
        } else {
            OFFLINE_REPORT
        };
        Ok(CompletionResponse {
            text: text.to_string(),
            usage: TokenUsage::default(),
            model: self.model_name().to_string(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn model_name(&self) -> &str {
        "offline"
    }
}
