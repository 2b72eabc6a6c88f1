//! Core type definitions for Alertswarm.
//!
//! Defines the data exchanged between the orchestrator, planner, and
//! specialist agents: alerts, tasks, findings, historical context, the final
//! report, and the LLM request/response envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Represents a participant role in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message sent to or received from the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }
}

/// Token usage statistics from an LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A request to the LLM for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub model: Option<String>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.2,
            max_tokens: None,
            model: None,
        }
    }
}

/// The result of an LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

// --- Alerts ---

/// One typed observable attached to an alert (`{"type": "ip", "value": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observable {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// The security event under investigation.
///
/// Named fields cover what every alert source provides. Everything else the
/// source sent is kept verbatim in `raw_payload` and consulted by the entity
/// extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub observables: Vec<Observable>,
    #[serde(default)]
    pub raw_payload: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Short one-line description used in prompts and log lines.
    pub fn headline(&self) -> String {
        match &self.severity {
            Some(sev) => format!("[{}] {} ({})", sev, self.title, self.id),
            None => format!("{} ({})", self.title, self.id),
        }
    }
}

/// Canonical entity values pulled out of an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.ip.is_none() && self.username.is_none() && self.hash.is_none()
    }

    /// All present entity values, in ip, username, hash order.
    pub fn values(&self) -> Vec<&str> {
        [&self.ip, &self.username, &self.hash]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .collect()
    }
}

// --- Tasks & findings ---

/// Scheduling hint attached to a task by the planner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::Low => write!(f, "low"),
        }
    }
}

/// A unit of work for one specialist agent. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub priority: TaskPriority,
}

impl AgentTask {
    pub fn new(task_type: impl Into<String>, priority: TaskPriority) -> Self {
        Self {
            task_type: task_type.into(),
            params: Map::new(),
            priority,
        }
    }

    /// Builder-style parameter insertion.
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Read a string parameter, ignoring empty values.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Read an unsigned integer parameter (accepts numeric strings).
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Task type names understood by the built-in specialists.
pub mod task_types {
    pub const CHECK_IP: &str = "check_ip";
    pub const QUERY_LOGS: &str = "query_logs";
    pub const CHECK_HASH: &str = "check_hash";
    pub const CHECK_USER: &str = "check_user";

    /// Parameter carrying the alert's tenant, added at dispatch.
    pub const TENANT_PARAM: &str = "tenant_id";

    /// Parameter key each task type reads its subject from.
    pub fn subject_param(task_type: &str) -> Option<&'static str> {
        match task_type {
            CHECK_IP | QUERY_LOGS => Some("ip"),
            CHECK_HASH => Some("hash"),
            CHECK_USER => Some("username"),
            _ => None,
        }
    }
}

/// Outcome of a specialist task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failed,
}

/// One finding: the well-formed result of exactly one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: String,
}

impl AgentResult {
    pub fn success(agent: impl Into<String>, data: Value, summary: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            status: ResultStatus::Success,
            data: Some(data),
            error: None,
            summary: summary.into(),
        }
    }

    pub fn failed(agent: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            agent: agent.into(),
            status: ResultStatus::Failed,
            data: None,
            summary: format!("Task failed: {}", error),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

// --- Historical context ---

/// Which retrieval strategy produced a historical context item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    Keyword,
    Semantic,
}

/// A previously resolved case judged relevant to the current alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalContextItem {
    pub title: String,
    pub description: String,
    pub resolution: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    pub source: ContextSource,
}

// --- Report ---

/// Terminal status of an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvestigationStatus::Completed => write!(f, "completed"),
            InvestigationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The output of one completed investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationReport {
    pub alert_id: String,
    pub report: String,
    pub findings: Vec<AgentResult>,
    pub log: Vec<String>,
    pub historical_context: Vec<HistoricalContextItem>,
    pub rounds: u32,
    pub status: InvestigationStatus,
    pub usage: TokenUsage,
    pub investigated_at: DateTime<Utc>,
}

impl InvestigationReport {
    /// Number of findings whose task failed.
    pub fn failed_findings(&self) -> usize {
        self.findings.iter().filter(|f| !f.is_success()).count()
    }
}
