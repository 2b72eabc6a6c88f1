//! Task planner: asks the LLM which tasks to run next and writes the final report.
//!
//! The LLM's only contract is "returns free text". Plans are read from the
//! first JSON object found in the completion; anything unusable yields an
//! empty plan rather than an error.

use crate::brain::{LlmProvider, extract_json_block};
use crate::config::InvestigationConfig;
use crate::error::LlmError;
use crate::types::{
    AgentResult, AgentTask, Alert, CompletionRequest, Entities, HistoricalContextItem, Message,
    TaskPriority, TokenUsage, task_types,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on serialized finding data included in a prompt.
const MAX_DATA_CHARS: usize = 600;

pub(crate) const PLANNER_SYSTEM_PROMPT: &str = "You are the lead analyst of a security operations \
team coordinating specialist agents. Decide which investigation tasks to run next. \
Respond with a single JSON object of the form \
{\"tasks\": [{\"type\": \"<task type>\", \"params\": {...}, \"priority\": \"high|medium|low\"}], \
\"reasoning\": \"<one or two sentences>\"}. \
Only use the task types listed as available. Return an empty tasks list when the \
findings are sufficient to reach a verdict.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a senior security analyst. Write a concise \
investigation report for the alert below: verdict (malicious, suspicious, or benign), \
key evidence from the findings, relevant historical cases, and recommended next actions.";

/// Tasks proposed by one planner call.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub tasks: Vec<AgentTask>,
    pub reasoning: Option<String>,
    pub usage: TokenUsage,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// LLM-backed planning and report synthesis.
pub struct TaskPlanner {
    llm: Arc<dyn LlmProvider>,
    objective: String,
    timeout: Duration,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl TaskPlanner {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &InvestigationConfig) -> Self {
        Self {
            llm,
            objective: config.objective.clone(),
            timeout: config.planner_timeout(),
            temperature: 0.2,
            max_tokens: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Round-1 plan from the alert, its entities, and the objective.
    pub async fn initial_plan(
        &self,
        alert: &Alert,
        entities: &Entities,
        available: &[String],
    ) -> Result<Plan, LlmError> {
        let prompt = format!(
            "Objective: {}\n\nAlert: {}\n{}\n\nExtracted entities:\n{}\n\nAvailable task types: {}\n\n\
             Propose the initial set of investigation tasks.",
            self.objective,
            alert.headline(),
            alert.description,
            describe_entities(entities),
            available.join(", "),
        );
        self.plan(prompt, entities, available).await
    }

    /// Round >= 2 plan. An empty plan means the investigation is done.
    pub async fn follow_up_plan(
        &self,
        alert: &Alert,
        entities: &Entities,
        findings: &[AgentResult],
        log: &[String],
        available: &[String],
    ) -> Result<Plan, LlmError> {
        let prompt = format!(
            "Objective: {}\n\nAlert: {}\n{}\n\nExtracted entities:\n{}\n\nFindings so far:\n{}\n\n\
             Investigation log:\n{}\n\nAvailable task types: {}\n\n\
             Propose follow-up tasks only if they would change the verdict; otherwise return an empty tasks list.",
            self.objective,
            alert.headline(),
            alert.description,
            describe_entities(entities),
            describe_findings(findings),
            log.join("\n"),
            available.join(", "),
        );
        self.plan(prompt, entities, available).await
    }

    /// Final report text from everything gathered.
    pub async fn synthesize(
        &self,
        alert: &Alert,
        entities: &Entities,
        findings: &[AgentResult],
        context: &[HistoricalContextItem],
        log: &[String],
    ) -> Result<(String, TokenUsage), LlmError> {
        let prompt = format!(
            "Alert: {}\n{}\n\nExtracted entities:\n{}\n\nFindings:\n{}\n\nHistorical cases:\n{}\n\n\
             Investigation log:\n{}",
            alert.headline(),
            alert.description,
            describe_entities(entities),
            describe_findings(findings),
            describe_context(context),
            log.join("\n"),
        );
        let request = self.request(SYNTHESIS_SYSTEM_PROMPT, prompt);
        let response = self.bounded(self.llm.complete(request)).await?;
        Ok((response.text.trim().to_string(), response.usage))
    }

    async fn plan(
        &self,
        prompt: String,
        entities: &Entities,
        available: &[String],
    ) -> Result<Plan, LlmError> {
        let request = self.request(PLANNER_SYSTEM_PROMPT, prompt);
        let response = self.bounded(self.llm.complete(request)).await?;
        debug!(chars = response.text.len(), "Planner responded");

        let (tasks, reasoning) = parse_plan(&response.text, available);
        let tasks = tasks
            .into_iter()
            .map(|t| fill_subject(t, entities))
            .collect();
        Ok(Plan {
            tasks,
            reasoning,
            usage: response.usage,
        })
    }

    fn request(&self, system: &str, prompt: String) -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message::system(system), Message::user(prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: None,
        }
    }

    async fn bounded<F, T>(&self, call: F) -> Result<T, LlmError>
    where
        F: std::future::Future<Output = Result<T, LlmError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LlmError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?
    }
}

/// Parse tasks and reasoning out of a planner completion.
///
/// Unregistered task types and malformed entries are dropped.
pub fn parse_plan(text: &str, available: &[String]) -> (Vec<AgentTask>, Option<String>) {
    let Some(value) = extract_json_block(text) else {
        debug!("Planner output contained no JSON object");
        return (Vec::new(), None);
    };

    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let entries = match value.get("tasks") {
        Some(Value::Array(entries)) => entries.clone(),
        _ => return (Vec::new(), reasoning),
    };

    let tasks = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<AgentTask>(entry) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "Dropping malformed planner task");
                None
            }
        })
        .filter(|task| {
            let known = available.iter().any(|t| t == &task.task_type);
            if !known {
                warn!(task_type = %task.task_type, "Dropping planner task with unknown type");
            }
            known
        })
        .collect();

    (tasks, reasoning)
}

/// Deterministic round-1 plan used when the planner yields nothing.
pub fn fallback_tasks(entities: &Entities) -> Vec<AgentTask> {
    let mut tasks = Vec::new();
    if let Some(ip) = &entities.ip {
        tasks.push(AgentTask::new(task_types::CHECK_IP, TaskPriority::High).with_param("ip", ip.as_str()));
        tasks.push(
            AgentTask::new(task_types::QUERY_LOGS, TaskPriority::Medium).with_param("ip", ip.as_str()),
        );
    }
    if let Some(hash) = &entities.hash {
        tasks.push(
            AgentTask::new(task_types::CHECK_HASH, TaskPriority::High).with_param("hash", hash.as_str()),
        );
    }
    if let Some(username) = &entities.username {
        tasks.push(
            AgentTask::new(task_types::CHECK_USER, TaskPriority::Medium)
                .with_param("username", username.as_str()),
        );
    }
    tasks
}

/// Supply the task's subject parameter from the extracted entities when the
/// planner left it out.
fn fill_subject(task: AgentTask, entities: &Entities) -> AgentTask {
    let Some(key) = task_types::subject_param(&task.task_type) else {
        return task;
    };
    if task.param_str(key).is_some() {
        return task;
    }
    let entity = match key {
        "ip" => entities.ip.as_deref(),
        "hash" => entities.hash.as_deref(),
        _ => entities.username.as_deref(),
    };
    match entity {
        Some(value) => task.with_param(key, value),
        None => task,
    }
}

fn describe_entities(entities: &Entities) -> String {
    if entities.is_empty() {
        return "(none)".to_string();
    }
    let mut lines = Vec::new();
    if let Some(ip) = &entities.ip {
        lines.push(format!("- ip: {}", ip));
    }
    if let Some(user) = &entities.username {
        lines.push(format!("- username: {}", user));
    }
    if let Some(hash) = &entities.hash {
        lines.push(format!("- hash: {}", hash));
    }
    lines.join("\n")
}

fn describe_findings(findings: &[AgentResult]) -> String {
    if findings.is_empty() {
        return "(none)".to_string();
    }
    findings
        .iter()
        .map(|f| {
            let mut line = format!("- [{}] {:?}: {}", f.agent, f.status, f.summary);
            if let Some(data) = &f.data {
                let mut json = data.to_string();
                if json.len() > MAX_DATA_CHARS {
                    let cut = (0..=MAX_DATA_CHARS)
                        .rev()
                        .find(|i| json.is_char_boundary(*i))
                        .unwrap_or(0);
                    json.truncate(cut);
                    json.push_str("...");
                }
                line.push_str(&format!("\n  data: {}", json));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_context(context: &[HistoricalContextItem]) -> String {
    if context.is_empty() {
        return "(none)".to_string();
    }
    context
        .iter()
        .map(|c| format!("- {} (resolution: {})", c.title, c.resolution))
        .collect::<Vec<_>>()
        .join("\n")
}
