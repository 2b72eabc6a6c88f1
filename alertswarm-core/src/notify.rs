//! Best-effort status notifications for in-flight investigations.
//!
//! Notifier failures never affect the investigation: the orchestrator logs
//! them and carries on.

use crate::types::AgentResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Investigation phase reported to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Started,
    Context,
    Planning,
    Dispatching,
    Finding,
    Synthesizing,
    Completed,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Started => "started",
            Phase::Context => "context",
            Phase::Planning => "planning",
            Phase::Dispatching => "dispatching",
            Phase::Finding => "finding",
            Phase::Synthesizing => "synthesizing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Payload of one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding: Option<AgentResult>,
}

impl StatusUpdate {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            round: None,
            max_rounds: None,
            message: message.into(),
            finding: None,
        }
    }

    pub fn with_round(mut self, round: u32, max_rounds: u32) -> Self {
        self.round = Some(round);
        self.max_rounds = Some(max_rounds);
        self
    }

    pub fn with_finding(mut self, finding: AgentResult) -> Self {
        self.finding = Some(finding);
        self
    }
}

/// Fire-and-forget progress channel.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn notify(
        &self,
        tenant_id: &str,
        alert_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), String>;
}

/// Discards every update.
pub struct NoOpNotifier;

#[async_trait]
impl StatusNotifier for NoOpNotifier {
    async fn notify(&self, _: &str, _: &str, _: &StatusUpdate) -> Result<(), String> {
        Ok(())
    }
}

/// Emits every update as a `tracing` event.
pub struct TracingNotifier;

#[async_trait]
impl StatusNotifier for TracingNotifier {
    async fn notify(
        &self,
        tenant_id: &str,
        alert_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), String> {
        tracing::info!(
            tenant_id,
            alert_id,
            phase = %update.phase,
            round = ?update.round,
            "{}",
            update.message
        );
        Ok(())
    }
}

/// Records updates in memory, optionally failing every call.
#[derive(Default)]
pub struct RecordingNotifier {
    updates: Mutex<Vec<StatusUpdate>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records each update and then reports failure.
    pub fn failing() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().await.clone()
    }

    pub async fn phases(&self) -> Vec<Phase> {
        self.updates.lock().await.iter().map(|u| u.phase).collect()
    }
}

#[async_trait]
impl StatusNotifier for RecordingNotifier {
    async fn notify(&self, _: &str, _: &str, update: &StatusUpdate) -> Result<(), String> {
        self.updates.lock().await.push(update.clone());
        if self.fail {
            return Err("notification channel closed".to_string());
        }
        Ok(())
    }
}
