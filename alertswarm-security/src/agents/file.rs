//! File specialist: hash reputation via VirusTotal.

use crate::intel::VirusTotalClient;
use alertswarm_core::multi::SpecialistAgent;
use alertswarm_core::types::{AgentResult, AgentTask, task_types};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const AGENT_NAME: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTask {
    CheckHash { hash: String },
}

impl TryFrom<&AgentTask> for FileTask {
    type Error = String;

    fn try_from(task: &AgentTask) -> Result<Self, Self::Error> {
        match task.task_type.as_str() {
            task_types::CHECK_HASH => task
                .param_str("hash")
                .map(|h| FileTask::CheckHash {
                    hash: h.to_lowercase(),
                })
                .ok_or_else(|| "check_hash requires a 'hash' parameter".to_string()),
            other => Err(format!("file agent cannot handle task type '{}'", other)),
        }
    }
}

pub struct FileAgent {
    virustotal: Arc<VirusTotalClient>,
}

impl FileAgent {
    pub fn new(virustotal: Arc<VirusTotalClient>) -> Self {
        Self { virustotal }
    }

    async fn check_hash(&self, hash: &str) -> AgentResult {
        let report = match self.virustotal.check_hash(hash).await {
            Ok(report) => report,
            Err(e) => {
                return AgentResult::failed(AGENT_NAME, format!("Hash lookup for {} failed: {}", hash, e));
            }
        };

        if !report.found {
            return AgentResult::success(
                AGENT_NAME,
                json!({ "hash": hash, "found": false, "malicious": false }),
                format!("Hash {} unknown to VirusTotal", hash),
            );
        }

        let malicious = report.is_malicious || report.detection_ratio > 0.0;
        let summary = if malicious {
            format!(
                "Hash {} detected as malicious ({} engines)",
                hash,
                report.detections()
            )
        } else {
            format!("Hash {} clean ({} engines)", hash, report.detections())
        };
        AgentResult::success(
            AGENT_NAME,
            json!({
                "hash": hash,
                "found": true,
                "malicious": malicious,
                "detectionRatio": report.detection_ratio,
                "virustotal": report,
            }),
            summary,
        )
    }
}

#[async_trait]
impl SpecialistAgent for FileAgent {
    fn name(&self) -> &str {
        AGENT_NAME
    }

    fn task_types(&self) -> &[&'static str] {
        &[task_types::CHECK_HASH]
    }

    async fn process(&self, task: &AgentTask) -> AgentResult {
        match FileTask::try_from(task) {
            Ok(FileTask::CheckHash { hash }) => self.check_hash(&hash).await,
            Err(e) => AgentResult::failed(AGENT_NAME, e),
        }
    }
}
