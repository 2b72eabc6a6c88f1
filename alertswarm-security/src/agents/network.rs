//! Network specialist: IP reputation and log lookups.

use crate::intel::{AbuseIpDbClient, IpReputation, VirusTotalClient, VtReport};
use alertswarm_core::config::AgentsConfig;
use alertswarm_core::error::EnrichmentError;
use alertswarm_core::multi::SpecialistAgent;
use alertswarm_core::store::{AnalyticsStore, EventQuery};
use alertswarm_core::types::{AgentResult, AgentTask, task_types};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

pub const AGENT_NAME: &str = "network";

/// Upper bound on `query_logs` look-back, in hours.
const MAX_QUERY_HOURS: u64 = 24 * 30;

/// Tasks the network agent understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkTask {
    CheckIp {
        ip: String,
    },
    QueryLogs {
        ip: String,
        hours: Option<u64>,
        limit: Option<usize>,
        tenant_id: String,
    },
}

impl TryFrom<&AgentTask> for NetworkTask {
    type Error = String;

    fn try_from(task: &AgentTask) -> Result<Self, Self::Error> {
        let ip = || {
            task.param_str("ip")
                .map(String::from)
                .ok_or_else(|| format!("{} requires an 'ip' parameter", task.task_type))
        };
        match task.task_type.as_str() {
            task_types::CHECK_IP => Ok(NetworkTask::CheckIp { ip: ip()? }),
            task_types::QUERY_LOGS => Ok(NetworkTask::QueryLogs {
                ip: ip()?,
                hours: task.param_u64("hours"),
                limit: task.param_u64("limit").map(|l| l as usize),
                tenant_id: task
                    .param_str(task_types::TENANT_PARAM)
                    .unwrap_or_default()
                    .to_string(),
            }),
            other => Err(format!("network agent cannot handle task type '{}'", other)),
        }
    }
}

pub struct NetworkAgent {
    abuseipdb: Arc<AbuseIpDbClient>,
    virustotal: Arc<VirusTotalClient>,
    analytics: Arc<dyn AnalyticsStore>,
    config: AgentsConfig,
}

impl NetworkAgent {
    pub fn new(
        abuseipdb: Arc<AbuseIpDbClient>,
        virustotal: Arc<VirusTotalClient>,
        analytics: Arc<dyn AnalyticsStore>,
        config: AgentsConfig,
    ) -> Self {
        Self {
            abuseipdb,
            virustotal,
            analytics,
            config,
        }
    }

    /// Query both reputation providers concurrently; either may fail alone.
    async fn check_ip(&self, ip: &str) -> AgentResult {
        let (abuse, vt) = futures::join!(self.abuseipdb.check_ip(ip), self.virustotal.check_ip(ip));
        if let Err(e) = &abuse {
            warn!(ip, provider = "abuseipdb", error = %e, "IP reputation lookup failed");
        }
        if let Err(e) = &vt {
            warn!(ip, provider = "virustotal", error = %e, "IP reputation lookup failed");
        }
        ip_verdict(ip, abuse, vt)
    }

    async fn query_logs(
        &self,
        ip: &str,
        hours: Option<u64>,
        limit: Option<usize>,
        tenant_id: &str,
    ) -> AgentResult {
        let hours = hours
            .unwrap_or(self.config.query_logs_hours)
            .clamp(1, MAX_QUERY_HOURS);
        let limit = limit
            .unwrap_or(self.config.query_logs_limit)
            .clamp(1, self.config.query_logs_limit.max(1));
        let query = EventQuery {
            tenant_id: tenant_id.to_string(),
            ip: ip.to_string(),
            since: Utc::now() - Duration::hours(hours as i64),
            limit,
        };
        debug!(ip, hours, limit, "Querying analytics events");

        match self.analytics.query_events(&query).await {
            Ok(events) => {
                let count = events.len();
                let denied = events
                    .iter()
                    .filter(|e| {
                        e.action
                            .as_deref()
                            .is_some_and(|a| matches!(a, "deny" | "denied" | "block" | "blocked"))
                    })
                    .count();
                AgentResult::success(
                    AGENT_NAME,
                    json!({
                        "ip": ip,
                        "hours": hours,
                        "limit": limit,
                        "eventCount": count,
                        "deniedCount": denied,
                        "truncated": count >= limit,
                        "events": events,
                    }),
                    format!(
                        "{} event(s) involving {} in the last {}h ({} denied)",
                        count, ip, hours, denied
                    ),
                )
            }
            Err(e) => AgentResult::failed(AGENT_NAME, format!("Log query for {} failed: {}", ip, e)),
        }
    }
}

/// Combine provider outcomes; malicious if any provider flags the IP.
fn ip_verdict(
    ip: &str,
    abuse: Result<IpReputation, EnrichmentError>,
    vt: Result<VtReport, EnrichmentError>,
) -> AgentResult {
    if let (Err(a), Err(v)) = (&abuse, &vt) {
        return AgentResult::failed(
            AGENT_NAME,
            format!("All reputation lookups for {} failed: {}; {}", ip, a, v),
        );
    }

    let mut flagged_by = Vec::new();
    let mut details = Vec::new();
    let abuse_json = match &abuse {
        Ok(rep) => {
            if rep.is_malicious {
                flagged_by.push("AbuseIPDB");
            }
            details.push(format!("AbuseIPDB score {}", rep.abuse_confidence_score));
            serde_json::to_value(rep).unwrap_or(Value::Null)
        }
        Err(e) => json!({ "error": e.to_string() }),
    };
    let vt_json = match &vt {
        Ok(report) => {
            if report.is_malicious {
                flagged_by.push("VirusTotal");
            }
            if report.found {
                details.push(format!("VirusTotal {}", report.detections()));
            } else {
                details.push("VirusTotal no record".to_string());
            }
            serde_json::to_value(report).unwrap_or(Value::Null)
        }
        Err(e) => json!({ "error": e.to_string() }),
    };

    let malicious = !flagged_by.is_empty();
    let summary = if malicious {
        format!(
            "IP {} flagged malicious by {} ({})",
            ip,
            flagged_by.join(" and "),
            details.join(", ")
        )
    } else {
        format!("IP {} not flagged ({})", ip, details.join(", "))
    };

    AgentResult::success(
        AGENT_NAME,
        json!({
            "ip": ip,
            "malicious": malicious,
            "flaggedBy": flagged_by,
            "abuseipdb": abuse_json,
            "virustotal": vt_json,
        }),
        summary,
    )
}

#[async_trait]
impl SpecialistAgent for NetworkAgent {
    fn name(&self) -> &str {
        AGENT_NAME
    }

    fn task_types(&self) -> &[&'static str] {
        &[task_types::CHECK_IP, task_types::QUERY_LOGS]
    }

    async fn process(&self, task: &AgentTask) -> AgentResult {
        match NetworkTask::try_from(task) {
            Ok(NetworkTask::CheckIp { ip }) => self.check_ip(&ip).await,
            Ok(NetworkTask::QueryLogs {
                ip,
                hours,
                limit,
                tenant_id,
            }) => self.query_logs(&ip, hours, limit, &tenant_id).await,
            Err(e) => AgentResult::failed(AGENT_NAME, e),
        }
    }
}
