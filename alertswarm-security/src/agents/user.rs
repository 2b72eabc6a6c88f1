//! User specialist: directory lookup and heuristic account risk score.

use alertswarm_core::multi::SpecialistAgent;
use alertswarm_core::store::{LoginRecord, UserDirectory, UserRecord, UserSession};
use alertswarm_core::types::{AgentResult, AgentTask, task_types};
use async_trait::async_trait;
use chrono::{Duration, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub const AGENT_NAME: &str = "user";

/// Logins considered when scoring.
const LOGIN_HISTORY_LIMIT: usize = 50;
const FUZZY_CANDIDATES: usize = 5;

const PRIVILEGED_ROLES: &[&str] = &[
    "admin",
    "administrator",
    "root",
    "superuser",
    "domain_admin",
    "global_admin",
    "owner",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserTask {
    CheckUser { username: String, tenant_id: String },
}

impl TryFrom<&AgentTask> for UserTask {
    type Error = String;

    fn try_from(task: &AgentTask) -> Result<Self, Self::Error> {
        match task.task_type.as_str() {
            task_types::CHECK_USER => {
                let username = task
                    .param_str("username")
                    .ok_or_else(|| "check_user requires a 'username' parameter".to_string())?;
                Ok(UserTask::CheckUser {
                    username: username.to_string(),
                    tenant_id: task
                        .param_str(task_types::TENANT_PARAM)
                        .unwrap_or_default()
                        .to_string(),
                })
            }
            other => Err(format!("user agent cannot handle task type '{}'", other)),
        }
    }
}

/// Qualitative band for a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            70.. => RiskLevel::High,
            40..=69 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

/// Result of the account risk heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// 0..=100.
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub active_sessions: usize,
    pub countries: Vec<String>,
    pub off_hours_logins: usize,
    pub failed_logins: usize,
}

pub fn is_privileged(role: &str) -> bool {
    let role = role.trim().to_lowercase();
    PRIVILEGED_ROLES.contains(&role.as_str()) || role.contains("admin")
}

fn is_off_hours(login: &LoginRecord) -> bool {
    let hour = login.timestamp.hour();
    hour < 6 || hour >= 22
}

/// Sum of independent weighted factors, capped at 100.
///
/// `logins` may be in any order.
pub fn assess_risk(
    user: &UserRecord,
    sessions: &[UserSession],
    logins: &[LoginRecord],
) -> RiskAssessment {
    let mut score = 0u32;
    let mut factors = Vec::new();

    if is_privileged(&user.role) {
        score += 30;
        factors.push(format!("privileged role '{}' (+30)", user.role));
    }

    let active_sessions = sessions.iter().filter(|s| s.active).count();
    if active_sessions > 3 {
        score += 15;
        factors.push(format!("{} concurrent active sessions (+15)", active_sessions));
    }

    let countries: BTreeSet<String> = logins
        .iter()
        .filter_map(|l| l.country.as_deref())
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();
    if countries.len() > 1 {
        let points = ((countries.len() as u32 - 1) * 10).min(30);
        score += points;
        factors.push(format!("logins from {} countries (+{})", countries.len(), points));
    }

    let off_hours = logins.iter().filter(|l| is_off_hours(l)).count();
    if off_hours > 0 {
        let points = (off_hours as u32 * 5).min(20);
        score += points;
        factors.push(format!("{} off-hours login(s) (+{})", off_hours, points));
    }

    let mut timestamps: Vec<_> = logins.iter().map(|l| l.timestamp).collect();
    timestamps.sort_unstable_by(|a, b| b.cmp(a));
    if let [latest, previous, ..] = timestamps.as_slice()
        && *latest - *previous > Duration::days(30)
    {
        score += 15;
        factors.push(format!(
            "active again after {} days dormant (+15)",
            (*latest - *previous).num_days()
        ));
    }

    let failed = logins.iter().filter(|l| !l.success).count();
    if failed > 0 {
        let points = (failed as u32 * 5).min(15);
        score += points;
        factors.push(format!("{} failed login(s) (+{})", failed, points));
    }

    let score = score.min(100);
    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        factors,
        active_sessions,
        countries: countries.into_iter().collect(),
        off_hours_logins: off_hours,
        failed_logins: failed,
    }
}

pub struct UserAgent {
    directory: Arc<dyn UserDirectory>,
}

impl UserAgent {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Exact match first, then the first fuzzy candidate.
    async fn lookup(&self, tenant_id: &str, username: &str) -> Result<Option<(UserRecord, &'static str)>, String> {
        let exact = self
            .directory
            .find_user(tenant_id, username)
            .await
            .map_err(|e| format!("User lookup for '{}' failed: {}", username, e))?;
        if let Some(user) = exact {
            return Ok(Some((user, "exact")));
        }
        let candidates = self
            .directory
            .search_users(tenant_id, username, FUZZY_CANDIDATES)
            .await
            .map_err(|e| format!("Fuzzy user search for '{}' failed: {}", username, e))?;
        debug!(username, candidates = candidates.len(), "Fuzzy user search");
        Ok(candidates.into_iter().next().map(|u| (u, "fuzzy")))
    }

    async fn check_user(&self, username: &str, tenant_id: &str) -> AgentResult {
        let (user, matched_by) = match self.lookup(tenant_id, username).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                return AgentResult::failed(AGENT_NAME, format!("User '{}' not found", username));
            }
            Err(e) => return AgentResult::failed(AGENT_NAME, e),
        };

        let (sessions, logins) = futures::join!(
            self.directory.sessions(&user.id),
            self.directory.login_history(&user.id, LOGIN_HISTORY_LIMIT)
        );
        let sessions = match sessions {
            Ok(s) => s,
            Err(e) => return AgentResult::failed(AGENT_NAME, format!("Session lookup failed: {}", e)),
        };
        let logins = match logins {
            Ok(l) => l,
            Err(e) => {
                return AgentResult::failed(AGENT_NAME, format!("Login history lookup failed: {}", e));
            }
        };

        let risk = assess_risk(&user, &sessions, &logins);
        let summary = format!(
            "User {} ({}) risk {}/100 [{:?}]{}",
            user.username,
            if user.role.is_empty() { "no role" } else { user.role.as_str() },
            risk.score,
            risk.level,
            if risk.factors.is_empty() {
                String::new()
            } else {
                format!(": {}", risk.factors.join("; "))
            }
        );
        AgentResult::success(
            AGENT_NAME,
            json!({
                "user": {
                    "id": user.id,
                    "username": user.username,
                    "email": user.email,
                    "displayName": user.display_name,
                    "role": user.role,
                    "department": user.department,
                    "lastActiveAt": user.last_active_at,
                },
                "matchedBy": matched_by,
                "recentLogins": logins.len(),
                "risk": risk,
            }),
            summary,
        )
    }
}

#[async_trait]
impl SpecialistAgent for UserAgent {
    fn name(&self) -> &str {
        AGENT_NAME
    }

    fn task_types(&self) -> &[&'static str] {
        &[task_types::CHECK_USER]
    }

    async fn process(&self, task: &AgentTask) -> AgentResult {
        match UserTask::try_from(task) {
            Ok(UserTask::CheckUser {
                username,
                tenant_id,
            }) => self.check_user(&username, &tenant_id).await,
            Err(e) => AgentResult::failed(AGENT_NAME, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertswarm_core::store::InMemoryStore;
    use alertswarm_core::types::TaskPriority;
    use chrono::{DateTime, TimeZone, Utc};

    fn user(role: &str) -> UserRecord {
        UserRecord {
            id: "u1".into(),
            tenant_id: "t1".into(),
            username: "jdoe".into(),
            email: Some("john.doe@example.com".into()),
            display_name: Some("John Doe".into()),
            role: role.into(),
            department: None,
            last_active_at: None,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn login(ts: DateTime<Utc>, country: &str, success: bool) -> LoginRecord {
        LoginRecord {
            user_id: "u1".into(),
            timestamp: ts,
            ip: None,
            country: Some(country.into()),
            success,
        }
    }

    fn session(active: bool) -> UserSession {
        UserSession {
            id: "s".into(),
            user_id: "u1".into(),
            started_at: at(1, 9),
            ip: None,
            active,
        }
    }

    #[test]
    fn test_baseline_user_scores_zero() {
        let risk = assess_risk(&user("analyst"), &[], &[login(at(2, 10), "US", true)]);
        assert_eq!(risk.score, 0);
        assert_eq!(risk.level, RiskLevel::Low);
        assert!(risk.factors.is_empty());
    }

    #[test]
    fn test_individual_factors() {
        let risk = assess_risk(&user("Domain Admin"), &[], &[]);
        assert_eq!(risk.score, 30);

        let sessions: Vec<_> = (0..4).map(|_| session(true)).collect();
        assert_eq!(assess_risk(&user("dev"), &sessions, &[]).score, 15);

        let spread = [
            login(at(2, 10), "US", true),
            login(at(2, 11), "DE", true),
            login(at(2, 12), "BR", true),
        ];
        assert_eq!(assess_risk(&user("dev"), &[], &spread).score, 20);

        let nights = [login(at(2, 23), "US", true), login(at(3, 3), "US", true)];
        assert_eq!(assess_risk(&user("dev"), &[], &nights).score, 10);

        let failures = [login(at(2, 10), "US", false), login(at(2, 11), "US", true)];
        assert_eq!(assess_risk(&user("dev"), &[], &failures).score, 5);
    }

    #[test]
    fn test_dormant_account_reactivated() {
        let logins = [login(at(1, 10), "US", true), login(at(1, 10) + Duration::days(45), "US", true)];
        let risk = assess_risk(&user("dev"), &[], &logins);
        assert_eq!(risk.score, 15);
        assert!(risk.factors[0].contains("dormant"));
    }

    #[test]
    fn test_factor_caps_and_total_cap() {
        let sessions: Vec<_> = (0..10).map(|_| session(true)).collect();
        let countries = ["US", "DE", "BR", "RU", "CN", "KP"];
        let mut logins: Vec<_> = countries
            .iter()
            .enumerate()
            .map(|(i, c)| login(at(2 + i as u32, 2), c, false))
            .collect();
        logins.push(login(at(1, 2) - Duration::days(60), "US", true));

        let risk = assess_risk(&user("admin"), &sessions, &logins);
        // 30 + 15 + 30 + 20 + 15 = 110, capped.
        assert_eq!(risk.score, 100);
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.countries.len(), 6);
    }

    #[tokio::test]
    async fn test_check_user_fuzzy_match() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_user(user("admin"));
        store.insert_login(login(at(2, 23), "US", true));
        let agent = UserAgent::new(store.clone());

        let task = AgentTask::new("check_user", TaskPriority::Medium).with_param("username", "JDOE");
        let result = agent.process(&task).await;
        assert!(result.is_success());
        let data = result.data.unwrap();
        assert_eq!(data["matchedBy"], "fuzzy");
        assert_eq!(data["risk"]["score"], 35);
        assert_eq!(data["risk"]["level"], "low");

        for _ in 0..4 {
            store.insert_session(session(true));
        }
        store.insert_session(session(false));
        let data = agent.process(&task).await.data.unwrap();
        assert_eq!(data["risk"]["activeSessions"], 4);
        assert_eq!(data["risk"]["score"], 50);
        assert_eq!(data["risk"]["level"], "medium");
    }

    #[tokio::test]
    async fn test_unknown_user_fails_cleanly() {
        let agent = UserAgent::new(Arc::new(InMemoryStore::new()));
        let task = AgentTask::new("check_user", TaskPriority::Medium).with_param("username", "ghost");
        let result = agent.process(&task).await;
        assert!(!result.is_success());
        assert!(result.error.unwrap().contains("not found"));
    }
}
