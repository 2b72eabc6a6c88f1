//! Collaborator contracts for the relational and analytics stores.
//!
//! The investigation engine only ever talks to these traits. `InMemoryStore`
//! implements all of them for tests, local runs, and the CLI dataset loader.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A case record from the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Entity values (IPs, usernames, hashes) this case was linked to.
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Cross-reference from an entity value to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReference {
    pub case_id: String,
    pub entity_value: String,
}

/// A directory user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
}

/// An interactive session for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// One login attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default = "default_true")]
    pub success: bool,
}

fn default_true() -> bool {
    true
}

/// A row from the analytics (event) store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(default)]
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source_ip: Option<String>,
    #[serde(default)]
    pub dest_ip: Option<String>,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl AnalyticsEvent {
    pub fn touches_ip(&self, ip: &str) -> bool {
        self.source_ip.as_deref() == Some(ip) || self.dest_ip.as_deref() == Some(ip)
    }
}

/// Time-bounded filter for analytics queries.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub tenant_id: String,
    pub ip: String,
    pub since: DateTime<Utc>,
    pub limit: usize,
}

/// Read/update access to an alert's stored analysis blob.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Current analysis blob for the alert, if one exists.
    async fn load_analysis(&self, alert_id: &str) -> Result<Option<Map<String, Value>>, StoreError>;

    /// Replace the analysis blob for the alert.
    async fn save_analysis(
        &self,
        alert_id: &str,
        analysis: Map<String, Value>,
    ) -> Result<(), StoreError>;
}

/// Case lookups used by keyword context retrieval.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Cross-references to cases sharing any of `values`, at most `limit`.
    async fn case_references(
        &self,
        tenant_id: &str,
        values: &[String],
        limit: usize,
    ) -> Result<Vec<CaseReference>, StoreError>;

    /// Resolved cases among `ids`, at most `limit`, in `ids` order.
    async fn resolved_cases(
        &self,
        tenant_id: &str,
        ids: &[String],
        limit: usize,
    ) -> Result<Vec<Case>, StoreError>;
}

/// User, session, and login-history lookups.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Exact username match.
    async fn find_user(&self, tenant_id: &str, username: &str)
    -> Result<Option<UserRecord>, StoreError>;

    /// Case-insensitive substring match on username, email, or display name.
    async fn search_users(
        &self,
        tenant_id: &str,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<UserRecord>, StoreError>;

    async fn sessions(&self, user_id: &str) -> Result<Vec<UserSession>, StoreError>;

    /// Most recent logins first, at most `limit`.
    async fn login_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<LoginRecord>, StoreError>;
}

/// Filtered, time-bounded event queries.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn query_events(&self, query: &EventQuery) -> Result<Vec<AnalyticsEvent>, StoreError>;
}

/// Serializable seed data for [`InMemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub cases: Vec<Case>,
    pub users: Vec<UserRecord>,
    pub sessions: Vec<UserSession>,
    pub logins: Vec<LoginRecord>,
    pub events: Vec<AnalyticsEvent>,
}

#[derive(Default)]
struct Tables {
    analyses: HashMap<String, Map<String, Value>>,
    cases: Vec<Case>,
    users: Vec<UserRecord>,
    sessions: Vec<UserSession>,
    logins: Vec<LoginRecord>,
    events: Vec<AnalyticsEvent>,
}

/// In-process implementation of every store trait.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let store = Self::new();
        {
            let mut t = store.write();
            t.cases = dataset.cases;
            t.users = dataset.users;
            t.sessions = dataset.sessions;
            t.logins = dataset.logins;
            t.events = dataset.events;
        }
        store
    }

    pub fn insert_case(&self, case: Case) {
        self.write().cases.push(case);
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.write().users.push(user);
    }

    pub fn insert_session(&self, session: UserSession) {
        self.write().sessions.push(session);
    }

    pub fn insert_login(&self, login: LoginRecord) {
        self.write().logins.push(login);
    }

    pub fn insert_event(&self, event: AnalyticsEvent) {
        self.write().events.push(event);
    }

    /// Seed an analysis blob directly (e.g. fields written by another subsystem).
    pub fn put_analysis(&self, alert_id: &str, analysis: Map<String, Value>) {
        self.write().analyses.insert(alert_id.to_string(), analysis);
    }

    /// Snapshot of the stored analysis blob.
    pub fn analysis(&self, alert_id: &str) -> Option<Map<String, Value>> {
        self.read().analyses.get(alert_id).cloned()
    }

    /// Make every subsequent write fail (simulates a persistence outage).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "in-memory store configured to fail reads".to_string(),
            });
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|p| p.into_inner())
    }
}

fn same_tenant(record_tenant: &str, tenant_id: &str) -> bool {
    record_tenant.is_empty() || tenant_id.is_empty() || record_tenant == tenant_id
}

#[async_trait]
impl AlertStore for InMemoryStore {
    async fn load_analysis(&self, alert_id: &str) -> Result<Option<Map<String, Value>>, StoreError> {
        self.check_read()?;
        Ok(self.read().analyses.get(alert_id).cloned())
    }

    async fn save_analysis(
        &self,
        alert_id: &str,
        analysis: Map<String, Value>,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                message: format!("cannot persist analysis for alert {}", alert_id),
            });
        }
        self.write().analyses.insert(alert_id.to_string(), analysis);
        Ok(())
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn case_references(
        &self,
        tenant_id: &str,
        values: &[String],
        limit: usize,
    ) -> Result<Vec<CaseReference>, StoreError> {
        self.check_read()?;
        let tables = self.read();
        let refs = tables
            .cases
            .iter()
            .filter(|c| same_tenant(&c.tenant_id, tenant_id))
            .flat_map(|c| {
                c.entities
                    .iter()
                    .filter(|e| values.iter().any(|v| v == *e))
                    .map(|e| CaseReference {
                        case_id: c.id.clone(),
                        entity_value: e.clone(),
                    })
            })
            .take(limit)
            .collect();
        Ok(refs)
    }

    async fn resolved_cases(
        &self,
        tenant_id: &str,
        ids: &[String],
        limit: usize,
    ) -> Result<Vec<Case>, StoreError> {
        self.check_read()?;
        let tables = self.read();
        let cases = ids
            .iter()
            .filter_map(|id| {
                tables
                    .cases
                    .iter()
                    .find(|c| &c.id == id && c.resolved && same_tenant(&c.tenant_id, tenant_id))
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(cases)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(
        &self,
        tenant_id: &str,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.check_read()?;
        Ok(self
            .read()
            .users
            .iter()
            .find(|u| u.username == username && same_tenant(&u.tenant_id, tenant_id))
            .cloned())
    }

    async fn search_users(
        &self,
        tenant_id: &str,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<UserRecord>, StoreError> {
        self.check_read()?;
        let needle = fragment.to_lowercase();
        let contains = |field: Option<&str>| {
            field.is_some_and(|f| f.to_lowercase().contains(&needle))
        };
        Ok(self
            .read()
            .users
            .iter()
            .filter(|u| same_tenant(&u.tenant_id, tenant_id))
            .filter(|u| {
                contains(Some(&u.username))
                    || contains(u.email.as_deref())
                    || contains(u.display_name.as_deref())
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn sessions(&self, user_id: &str) -> Result<Vec<UserSession>, StoreError> {
        self.check_read()?;
        Ok(self
            .read()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn login_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<LoginRecord>, StoreError> {
        self.check_read()?;
        let mut logins: Vec<LoginRecord> = self
            .read()
            .logins
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        logins.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        logins.truncate(limit);
        Ok(logins)
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryStore {
    async fn query_events(&self, query: &EventQuery) -> Result<Vec<AnalyticsEvent>, StoreError> {
        self.check_read()?;
        let mut events: Vec<AnalyticsEvent> = self
            .read()
            .events
            .iter()
            .filter(|e| same_tenant(&e.tenant_id, &query.tenant_id))
            .filter(|e| e.timestamp >= query.since && e.touches_ip(&query.ip))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(query.limit);
        Ok(events)
    }
}
