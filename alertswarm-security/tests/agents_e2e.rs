//! End-to-end tests: real specialist agents behind the orchestrator, with
//! enrichment clients in mock mode and the in-memory stores.

use alertswarm_core::brain::MockLlmProvider;
use alertswarm_core::config::{AgentsConfig, EnrichmentConfig, ProviderConfig, SwarmConfig};
use alertswarm_core::error::EnrichmentError;
use alertswarm_core::store::{AnalyticsEvent, InMemoryStore, LoginRecord, UserRecord};
use alertswarm_core::types::{AgentTask, Alert, Observable, TaskPriority};
use alertswarm_core::{
    ContextRetriever, LocalSimilarityIndex, Orchestrator, SpecialistAgent, TaskPlanner,
};
use alertswarm_security::intel::abuseipdb::AbuseIpDbClient;
use alertswarm_security::intel::virustotal::VirusTotalClient;
use alertswarm_security::{IntelClients, NetworkAgent, build_router};
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::sync::Arc;

fn unreachable_provider(capacity: usize) -> ProviderConfig {
    ProviderConfig {
        api_key_env: "ALERTSWARM_TEST_UNSET_KEY".into(),
        api_key: None,
        base_url: "http://127.0.0.1:9".into(),
        capacity,
        window_secs: 60,
        timeout_secs: 2,
    }
}

fn midday_yesterday() -> DateTime<Utc> {
    let day = (Utc::now() - Duration::days(1)).date_naive();
    day.and_hms_opt(12, 0, 0).unwrap().and_utc()
}

fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert_user(UserRecord {
        id: "u-42".into(),
        tenant_id: "acme".into(),
        username: "jdoe".into(),
        email: Some("jdoe@acme.test".into()),
        display_name: None,
        role: "admin".into(),
        department: Some("IT".into()),
        last_active_at: None,
    });
    store.insert_login(LoginRecord {
        user_id: "u-42".into(),
        timestamp: midday_yesterday(),
        ip: Some("198.51.100.7".into()),
        country: Some("US".into()),
        success: false,
    });
    store.insert_event(AnalyticsEvent {
        tenant_id: "acme".into(),
        timestamp: Utc::now() - Duration::hours(1),
        source_ip: Some("bad.198.51.100.7".into()),
        dest_ip: Some("10.0.0.4".into()),
        event_type: "firewall".into(),
        action: Some("deny".into()),
        message: "inbound ssh denied".into(),
    });
    store
}

fn alert() -> Alert {
    let mut payload = Map::new();
    payload.insert("username".into(), Value::from("jdoe"));
    payload.insert("file_hash".into(), Value::from("badc0ffee0ddf00d"));
    Alert {
        id: "alert-77".into(),
        tenant_id: "acme".into(),
        title: "Malware beacon".into(),
        observables: vec![Observable {
            kind: "ip".into(),
            value: "bad.198.51.100.7".into(),
        }],
        raw_payload: payload,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_fallback_investigation_with_real_agents() {
    let config = SwarmConfig::default();
    let store = seeded_store();
    let intel = IntelClients::mock(&config.enrichment).unwrap();
    let router = build_router(&intel, &config.agents, store.clone(), store.clone());

    // No JSON anywhere: round 1 falls back, round 2 concludes.
    let llm = Arc::new(MockLlmProvider::with_response("Verdict: malicious."));
    let orchestrator = Orchestrator::new(
        router,
        TaskPlanner::new(llm, &config.investigation),
        ContextRetriever::new(
            store.clone(),
            Arc::new(LocalSimilarityIndex::new()),
            config.context.clone(),
        ),
        store.clone(),
        config.investigation.clone(),
    );

    let report = orchestrator.orchestrate(&alert()).await.unwrap();
    assert_eq!(report.rounds, 2);
    assert_eq!(report.findings.len(), 4);
    assert_eq!(report.failed_findings(), 0);

    let by_agent = |name: &str| {
        report
            .findings
            .iter()
            .filter(|f| f.agent == name)
            .collect::<Vec<_>>()
    };
    assert_eq!(by_agent("network").len(), 2);
    let ip_finding = by_agent("network")
        .into_iter()
        .find(|f| f.data.as_ref().is_some_and(|d| d.get("malicious").is_some()))
        .unwrap();
    assert_eq!(ip_finding.data.as_ref().unwrap()["malicious"], true);

    let logs = by_agent("network")
        .into_iter()
        .find(|f| f.data.as_ref().is_some_and(|d| d.get("eventCount").is_some()))
        .unwrap();
    assert_eq!(logs.data.as_ref().unwrap()["eventCount"], 1);
    assert_eq!(logs.data.as_ref().unwrap()["deniedCount"], 1);

    let file = by_agent("file")[0];
    assert_eq!(file.data.as_ref().unwrap()["malicious"], true);

    let user = by_agent("user")[0];
    // admin +30, failed login +5.
    assert_eq!(user.data.as_ref().unwrap()["risk"]["score"], 35);

    let blob = store.analysis("alert-77").unwrap();
    assert_eq!(blob["investigationStatus"], "completed");
    assert_eq!(blob["swarmFindings"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_mock_results_are_deterministic() {
    let config = EnrichmentConfig::default();
    let abuse = AbuseIpDbClient::with_key(&config.abuseipdb, None).unwrap();
    let vt = VirusTotalClient::with_key(&config.virustotal, None).unwrap();

    let first = abuse.check_ip("203.0.113.50").await.unwrap();
    let second = abuse.check_ip("203.0.113.50").await.unwrap();
    assert_eq!(first, second);
    assert!(first.mock);

    let bad = abuse.check_ip("bad.203.0.113.50").await.unwrap();
    assert!(bad.is_malicious);
    assert!(!first.is_malicious);

    assert_eq!(
        vt.check_hash("deadbeef").await.unwrap(),
        vt.check_hash("deadbeef").await.unwrap()
    );
    // Mock mode never draws from the rate window.
    assert_eq!(vt.client().window().in_window(), 0);
}

#[tokio::test]
async fn test_attempt_counts_against_window_even_when_request_fails() {
    let vt = VirusTotalClient::with_key(&unreachable_provider(1), Some("key".into())).unwrap();

    let first = vt.check_ip("192.0.2.1").await.unwrap_err();
    assert!(matches!(first, EnrichmentError::Http { .. }));
    assert_eq!(vt.client().window().in_window(), 1);

    // File lookups share the same budget.
    let second = vt.check_hash("abc").await.unwrap_err();
    assert!(matches!(
        second,
        EnrichmentError::RateLimitExceeded { capacity: 1, .. }
    ));
}

#[tokio::test]
async fn test_check_ip_tolerates_one_provider_failing() {
    let abuse = AbuseIpDbClient::with_key(&unreachable_provider(10), Some("key".into())).unwrap();
    let vt = VirusTotalClient::with_key(&EnrichmentConfig::default().virustotal, None).unwrap();
    let agent = NetworkAgent::new(
        Arc::new(abuse),
        Arc::new(vt),
        Arc::new(InMemoryStore::new()),
        AgentsConfig::default(),
    );

    let task = AgentTask::new("check_ip", TaskPriority::High).with_param("ip", "bad.example");
    let result = agent.process(&task).await;
    assert!(result.is_success());
    let data = result.data.unwrap();
    assert_eq!(data["malicious"], true);
    assert!(data["abuseipdb"]["error"].is_string());
    assert_eq!(data["flaggedBy"][0], "VirusTotal");
}

fn keyed_alert(id: &str, ip: &str) -> Alert {
    let mut payload = Map::new();
    payload.insert("file_hash".into(), Value::from("0123456789abcdef"));
    Alert {
        id: id.into(),
        tenant_id: "acme".into(),
        title: "Outbound beacon".into(),
        observables: vec![Observable {
            kind: "ip".into(),
            value: ip.into(),
        }],
        raw_payload: payload,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_concurrent_investigations_share_one_rate_window() {
    let config = SwarmConfig::default();
    let enrichment = EnrichmentConfig {
        abuseipdb: unreachable_provider(2),
        virustotal: unreachable_provider(3),
    };
    let intel = IntelClients {
        abuseipdb: Arc::new(
            AbuseIpDbClient::with_key(&enrichment.abuseipdb, Some("key".into())).unwrap(),
        ),
        virustotal: Arc::new(
            VirusTotalClient::with_key(&enrichment.virustotal, Some("key".into())).unwrap(),
        ),
    };
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = || {
        Orchestrator::new(
            build_router(&intel, &config.agents, store.clone(), store.clone()),
            TaskPlanner::new(
                Arc::new(MockLlmProvider::with_response("Inconclusive.")),
                &config.investigation,
            ),
            ContextRetriever::new(
                store.clone(),
                Arc::new(LocalSimilarityIndex::new()),
                config.context.clone(),
            ),
            store.clone(),
            config.investigation.clone(),
        )
    };
    let (first, second) = (orchestrator(), orchestrator());
    let (alert_a, alert_b) = (
        keyed_alert("alert-a", "192.0.2.10"),
        keyed_alert("alert-b", "192.0.2.11"),
    );

    // Each investigation wants 2 VirusTotal and 1 AbuseIPDB request.
    let (a, b) = tokio::join!(first.orchestrate(&alert_a), second.orchestrate(&alert_b));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(intel.virustotal.client().window().in_window(), 3);
    assert_eq!(intel.abuseipdb.client().window().in_window(), 2);

    let rejected = |provider: &str| {
        a.findings
            .iter()
            .chain(&b.findings)
            .filter_map(|f| f.error.as_deref())
            .filter(|e| e.contains(&format!("Rate limit exceeded for {}", provider)))
            .count()
    };
    assert_eq!(rejected("virustotal"), 1);
    assert_eq!(rejected("abuseipdb"), 0);
    assert_eq!(a.findings.len() + b.findings.len(), 6);
}

proptest! {
    #[test]
    fn mock_verdict_follows_bad_rule(prefix in "[a-z0-9.]{0,10}", suffix in "[a-z0-9.]{0,10}") {
        let clean = format!("{}{}", prefix, suffix);
        prop_assume!(!clean.contains("bad"));
        let flagged = format!("{}bad{}", prefix, suffix);

        let rep = alertswarm_security::intel::abuseipdb::mock_reputation(&clean);
        prop_assert!(!rep.is_malicious);
        prop_assert!(rep.abuse_confidence_score < 50);
        prop_assert!(alertswarm_security::intel::abuseipdb::mock_reputation(&flagged).is_malicious);
    }
}
