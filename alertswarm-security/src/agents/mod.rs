//! Specialist agents: network, file, and user investigations.

pub mod file;
pub mod network;
pub mod user;

pub use file::{FileAgent, FileTask};
pub use network::{NetworkAgent, NetworkTask};
pub use user::{RiskAssessment, RiskLevel, UserAgent, UserTask, assess_risk};

use crate::intel::{AbuseIpDbClient, VirusTotalClient};
use alertswarm_core::config::{AgentsConfig, EnrichmentConfig};
use alertswarm_core::error::EnrichmentError;
use alertswarm_core::multi::AgentRouter;
use alertswarm_core::store::{AnalyticsStore, UserDirectory};
use std::sync::Arc;

/// Enrichment clients shared by every agent and every investigation.
///
/// Build once per process so each provider keeps a single rate window.
#[derive(Clone)]
pub struct IntelClients {
    pub abuseipdb: Arc<AbuseIpDbClient>,
    pub virustotal: Arc<VirusTotalClient>,
}

impl IntelClients {
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        Ok(Self {
            abuseipdb: Arc::new(AbuseIpDbClient::new(&config.abuseipdb)?),
            virustotal: Arc::new(VirusTotalClient::new(&config.virustotal)?),
        })
    }

    /// Clients that never touch the network.
    pub fn mock(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        Ok(Self {
            abuseipdb: Arc::new(AbuseIpDbClient::with_key(&config.abuseipdb, None)?),
            virustotal: Arc::new(VirusTotalClient::with_key(&config.virustotal, None)?),
        })
    }
}

/// Router with the network, file, and user agents registered.
pub fn build_router(
    intel: &IntelClients,
    agents: &AgentsConfig,
    analytics: Arc<dyn AnalyticsStore>,
    directory: Arc<dyn UserDirectory>,
) -> AgentRouter {
    AgentRouter::new()
        .with_agent(Arc::new(NetworkAgent::new(
            intel.abuseipdb.clone(),
            intel.virustotal.clone(),
            analytics,
            agents.clone(),
        )))
        .with_agent(Arc::new(FileAgent::new(intel.virustotal.clone())))
        .with_agent(Arc::new(UserAgent::new(directory)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertswarm_core::store::InMemoryStore;

    #[test]
    fn test_router_covers_all_task_types() {
        let intel = IntelClients::mock(&EnrichmentConfig::default()).unwrap();
        let store = Arc::new(InMemoryStore::new());
        let router = build_router(&intel, &AgentsConfig::default(), store.clone(), store);
        assert_eq!(
            router.task_types(),
            ["check_ip", "query_logs", "check_hash", "check_user"]
        );
        assert!(intel.virustotal.client().is_mock());
    }
}
