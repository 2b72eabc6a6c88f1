//! Alertswarm Security — threat-intel enrichment and specialist agents.
//!
//! - **Enrichment clients** (`intel`): AbuseIPDB and VirusTotal lookups behind
//!   a shared sliding-window rate budget, with deterministic mock results when
//!   no credential is configured
//! - **Specialist agents** (`agents`): network (`check_ip`, `query_logs`),
//!   file (`check_hash`), and user (`check_user`) investigations

pub mod agents;
pub mod intel;

pub use agents::{FileAgent, IntelClients, NetworkAgent, UserAgent, build_router};
pub use intel::{AbuseIpDbClient, EnrichmentClient, VirusTotalClient};
