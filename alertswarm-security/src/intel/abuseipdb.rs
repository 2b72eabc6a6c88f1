//! AbuseIPDB IP reputation lookups.

use super::{EnrichmentClient, mock_is_malicious, mock_seed};
use alertswarm_core::config::ProviderConfig;
use alertswarm_core::error::EnrichmentError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROVIDER: &str = "abuseipdb";

/// Confidence score at or above which an IP is treated as malicious.
pub const MALICIOUS_SCORE: u8 = 50;

const MAX_AGE_DAYS: &str = "90";
const MOCK_COUNTRIES: [&str; 6] = ["US", "DE", "NL", "SG", "BR", "RU"];

/// Reputation of one IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpReputation {
    pub ip: String,
    pub abuse_confidence_score: u8,
    pub country_code: Option<String>,
    pub isp: Option<String>,
    pub total_reports: u64,
    pub is_malicious: bool,
    /// Produced by mock mode rather than the live API.
    pub mock: bool,
}

pub struct AbuseIpDbClient {
    client: EnrichmentClient,
}

impl AbuseIpDbClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: EnrichmentClient::new(PROVIDER, "Key", config)?,
        })
    }

    pub fn with_key(config: &ProviderConfig, api_key: Option<String>) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: EnrichmentClient::with_key(PROVIDER, "Key", config, api_key)?,
        })
    }

    pub fn client(&self) -> &EnrichmentClient {
        &self.client
    }

    pub async fn check_ip(&self, ip: &str) -> Result<IpReputation, EnrichmentError> {
        if self.client.is_mock() {
            return Ok(mock_reputation(ip));
        }
        let body = self
            .client
            .get_json("check", &[("ipAddress", ip), ("maxAgeInDays", MAX_AGE_DAYS)])
            .await?;
        reputation_from(ip, body)
    }
}

/// A 404 (`None`) means AbuseIPDB holds no record for the address.
fn reputation_from(ip: &str, body: Option<Value>) -> Result<IpReputation, EnrichmentError> {
    match body {
        Some(body) => parse_reputation(ip, &body),
        None => Err(EnrichmentError::NotFound {
            provider: PROVIDER.to_string(),
            subject: ip.to_string(),
        }),
    }
}

fn parse_reputation(ip: &str, body: &Value) -> Result<IpReputation, EnrichmentError> {
    let data = body.get("data").ok_or_else(|| EnrichmentError::Parse {
        provider: PROVIDER.to_string(),
        message: "missing 'data' object".to_string(),
    })?;
    let score = data
        .get("abuseConfidenceScore")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        .min(100) as u8;
    let text = |key: &str| data.get(key).and_then(Value::as_str).map(String::from);
    Ok(IpReputation {
        ip: text("ipAddress").unwrap_or_else(|| ip.to_string()),
        abuse_confidence_score: score,
        country_code: text("countryCode"),
        isp: text("isp"),
        total_reports: data.get("totalReports").and_then(Value::as_u64).unwrap_or(0),
        is_malicious: score >= MALICIOUS_SCORE,
        mock: false,
    })
}

/// Deterministic reputation derived from the IP string.
pub fn mock_reputation(ip: &str) -> IpReputation {
    let seed = mock_seed(ip);
    let malicious = mock_is_malicious(ip);
    let score = if malicious { 100 } else { seed[0] % MALICIOUS_SCORE };
    let total_reports = if malicious {
        25 + u64::from(seed[1] % 75)
    } else {
        u64::from(seed[1] % 4)
    };
    IpReputation {
        ip: ip.to_string(),
        abuse_confidence_score: score,
        country_code: Some(MOCK_COUNTRIES[seed[2] as usize % MOCK_COUNTRIES.len()].to_string()),
        isp: Some("Mock Transit Ltd".to_string()),
        total_reports,
        is_malicious: malicious,
        mock: true,
    }
}
