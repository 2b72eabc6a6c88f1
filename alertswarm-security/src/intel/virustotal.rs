//! VirusTotal IP and file-hash lookups.
//!
//! IP and file lookups go through one client and so draw from one rate window.

use super::{EnrichmentClient, mock_is_malicious, mock_seed};
use alertswarm_core::config::ProviderConfig;
use alertswarm_core::error::EnrichmentError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROVIDER: &str = "virustotal";

/// Engines that must flag a resource before VirusTotal's verdict is malicious.
pub const MALICIOUS_ENGINES: u64 = 3;

/// What kind of resource was looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VtResource {
    Ip,
    File,
}

impl VtResource {
    fn path(&self, value: &str) -> String {
        match self {
            VtResource::Ip => format!("ip_addresses/{}", value),
            VtResource::File => format!("files/{}", value),
        }
    }
}

/// `last_analysis_stats` from a VirusTotal object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    #[serde(default)]
    pub malicious: u64,
    #[serde(default)]
    pub suspicious: u64,
    #[serde(default)]
    pub harmless: u64,
    #[serde(default)]
    pub undetected: u64,
}

impl AnalysisStats {
    pub fn total(&self) -> u64 {
        self.malicious + self.suspicious + self.harmless + self.undetected
    }

    /// Fraction of engines reporting malicious (0.0 when nothing was scanned).
    pub fn detection_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.malicious as f64 / total as f64,
        }
    }
}

/// One VirusTotal lookup result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VtReport {
    pub resource: String,
    pub kind: VtResource,
    /// False when VirusTotal has never seen the resource.
    pub found: bool,
    pub stats: AnalysisStats,
    pub detection_ratio: f64,
    pub reputation: Option<i64>,
    /// File name (files) or AS owner (IPs), when reported.
    pub label: Option<String>,
    pub is_malicious: bool,
    pub mock: bool,
}

impl VtReport {
    fn not_found(resource: &str, kind: VtResource) -> Self {
        Self {
            resource: resource.to_string(),
            kind,
            found: false,
            stats: AnalysisStats::default(),
            detection_ratio: 0.0,
            reputation: None,
            label: None,
            is_malicious: false,
            mock: false,
        }
    }

    /// "malicious/total" detection summary.
    pub fn detections(&self) -> String {
        format!("{}/{}", self.stats.malicious, self.stats.total())
    }
}

pub struct VirusTotalClient {
    client: EnrichmentClient,
}

impl VirusTotalClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: EnrichmentClient::new(PROVIDER, "x-apikey", config)?,
        })
    }

    pub fn with_key(config: &ProviderConfig, api_key: Option<String>) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: EnrichmentClient::with_key(PROVIDER, "x-apikey", config, api_key)?,
        })
    }

    pub fn client(&self) -> &EnrichmentClient {
        &self.client
    }

    pub async fn check_ip(&self, ip: &str) -> Result<VtReport, EnrichmentError> {
        self.lookup(VtResource::Ip, ip).await
    }

    pub async fn check_hash(&self, hash: &str) -> Result<VtReport, EnrichmentError> {
        self.lookup(VtResource::File, hash).await
    }

    async fn lookup(&self, kind: VtResource, value: &str) -> Result<VtReport, EnrichmentError> {
        if self.client.is_mock() {
            return Ok(mock_report(kind, value));
        }
        match self.client.get_json(&kind.path(value), &[]).await? {
            Some(body) => parse_report(kind, value, &body),
            None => Ok(VtReport::not_found(value, kind)),
        }
    }
}

fn parse_report(kind: VtResource, value: &str, body: &Value) -> Result<VtReport, EnrichmentError> {
    let attributes = body
        .get("data")
        .and_then(|d| d.get("attributes"))
        .ok_or_else(|| EnrichmentError::Parse {
            provider: PROVIDER.to_string(),
            message: "missing 'data.attributes'".to_string(),
        })?;
    let stats: AnalysisStats = attributes
        .get("last_analysis_stats")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| EnrichmentError::Parse {
            provider: PROVIDER.to_string(),
            message: format!("bad last_analysis_stats: {}", e),
        })?
        .unwrap_or_default();
    let label_key = match kind {
        VtResource::Ip => "as_owner",
        VtResource::File => "meaningful_name",
    };
    Ok(VtReport {
        resource: value.to_string(),
        kind,
        found: true,
        detection_ratio: stats.detection_ratio(),
        reputation: attributes.get("reputation").and_then(Value::as_i64),
        label: attributes
            .get(label_key)
            .and_then(Value::as_str)
            .map(String::from),
        is_malicious: stats.malicious >= MALICIOUS_ENGINES,
        stats,
        mock: false,
    })
}

/// Deterministic report derived from the looked-up value.
pub fn mock_report(kind: VtResource, value: &str) -> VtReport {
    let seed = mock_seed(value);
    let malicious = mock_is_malicious(value);
    let stats = if malicious {
        AnalysisStats {
            malicious: 40 + u64::from(seed[0] % 20),
            suspicious: u64::from(seed[1] % 5),
            harmless: u64::from(seed[2] % 5),
            undetected: 10 + u64::from(seed[3] % 10),
        }
    } else {
        AnalysisStats {
            malicious: 0,
            suspicious: 0,
            harmless: 55 + u64::from(seed[2] % 15),
            undetected: 10 + u64::from(seed[3] % 10),
        }
    };
    let label = match kind {
        VtResource::Ip => "Mock Transit Ltd",
        VtResource::File => "sample.bin",
    };
    VtReport {
        resource: value.to_string(),
        kind,
        found: true,
        detection_ratio: stats.detection_ratio(),
        reputation: Some(if malicious { -50 } else { i64::from(seed[4] % 10) }),
        label: Some(label.to_string()),
        is_malicious: malicious,
        stats,
        mock: true,
    }
}
