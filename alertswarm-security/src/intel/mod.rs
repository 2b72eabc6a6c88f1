//! Threat-intel enrichment clients.
//!
//! Every provider shares one pattern: a process-wide [`RateWindow`] consulted
//! before each network call, and a deterministic mock mode used when no
//! credential is configured. Mock results have the same shape as real ones.

pub mod abuseipdb;
pub mod virustotal;

pub use abuseipdb::{AbuseIpDbClient, IpReputation};
pub use virustotal::{AnalysisStats, VirusTotalClient, VtReport, VtResource};

use alertswarm_core::config::ProviderConfig;
use alertswarm_core::error::EnrichmentError;
use alertswarm_core::providers::RateWindow;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// HTTP plumbing shared by the provider clients.
pub struct EnrichmentClient {
    provider: &'static str,
    http: Client,
    base_url: String,
    auth_header: &'static str,
    api_key: Option<String>,
    window: RateWindow,
}

impl EnrichmentClient {
    /// Build a client; the API key is resolved from config or the environment.
    pub fn new(
        provider: &'static str,
        auth_header: &'static str,
        config: &ProviderConfig,
    ) -> Result<Self, EnrichmentError> {
        Self::with_key(provider, auth_header, config, config.resolve_api_key())
    }

    pub fn with_key(
        provider: &'static str,
        auth_header: &'static str,
        config: &ProviderConfig,
        api_key: Option<String>,
    ) -> Result<Self, EnrichmentError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EnrichmentError::Http {
                provider: provider.to_string(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        if api_key.is_none() {
            debug!(provider, "No credential configured; using mock results");
        }
        Ok(Self {
            provider,
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header,
            api_key,
            window: RateWindow::new(provider, config.capacity, config.window()),
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// True when no credential is configured.
    pub fn is_mock(&self) -> bool {
        self.api_key.is_none()
    }

    pub fn window(&self) -> &RateWindow {
        &self.window
    }

    /// Admit one request through the rate window, then GET `path`.
    ///
    /// `Ok(None)` means the provider has no record (HTTP 404).
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<Value>, EnrichmentError> {
        let Some(api_key) = &self.api_key else {
            return Err(EnrichmentError::Http {
                provider: self.provider.to_string(),
                message: "no credential configured".to_string(),
            });
        };
        self.window.try_admit()?;

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(provider = self.provider, url = %url, "Enrichment request");
        let response = self
            .http
            .get(&url)
            .query(query)
            .header(self.auth_header, api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(EnrichmentError::Status {
                provider: self.provider.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| EnrichmentError::Parse {
                provider: self.provider.to_string(),
                message: format!("Invalid JSON: {}", e),
            })
    }

    fn transport_error(&self, err: reqwest::Error) -> EnrichmentError {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        EnrichmentError::Http {
            provider: self.provider.to_string(),
            message,
        }
    }
}

/// SHA-256 of the lookup value; seeds every mock field.
pub fn mock_seed(input: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input.trim().to_lowercase().as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());
    seed
}

/// Mock verdict rule: any value containing "bad" is malicious.
pub fn mock_is_malicious(input: &str) -> bool {
    input.to_lowercase().contains("bad")
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> ProviderConfig {
        ProviderConfig {
            api_key_env: "ALERTSWARM_TEST_UNSET_KEY".into(),
            api_key: None,
            base_url: "https://intel.example.invalid/api/".into(),
            capacity: 2,
            window_secs: 60,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_mock_mode_without_key() {
        let client = EnrichmentClient::new("test", "Key", &unconfigured()).unwrap();
        assert!(client.is_mock());
        assert_eq!(client.base_url, "https://intel.example.invalid/api");
        assert_eq!(client.window().capacity(), 2);
    }

    #[tokio::test]
    async fn test_get_json_requires_credential() {
        let client = EnrichmentClient::new("test", "Key", &unconfigured()).unwrap();
        let err = client.get_json("check", &[]).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Http { .. }));
        assert_eq!(client.window().in_window(), 0);
    }

    #[tokio::test]
    async fn test_full_window_fails_before_network() {
        let mut config = unconfigured();
        config.capacity = 1;
        let client =
            EnrichmentClient::with_key("test", "Key", &config, Some("k".into())).unwrap();
        client.window().admit();
        let err = client.get_json("check", &[("ipAddress", "1.2.3.4")]).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::RateLimitExceeded { .. }));
    }

    #[test]
    fn test_mock_seed_is_stable_and_case_insensitive() {
        assert_eq!(mock_seed("1.2.3.4"), mock_seed("1.2.3.4"));
        assert_eq!(mock_seed("ABC"), mock_seed("abc"));
        assert_ne!(mock_seed("1.2.3.4"), mock_seed("1.2.3.5"));
    }

    #[test]
    fn test_mock_rule() {
        assert!(mock_is_malicious("bad.example.com"));
        assert!(mock_is_malicious("BADC0FFEE"));
        assert!(!mock_is_malicious("8.8.8.8"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
