//! Configuration system for Alertswarm.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/alertswarm/config.toml` and/or
//! `.alertswarm/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for Alertswarm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub investigation: InvestigationConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// LLM provider configuration used by the planner and synthesis steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" or "mock".
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key; takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry policy for transient provider errors.
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 2048,
            temperature: 0.2,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings for LLM calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Round loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationConfig {
    /// Maximum number of plan/dispatch/collect rounds.
    pub max_rounds: u32,
    /// Upper bound for a single specialist task.
    pub task_timeout_secs: u64,
    /// Upper bound for a single planner call.
    pub planner_timeout_secs: u64,
    /// Upper bound for a single status notification.
    pub notify_timeout_secs: u64,
    /// Objective handed to the planner in round 1.
    pub objective: String,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            task_timeout_secs: 30,
            planner_timeout_secs: 60,
            notify_timeout_secs: 5,
            objective: "Determine whether this alert represents malicious activity, \
                        identify the affected entities, and recommend next steps."
                .to_string(),
        }
    }
}

impl InvestigationConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn planner_timeout(&self) -> Duration {
        Duration::from_secs(self.planner_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

/// Historical context retrieval limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum merged items returned.
    pub max_items: usize,
    /// Candidate case references fetched by the keyword strategy.
    pub keyword_reference_limit: usize,
    /// Resolved cases kept by the keyword strategy.
    pub keyword_case_limit: usize,
    /// Nearest neighbours requested from similarity search.
    pub semantic_k: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_items: 5,
            keyword_reference_limit: 10,
            keyword_case_limit: 3,
            semantic_k: 3,
        }
    }
}

/// Per-provider enrichment settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Explicit API key; takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL of the provider API.
    pub base_url: String,
    /// Requests admitted per window.
    pub capacity: usize,
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Resolve the credential: explicit key first, then the environment.
    ///
    /// `None` puts the client into deterministic mock mode.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Threat-intel provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub abuseipdb: ProviderConfig,
    pub virustotal: ProviderConfig,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            abuseipdb: ProviderConfig {
                api_key_env: "ABUSEIPDB_API_KEY".to_string(),
                api_key: None,
                base_url: "https://api.abuseipdb.com/api/v2".to_string(),
                capacity: 1000,
                window_secs: 86_400,
                timeout_secs: 15,
            },
            virustotal: ProviderConfig {
                api_key_env: "VIRUSTOTAL_API_KEY".to_string(),
                api_key: None,
                base_url: "https://www.virustotal.com/api/v3".to_string(),
                capacity: 4,
                window_secs: 60,
                timeout_secs: 15,
            },
        }
    }
}

/// Specialist agent defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Default look-back for `query_logs`.
    pub query_logs_hours: u64,
    /// Maximum rows returned by `query_logs`.
    pub query_logs_limit: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            query_logs_hours: 24,
            query_logs_limit: 100,
        }
    }
}

/// Load configuration from all sources with layered merging.
///
/// Order (later wins): defaults, user config, workspace config,
/// `ALERTSWARM_` environment variables, explicit overrides.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&SwarmConfig>,
) -> Result<SwarmConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(SwarmConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "alertswarm", "alertswarm") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".alertswarm").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (ALERTSWARM_INVESTIGATION__MAX_ROUNDS, ...)
    figment = figment.merge(Env::prefixed("ALERTSWARM_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load configuration from a single explicit TOML file layered over defaults.
pub fn load_config_file(path: &Path) -> Result<SwarmConfig, Box<figment::Error>> {
    Figment::from(Serialized::defaults(SwarmConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ALERTSWARM_").split("__"))
        .extract()
        .map_err(Box::new)
}
