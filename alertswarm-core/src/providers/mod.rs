//! LLM provider implementations and the shared enrichment rate window.
//!
//! Use `create_provider()` to instantiate the LLM provider named in config.

pub mod offline;
pub mod openai_compat;
pub mod rate_limiter;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub use crate::config::RetryConfig;
pub use offline::OfflineProvider;
pub use openai_compat::OpenAiCompatibleProvider;
pub use rate_limiter::RateWindow;

/// Exponent ceiling; keeps `powi` finite for absurd retry counts.
const MAX_EXPONENT: u32 = 16;

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// Only transient errors (see [`is_transient`]) are retried. A rate-limit
/// response waits at least as long as the provider asked.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_transient(&err) || attempt >= config.max_retries {
            return Err(err);
        }

        let delay = delay_for(config, attempt, &err);
        warn!(
            attempt = attempt + 1,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "LLM call failed, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Rate limits, dropped connections, and timeouts.
pub fn is_transient(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
    )
}

fn delay_for(config: &RetryConfig, attempt: u32, err: &LlmError) -> Duration {
    let scheduled = scheduled_delay(config, attempt);
    match err {
        LlmError::RateLimited { retry_after_secs } => {
            scheduled.max(Duration::from_secs(*retry_after_secs))
        }
        _ => scheduled,
    }
}

/// `initial * multiplier^attempt`, capped, plus up to 25% jitter when enabled.
fn scheduled_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let growth = config
        .backoff_multiplier
        .powi(attempt.min(MAX_EXPONENT) as i32);
    let mut ms = (config.initial_backoff_ms as f64 * growth).min(config.max_backoff_ms as f64);
    if config.jitter {
        ms *= 1.0 + 0.25 * jitter_fraction();
    }
    Duration::from_millis(ms as u64)
}

/// Fraction in [0, 1) from a freshly keyed std hasher.
fn jitter_fraction() -> f64 {
    let bits = RandomState::new().build_hasher().finish();
    (bits % 1024) as f64 / 1024.0
}

/// Create an LLM provider based on the configuration.
///
/// `"mock"` yields an [`OfflineProvider`], which drives the deterministic
/// fallback path without any network access.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(OfflineProvider)),
        _ => Ok(Arc::new(OpenAiCompatibleProvider::new(config)?)),
    }
}
