//! Engine configuration
//!
//! Defines timeouts, retry policy and breaker thresholds, plus the
//! collaborator endpoints the engine talks to.

use std::time::Duration;

use crate::resilience::{BreakerConfig, RetryOptions};

/// Engine configuration
///
/// All timeouts and retry knobs are configurable to allow tuning
/// for different deployment scenarios.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Account platform base URL (credentials, connectors, environments)
    pub platform_api_url: String,

    /// Optional bearer token for the account platform
    pub platform_api_token: Option<String>,

    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,

    /// Upper bound on a single stage handler
    pub stage_timeout: Duration,

    /// Retry policy for every collaborator and tool call
    pub retry: RetryOptions,

    /// Thresholds shared by every circuit breaker
    pub breaker: BreakerConfig,

    /// Source control REST API base URL
    pub source_control_api_url: String,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    pub fn new(platform_api_url: String) -> Self {
        Self {
            platform_api_url,
            platform_api_token: None,
            http_timeout: Duration::from_secs(30),
            stage_timeout: Duration::from_secs(60),
            retry: RetryOptions::default(),
            breaker: BreakerConfig::default(),
            source_control_api_url: "https://api.github.com".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - PLATFORM_API_URL (required)
    /// - PLATFORM_API_TOKEN (optional)
    /// - HTTP_TIMEOUT_SECS (optional, default: 30)
    /// - STAGE_TIMEOUT_SECS (optional, default: 60)
    /// - RETRY_MAX_ATTEMPTS (optional, default: 3)
    /// - RETRY_BASE_DELAY_MS (optional, default: 1000)
    /// - RETRY_MAX_DELAY_MS (optional, default: 30000)
    /// - RETRY_JITTER_FACTOR (optional, default: 0.2)
    /// - BREAKER_FAILURE_THRESHOLD (optional, default: 5)
    /// - BREAKER_RESET_TIMEOUT_SECS (optional, default: 30)
    /// - SOURCE_CONTROL_API_URL (optional, default: https://api.github.com)
    pub fn from_env() -> anyhow::Result<Self> {
        let platform_api_url = std::env::var("PLATFORM_API_URL")
            .map_err(|_| anyhow::anyhow!("PLATFORM_API_URL environment variable not set"))?;

        let mut config = Self::new(platform_api_url);

        config.platform_api_token = std::env::var("PLATFORM_API_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty());

        if let Some(secs) = env_parse::<u64>("HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("STAGE_TIMEOUT_SECS") {
            config.stage_timeout = Duration::from_secs(secs);
        }

        if let Some(attempts) = env_parse::<u32>("RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts;
        }

        if let Some(ms) = env_parse::<u64>("RETRY_BASE_DELAY_MS") {
            config.retry.base_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse::<u64>("RETRY_MAX_DELAY_MS") {
            config.retry.max_delay = Duration::from_millis(ms);
        }

        if let Some(factor) = env_parse::<f64>("RETRY_JITTER_FACTOR") {
            config.retry.jitter_factor = factor;
        }

        if let Some(threshold) = env_parse::<u32>("BREAKER_FAILURE_THRESHOLD") {
            config.breaker.failure_threshold = threshold;
        }

        if let Some(secs) = env_parse::<u64>("BREAKER_RESET_TIMEOUT_SECS") {
            config.breaker.reset_timeout = Duration::from_secs(secs);
        }

        if let Ok(url) = std::env::var("SOURCE_CONTROL_API_URL") {
            config.source_control_api_url = url;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [
            ("platform_api_url", &self.platform_api_url),
            ("source_control_api_url", &self.source_control_api_url),
        ] {
            if url.is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }

            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.http_timeout.is_zero() {
            anyhow::bail!("http_timeout must be greater than 0");
        }

        if self.stage_timeout.is_zero() {
            anyhow::bail!("stage_timeout must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry max_attempts must be at least 1");
        }

        if self.retry.base_delay > self.retry.max_delay {
            anyhow::bail!("retry base_delay cannot exceed max_delay");
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            anyhow::bail!("retry jitter_factor must be between 0 and 1");
        }

        if self.breaker.failure_threshold == 0 {
            anyhow::bail!("breaker failure_threshold must be greater than 0");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("http://localhost:9000".to_string())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}
