//! Configuration management for Turnstile.
//!
//! Configuration is loaded once at startup and validated before the limiter
//! serves any request. Zero windows or limits are rejected here rather than
//! tolerated at decision time.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{EndpointPolicy, PolicySet, RateLimitPolicy};

/// Environment variable prefix, e.g. `TURNSTILE__RATE_LIMITING__ENABLED`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// When false every request is admitted without touching any counter
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Policy for requests matching no endpoint
    #[serde(default)]
    pub default_policy: RateLimitPolicy,

    /// Per-endpoint overrides, first match wins
    #[serde(default)]
    pub endpoints: Vec<EndpointPolicy>,

    /// Interval of the periodic maintenance sweep in seconds, 0 disables it
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_policy: RateLimitPolicy::default(),
            endpoints: Vec::new(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// The configured policies in resolution order.
    pub fn policy_set(&self) -> PolicySet {
        PolicySet::new(self.default_policy, self.endpoints.clone())
    }

    /// The periodic sweep interval, if enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Reject invalid policies.
    pub fn validate(&self) -> Result<()> {
        self.policy_set().validate()
    }
}

impl TurnstileConfig {
    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file overlaid with
    /// `TURNSTILE__<SECTION>__<FIELD>` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: TurnstileConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()
    }
}
