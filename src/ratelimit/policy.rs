//! Rate limit policies and per-request policy resolution.
//!
//! A process has one default policy and an ordered list of endpoint
//! policies. Resolution scans the endpoint list in order and the first
//! match wins; requests matching no endpoint share the default policy's
//! counter bucket.

use serde::{Deserialize, Serialize};

use super::matcher::EndpointMatcher;
use crate::error::{Result, TurnstileError};

/// Logical path used for counter keys when the default policy applies.
pub const DEFAULT_POLICY_PATH: &str = "__default__";

/// A fixed-window limit: at most `max_requests` per `window_ms`.
///
/// Missing fields take the default values, so a partial override such as a
/// single environment variable still yields a complete policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per window
    pub max_requests: u64,
}

impl RateLimitPolicy {
    /// Create a policy. Call [`validate`](Self::validate) before serving.
    pub fn new(window_ms: u64, max_requests: u64) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    /// Reject zero windows and zero limits.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TurnstileError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(TurnstileError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 100,
        }
    }
}

/// A policy override bound to one endpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPolicy {
    /// Path matched against the request path
    #[serde(alias = "endpoint")]
    pub path: String,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per window
    pub max_requests: u64,
}

impl EndpointPolicy {
    /// Create an endpoint policy.
    pub fn new(path: impl Into<String>, window_ms: u64, max_requests: u64) -> Self {
        Self {
            path: path.into(),
            window_ms,
            max_requests,
        }
    }

    /// The limit this endpoint applies.
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(self.window_ms, self.max_requests)
    }
}

/// The policy chosen for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPolicy<'a> {
    /// Path used in the counter key: the configured endpoint path, or
    /// [`DEFAULT_POLICY_PATH`]
    pub key_path: &'a str,
    /// The limit to enforce
    pub policy: RateLimitPolicy,
}

impl ResolvedPolicy<'_> {
    /// Whether the default policy was selected.
    pub fn is_default(&self) -> bool {
        self.key_path == DEFAULT_POLICY_PATH
    }
}

/// The full, read-only set of policies for a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    default: RateLimitPolicy,
    endpoints: Vec<EndpointPolicy>,
}

impl PolicySet {
    /// Create a policy set. Endpoint order is resolution order.
    pub fn new(default: RateLimitPolicy, endpoints: Vec<EndpointPolicy>) -> Self {
        Self { default, endpoints }
    }

    /// Check every policy for zero values and every endpoint path.
    ///
    /// Endpoint paths must be non-empty and must differ from
    /// [`DEFAULT_POLICY_PATH`], which names the default bucket.
    pub fn validate(&self) -> Result<()> {
        self.default
            .validate()
            .map_err(|e| TurnstileError::Config(format!("default policy: {}", e)))?;

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.path.is_empty() {
                return Err(TurnstileError::Config(format!(
                    "endpoint policy #{} has an empty path",
                    index
                )));
            }
            if endpoint.path == DEFAULT_POLICY_PATH {
                return Err(TurnstileError::Config(format!(
                    "endpoint policy #{} uses the reserved path {}",
                    index, DEFAULT_POLICY_PATH
                )));
            }
            endpoint.policy().validate().map_err(|e| {
                TurnstileError::Config(format!("endpoint policy {}: {}", endpoint.path, e))
            })?;
        }
        Ok(())
    }

    /// Pick the policy for `request_path`.
    pub fn resolve<'a>(
        &'a self,
        request_path: &str,
        matcher: &dyn EndpointMatcher,
    ) -> ResolvedPolicy<'a> {
        self.endpoints
            .iter()
            .find(|endpoint| matcher.matches(request_path, &endpoint.path))
            .map(|endpoint| ResolvedPolicy {
                key_path: &endpoint.path,
                policy: endpoint.policy(),
            })
            .unwrap_or(ResolvedPolicy {
                key_path: DEFAULT_POLICY_PATH,
                policy: self.default,
            })
    }

    /// The longest window across all policies.
    pub fn max_window_ms(&self) -> u64 {
        self.endpoints
            .iter()
            .map(|endpoint| endpoint.window_ms)
            .fold(self.default.window_ms, u64::max)
    }
}
