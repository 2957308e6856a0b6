//! Admission decisions for incoming requests.

use std::sync::Arc;
use tracing::{debug, trace};

use super::algorithm::{FixedWindowAlgorithm, RateLimitAlgorithm};
use super::clock::Clock;
use super::matcher::{EndpointMatcher, ExactPathMatcher};
use super::policy::PolicySet;
use super::store::CounterStore;
use super::sweeper::SweepHandle;
use crate::config::RateLimitingConfig;

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed
    Admit,
    /// The client exceeded its limit; the host should answer 429
    Reject,
}

impl Decision {
    /// Whether the request must be rejected.
    pub fn is_reject(&self) -> bool {
        matches!(self, Decision::Reject)
    }
}

/// The admission-control entry point invoked once per request.
///
/// Resolves the applicable policy for the request path, counts the request
/// with the algorithm and reports the decision. All state lives in the
/// counter store behind the algorithm, so a `RateLimiter` is shared across
/// request tasks behind an `Arc`.
pub struct RateLimiter {
    enabled: bool,
    policies: PolicySet,
    algorithm: Arc<dyn RateLimitAlgorithm>,
    matcher: Arc<dyn EndpointMatcher>,
}

impl RateLimiter {
    /// Create a rate limiter from validated configuration.
    pub fn new(
        config: &RateLimitingConfig,
        algorithm: Arc<dyn RateLimitAlgorithm>,
        matcher: Arc<dyn EndpointMatcher>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            policies: config.policy_set(),
            algorithm,
            matcher,
        }
    }

    /// Create a rate limiter using fixed-window counting over `store` and
    /// exact path matching.
    pub fn with_store(
        config: &RateLimitingConfig,
        store: Arc<dyn CounterStore>,
        sweeps: SweepHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let algorithm = FixedWindowAlgorithm::new(store, sweeps, clock);
        Self::new(config, Arc::new(algorithm), Arc::new(ExactPathMatcher))
    }

    /// Whether rate limiting is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Decide whether a request from `identity` to `request_path` may proceed.
    ///
    /// Always produces a decision. When disabled, admits without counting.
    pub fn decide(&self, identity: &str, request_path: &str) -> Decision {
        if !self.enabled {
            return Decision::Admit;
        }

        let resolved = self.policies.resolve(request_path, self.matcher.as_ref());

        trace!(
            identity = %identity,
            path = %request_path,
            policy_path = %resolved.key_path,
            default_policy = resolved.is_default(),
            "Evaluating request"
        );

        if self
            .algorithm
            .should_reject(identity, resolved.key_path, resolved.policy)
        {
            debug!(
                identity = %identity,
                path = %request_path,
                policy_path = %resolved.key_path,
                window_ms = resolved.policy.window_ms,
                limit = resolved.policy.max_requests,
                "Rate limit exceeded"
            );
            Decision::Reject
        } else {
            Decision::Admit
        }
    }
}
