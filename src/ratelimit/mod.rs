//! Rate limiting logic and state management.
//!
//! The pieces are capabilities with one default implementation each:
//! a [`CounterStore`] holding per-window counts, an [`EndpointMatcher`]
//! selecting endpoint policies, and a [`RateLimitAlgorithm`] turning a count
//! into a verdict. [`RateLimiter`] wires them together per request.

mod algorithm;
mod clock;
mod key;
mod limiter;
mod matcher;
mod policy;
mod store;
mod sweeper;

pub use algorithm::{FixedWindowAlgorithm, RateLimitAlgorithm};
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::CounterKey;
pub use limiter::{Decision, RateLimiter};
pub use matcher::{EndpointMatcher, ExactPathMatcher};
pub use policy::{EndpointPolicy, PolicySet, RateLimitPolicy, ResolvedPolicy, DEFAULT_POLICY_PATH};
pub use store::{CounterStore, InMemoryCounterStore};
pub use sweeper::{SweepHandle, SweepWorker};
