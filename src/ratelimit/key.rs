//! Counter key construction.

use std::fmt;

/// A key that uniquely identifies one counter: a client, a logical path and
/// a fixed window index.
///
/// Equality and hashing are field-wise, so an identity or path containing
/// `:` cannot collide with a different pair. The `:` separator only appears
/// in the [`Display`](fmt::Display) form used for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Client identity (usually a normalized IP address)
    pub identity: String,
    /// Logical path: a configured endpoint path or the default sentinel
    pub path: String,
    /// Window index, `floor(now_ms / window_ms)`
    pub window: u64,
}

impl CounterKey {
    /// Create a new counter key.
    pub fn new(identity: &str, path: &str, window: u64) -> Self {
        Self {
            identity: identity.to_string(),
            path: path.to_string(),
            window,
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.identity, self.path, self.window)
    }
}
