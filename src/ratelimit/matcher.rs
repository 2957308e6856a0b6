//! Request path matching against configured endpoint paths.

/// Decides whether a request path is covered by a configured endpoint path.
pub trait EndpointMatcher: Send + Sync {
    /// Returns `true` if `request_path` matches `configured_path`.
    fn matches(&self, request_path: &str, configured_path: &str) -> bool;
}

/// Case-insensitive exact path comparison.
///
/// Characters are compared one to one through their simple uppercase
/// mapping, so folds that change the character count (`ß` to `SS`) or map
/// compatibility characters onto ASCII (the Kelvin sign to `k`) never match.
/// No templating, prefix matching or trailing-slash normalization:
/// `/api/items/` does not match `/api/items`. Empty inputs never match.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactPathMatcher;

impl EndpointMatcher for ExactPathMatcher {
    fn matches(&self, request_path: &str, configured_path: &str) -> bool {
        if request_path.is_empty() || configured_path.is_empty() {
            return false;
        }

        if request_path.eq_ignore_ascii_case(configured_path) {
            return true;
        }
        if request_path.is_ascii() && configured_path.is_ascii() {
            return false;
        }

        let mut request = request_path.chars();
        let mut configured = configured_path.chars();
        loop {
            match (request.next(), configured.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if a == b || simple_uppercase(a) == simple_uppercase(b) => {}
                _ => return false,
            }
        }
    }
}

/// Single-character uppercase mapping; characters whose uppercase form
/// expands to several characters map to themselves.
fn simple_uppercase(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}
