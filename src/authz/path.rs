//! Segment-wise matching of request paths against grant patterns.
//!
//! A pattern and a path match when they have the same number of segments and
//! every pattern segment either equals the path segment or is `*`. A `*`
//! never matches an empty segment and never spans more than one segment.

use crate::authz::types::{PathPattern, Segment};

/// Splits a path into its segments after the leading `/`. Trailing empty
/// segments are dropped, so `/directory/` and `/directory` both yield
/// `["directory"]`; interior empty segments (`/a//b`) are kept.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let mut parts: Vec<&str> = trimmed.split('/').collect();
    while parts.last().is_some_and(|s| s.is_empty()) {
        parts.pop();
    }
    parts
}

/// Returns `true` if `path` is granted by `pattern`.
pub fn matches(pattern: &PathPattern, path: &str) -> bool {
    let allowed = match pattern {
        PathPattern::All => return true,
        PathPattern::Segments(allowed) => allowed,
    };

    let given = segments(path);
    if allowed.len() != given.len() {
        return false;
    }

    allowed.iter().zip(given).all(|(allowed, given)| match allowed {
        Segment::Wildcard => !given.is_empty(),
        Segment::Literal(literal) => literal == given,
    })
}
