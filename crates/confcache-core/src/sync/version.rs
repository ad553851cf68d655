//! The version gate for fetched content.

use std::cmp::Ordering;

/// Compare two content versions: numerically when both parse as integers,
/// otherwise by ordinal string comparison.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Whether `fetched` may replace the cached snapshot: it must be strictly
/// newer, unless nothing has been cached yet.
pub fn is_newer(fetched: &str, cached: Option<&str>) -> bool {
    match cached.filter(|c| !c.is_empty()) {
        None => true,
        Some(cached) => compare_versions(fetched, cached) == Ordering::Greater,
    }
}
