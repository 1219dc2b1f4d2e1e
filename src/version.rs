//! Version string ordering for update/downgrade decisions.

use std::cmp::Ordering;

/// Compares two version strings segment by segment.
///
/// Segments are split on `.`, `-` and `+`. Two numeric segments compare as
/// numbers, anything else compares as text, so `4.10.0 > 4.9.1` while
/// `2.0.14-openssl` still orders after `2.0.14`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '-', '+']);
    let mut right = b.split(['.', '-', '+']);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// True when moving from `from` to `to` is an upgrade.
pub fn is_upgrade(from: &str, to: &str) -> bool {
    compare_versions(from, to) == Ordering::Less
}
