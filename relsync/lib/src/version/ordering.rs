//! Version-aware ordering for normalized version strings.
//!
//! Only the numeric release part takes part in the comparison: every character
//! other than digits and dots is dropped and the remaining dot-separated
//! components are compared as integers. `2.10` therefore sorts after `2.9`,
//! and `1.4-beta` ties with `1.4`.

use std::cmp::Ordering;

/// Sort key holding the numeric components of a version string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortableVersion(Vec<u64>);

impl SortableVersion {
    pub fn parse(version: &str) -> Self {
        let loose: String = version
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let components = loose
            .split('.')
            .filter(|part| !part.is_empty())
            // Overlong digit runs still order above everything realistic.
            .map(|part| part.parse::<u64>().unwrap_or(u64::MAX))
            .collect();
        Self(components)
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

/// Compares two version strings by their numeric components.
///
/// ## Examples
///
/// ```
/// use relsync_lib::version::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("2.10", "2.9"), Ordering::Greater);
/// assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    SortableVersion::parse(a).cmp(&SortableVersion::parse(b))
}

/// Stable in-place sort of any records by their version, oldest first.
pub fn sort_by_version<T>(items: &mut [T], version: impl Fn(&T) -> &str) {
    items.sort_by_cached_key(|item| SortableVersion::parse(version(item)));
}
