//! Engine version triples and compatibility thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An engine version: major, minor, bugfix.
///
/// Ordering is lexicographic across the three components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major version component.
    pub major: u32,
    /// Minor version component.
    pub minor: u32,
    /// Bugfix version component.
    pub bugfix: u32,
}

/// The version of the engine this crate belongs to.
pub const LATEST: Version = Version {
    major: 8,
    minor: 1,
    bugfix: 0,
};

/// Oldest creation major an index may carry at all. Catalogs created before
/// this never recorded enough metadata to be interpreted safely.
pub const MIN_CREATION_MAJOR: u32 = 6;

/// Default oldest creation major the loader accepts. Indexes created below
/// this floor must be rewritten by an intermediate engine release first.
pub const MIN_SUPPORTED_MAJOR: u32 = 7;

/// Creation major from which every segment record must carry its minimum
/// index version.
pub const TRACK_MIN_VERSION_MAJOR: u32 = 7;

impl Version {
    /// Create a version from its three components.
    pub const fn new(major: u32, minor: u32, bugfix: u32) -> Self {
        Version {
            major,
            minor,
            bugfix,
        }
    }

    /// Whether this version is the same as or newer than `other`.
    pub fn on_or_after(&self, other: &Version) -> bool {
        self >= other
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.bugfix)
    }
}
