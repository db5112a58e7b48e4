//! The global version counter value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value of the server-wide version counter.
///
/// Every accepted write advances the counter by exactly one, so the value
/// totally orders all accepted writes across all records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GlobalVersion(pub u64);

impl GlobalVersion {
    /// The value a fresh server starts at, and the value a client assumes
    /// before it has seen any server state.
    pub const INITIAL: GlobalVersion = GlobalVersion(1);

    /// Creates a version from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the version that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the version that follows this one, or `None` on overflow.
    #[must_use]
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for GlobalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for GlobalVersion {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
