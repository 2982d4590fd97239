//! Cross-cutting types for the vireo key-value store.
//!
//! This crate defines the identifier newtypes shared by every other vireo
//! crate — commit/snapshot versions and handle ids — plus the cooperative
//! cancellation context [`Cx`] that is threaded through all store operations.

use std::fmt;
use std::num::NonZeroU64;

pub mod cx;

pub use cx::Cx;

/// Keys are opaque byte strings, compared byte-lexicographically.
///
/// The empty key is not a valid key; operations reject it before touching the
/// store.
pub type Key = Vec<u8>;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Monotonically increasing global commit version ("commit clock").
///
/// `Version::ZERO` is the version of the empty store; every committed entry
/// carries a strictly positive version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Version(u64);

impl Version {
    pub const ZERO: Self = Self(0);

    /// Upper bound for "fetch the newest entry" lookups.
    pub const MAX: Self = Self(u64::MAX);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The successor version.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Whether this version may appear on a committed entry.
    #[inline]
    #[must_use]
    pub const fn is_valid_entry_version(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v#{}", self.get())
    }
}

// ---------------------------------------------------------------------------
// TxnId / SnapshotId
// ---------------------------------------------------------------------------

/// Monotonically increasing transaction identifier.
///
/// Ids start at 1; zero is never allocated, which keeps the niche available
/// for `Option<TxnId>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TxnId(NonZeroU64);

impl TxnId {
    /// Construct a `TxnId` from a raw counter value.
    ///
    /// Returns `None` for zero.
    #[inline]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.get())
    }
}

/// Identifier for a live read-only snapshot handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SnapshotId(u64);

impl SnapshotId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snap#{}", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_and_next() {
        assert!(Version::ZERO < Version::new(1));
        assert_eq!(Version::ZERO.next(), Version::new(1));
        assert_eq!(Version::new(41).next().get(), 42);
        assert!(!Version::ZERO.is_valid_entry_version());
        assert!(Version::new(1).is_valid_entry_version());
    }

    #[test]
    fn txn_id_rejects_zero() {
        assert!(TxnId::new(0).is_none());
        let id = TxnId::new(7).expect("non-zero");
        assert_eq!(id.get(), 7);
        assert_eq!(id.to_string(), "txn#7");
    }

    #[test]
    fn display_forms() {
        assert_eq!(Version::new(3).to_string(), "v#3");
        assert_eq!(SnapshotId::new(9).to_string(), "snap#9");
    }
}
