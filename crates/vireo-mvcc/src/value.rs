//! A single versioned record: payload bytes or a tombstone.

use std::fmt;
use std::sync::Arc;

use vireo_types::Version;

static EMPTY: &[u8] = &[];

/// One (version, payload-or-tombstone) record in a version history.
///
/// The payload is shared (`Arc<[u8]>`): value readers handed out to callers
/// keep the bytes alive without copying, and cloning a record for a newer
/// version is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    version: Version,
    payload: Arc<[u8]>,
    deleted: bool,
}

impl VersionedValue {
    /// Create a record at `version` with an empty payload.
    ///
    /// # Panics
    ///
    /// Panics on `Version::ZERO`: entry versions are strictly positive, and
    /// the database never allocates version zero. Hitting this is an internal
    /// invariant violation, not a user error.
    #[must_use]
    pub fn new(version: Version) -> Self {
        assert!(
            version.is_valid_entry_version(),
            "entry version must be positive, got {version}"
        );
        Self {
            version,
            payload: Arc::from(EMPTY),
            deleted: false,
        }
    }

    /// Store `payload`, clearing the tombstone flag if set.
    pub fn set_payload(&mut self, payload: Arc<[u8]>) {
        self.payload = payload;
        self.deleted = false;
    }

    /// Turn this record into a tombstone: the payload is dropped, the
    /// version is preserved.
    pub fn mark_deleted(&mut self) {
        self.payload = Arc::from(EMPTY);
        self.deleted = true;
    }

    /// Copy this record (payload and tombstone flag) to a strictly newer
    /// version.
    ///
    /// # Panics
    ///
    /// Panics unless `newer > self.version()`.
    #[must_use]
    pub fn clone_at(&self, newer: Version) -> Self {
        assert!(
            newer > self.version,
            "clone target {newer} must exceed record version {}",
            self.version
        );
        Self {
            version: newer,
            payload: Arc::clone(&self.payload),
            deleted: self.deleted,
        }
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// The payload bytes. Empty for tombstones.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Arc<[u8]> {
        &self.payload
    }
}

impl fmt::Display for VersionedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deleted {
            write!(f, "{{{} deleted}}", self.version)
        } else {
            write!(
                f,
                "{{{} data:{}}}",
                self.version,
                String::from_utf8_lossy(&self.payload)
            )
        }
    }
}
