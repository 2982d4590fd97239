//! Per-key version history: fetch, append, compact.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use vireo_types::Version;

use crate::value::VersionedValue;

/// The retained versions of one key, sorted strictly ascending by version.
///
/// A history is never empty while the database holds it. Compaction keeps
/// most histories at one or two entries, hence the inline capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHistory {
    entries: SmallVec<[VersionedValue; 2]>,
}

impl VersionHistory {
    /// A one-entry history.
    #[must_use]
    pub fn single(value: VersionedValue) -> Arc<Self> {
        let mut entries = SmallVec::new();
        entries.push(value);
        Arc::new(Self { entries })
    }

    /// The record visible at `at`: the entry with the largest
    /// `version <= at`, or `None` when every entry is newer.
    #[must_use]
    pub fn fetch(&self, at: Version) -> Option<&VersionedValue> {
        let idx = self.entries.partition_point(|e| e.version() <= at);
        if idx == 0 {
            return None;
        }
        Some(&self.entries[idx - 1])
    }

    /// The newest record. Histories are never empty.
    #[must_use]
    pub fn latest(&self) -> &VersionedValue {
        self.entries.last().expect("version history is never empty")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A new history equal to this one with `value` appended.
    ///
    /// # Panics
    ///
    /// Panics unless `value.version()` strictly exceeds the newest retained
    /// version. The commit protocol allocates strictly increasing versions,
    /// so a violation is an internal invariant failure.
    #[must_use]
    pub fn append(self: &Arc<Self>, value: VersionedValue) -> Arc<Self> {
        let newest = self.latest().version();
        assert!(
            value.version() > newest,
            "appended version {} must exceed newest retained version {newest}",
            value.version()
        );
        let mut entries = self.entries.clone();
        entries.push(value);
        debug_assert!(entries.windows(2).all(|w| w[0].version() < w[1].version()));
        Arc::new(Self { entries })
    }

    /// Drop entries no live reader can observe.
    ///
    /// An entry survives iff it is the most recent, or its version is at
    /// least `min_version`, or it is the pivot every reader at or below
    /// `min_version` resolves to. A live sole survivor is always kept.
    ///
    /// Returns `None` when the only surviving entry is a tombstone older
    /// than `min_version` — the key is invisible to every current and future
    /// reader and the history may be removed outright. Returns a clone of
    /// `self` when nothing changes.
    #[must_use]
    pub fn compact(self: &Arc<Self>, min_version: Version) -> Option<Arc<Self>> {
        if self.entries.len() == 1 {
            let sole = &self.entries[0];
            if sole.is_deleted() && sole.version() < min_version {
                return None;
            }
            return Some(Arc::clone(self));
        }

        // Pivot: the newest entry a reader at min_version resolves to.
        // Everything strictly older is unobservable.
        let idx = self.entries.partition_point(|e| e.version() <= min_version);
        if idx == 0 {
            return Some(Arc::clone(self));
        }
        let survivors = &self.entries[idx - 1..];
        if survivors.len() == self.entries.len() {
            return Some(Arc::clone(self));
        }
        if survivors.len() == 1 && survivors[0].is_deleted() && survivors[0].version() < min_version
        {
            return None;
        }
        Some(Arc::new(Self {
            entries: survivors.iter().cloned().collect(),
        }))
    }
}

impl fmt::Display for VersionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for entry in &self.entries {
            write!(f, "{entry}")?;
        }
        f.write_str("]")
    }
}
