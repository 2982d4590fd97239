//! The read-only snapshot handle.

use std::sync::Arc;

use vireo_error::{Error, Result};
use vireo_types::{Cx, Key, SnapshotId, Version};

use crate::database::Database;
use crate::iter::{self, RangeIter};
use crate::reader::ValueReader;

/// A read-only view of the database, frozen at the commit version current
/// when the snapshot was opened.
///
/// Commits that land after that point are invisible, including commits that
/// arrive while a range iteration is in flight. [`discard`](Self::discard)
/// (or dropping the handle) releases the snapshot's pin on old versions.
pub struct Snapshot<'db> {
    db: &'db Database,
    id: SnapshotId,
    version: Version,
    open: bool,
}

impl<'db> Snapshot<'db> {
    pub(crate) fn new(db: &'db Database, id: SnapshotId, version: Version) -> Self {
        Self {
            db,
            id,
            version,
            open: true,
        }
    }

    /// The commit version this snapshot reads at.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::SnapshotClosed)
        }
    }

    /// Read `key` at the snapshot version. Absent and tombstoned keys are
    /// [`Error::NotFound`].
    pub fn get(&self, cx: &Cx, key: &[u8]) -> Result<ValueReader> {
        self.ensure_open()?;
        cx.checkpoint()?;
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let Some(history) = self.db.history(key) else {
            return Err(Error::NotFound { key: key.to_vec() });
        };
        match history.fetch(self.version) {
            Some(value) if !value.is_deleted() => Ok(ValueReader::new(Arc::clone(value.payload()))),
            _ => Err(Error::NotFound { key: key.to_vec() }),
        }
    }

    /// All pairs visible at the snapshot version, in no particular order.
    pub fn scan<'a>(
        &'a self,
        cx: &'a Cx,
        errp: &'a mut Option<Error>,
    ) -> impl Iterator<Item = (Key, ValueReader)> + 'a {
        self.ascend(cx, &[], &[], errp)
    }

    /// Pairs with keys in `[begin, end)`, ascending. Empty bounds are
    /// unbounded; keys tombstoned at the snapshot version are skipped.
    pub fn ascend<'a>(
        &'a self,
        cx: &'a Cx,
        begin: &[u8],
        end: &[u8],
        errp: &'a mut Option<Error>,
    ) -> impl Iterator<Item = (Key, ValueReader)> + 'a {
        let keys = self.range_keys(begin, end, false, errp);
        RangeIter::new(keys, errp, move |key| self.get(cx, key))
    }

    /// Pairs with keys in `[begin, end)`, descending.
    pub fn descend<'a>(
        &'a self,
        cx: &'a Cx,
        begin: &[u8],
        end: &[u8],
        errp: &'a mut Option<Error>,
    ) -> impl Iterator<Item = (Key, ValueReader)> + 'a {
        let keys = self.range_keys(begin, end, true, errp);
        RangeIter::new(keys, errp, move |key| self.get(cx, key))
    }

    fn range_keys(
        &self,
        begin: &[u8],
        end: &[u8],
        reverse: bool,
        errp: &mut Option<Error>,
    ) -> Vec<Key> {
        if let Err(err) = self.ensure_open().and_then(|()| iter::validate_range(begin, end)) {
            *errp = Some(err);
            return Vec::new();
        }
        let mut keys: Vec<Key> = self.db.keys_in_range(begin, end).into_iter().collect();
        if reverse {
            keys.reverse();
        }
        keys
    }

    /// Release the snapshot. Further use of the handle fails with
    /// [`Error::SnapshotClosed`].
    pub fn discard(&mut self, _cx: &Cx) -> Result<()> {
        self.ensure_open()?;
        self.open = false;
        self.db.discard_snapshot(self.id);
        Ok(())
    }
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            self.db.discard_snapshot(self.id);
        }
    }
}
