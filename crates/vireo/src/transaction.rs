//! The read-write transaction handle.

use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::sync::Arc;

use vireo_error::{Error, Result};
use vireo_mvcc::VersionedValue;
use vireo_types::{Cx, Key, Version};

use crate::commit::{self, WriteIntent};
use crate::database::{Database, TxnRecord};
use crate::iter::{self, RangeIter};
use crate::reader::ValueReader;

/// A read-write transaction.
///
/// Reads observe the database as of the transaction's snapshot version plus
/// this transaction's own buffered writes; writes accumulate locally and
/// reach the database only through [`commit`](Self::commit). Both
/// [`commit`](Self::commit) and [`rollback`](Self::rollback) close the
/// handle; every later operation fails with
/// [`Error::TransactionClosed`]. Dropping an open handle rolls it back.
pub struct Transaction<'db> {
    db: &'db Database,
    record: Arc<TxnRecord>,
    /// Key → versioned value observed by this transaction.
    reads: HashMap<Key, VersionedValue>,
    /// Key → buffered payload, or `None` for a buffered delete. Shadows
    /// `reads` on lookup.
    writes: HashMap<Key, WriteIntent>,
    open: bool,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, record: Arc<TxnRecord>) -> Self {
        Self {
            db,
            record,
            reads: HashMap::new(),
            writes: HashMap::new(),
            open: true,
        }
    }

    /// The commit version this transaction reads at.
    #[must_use]
    pub fn snapshot_version(&self) -> Version {
        self.record.snapshot_version
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::TransactionClosed)
        }
    }

    /// Read `key`. Buffered writes win over earlier reads, which win over
    /// the database at the snapshot version; a database read is recorded in
    /// the read set for commit-time validation.
    pub fn get(&mut self, cx: &Cx, key: &[u8]) -> Result<ValueReader> {
        self.ensure_open()?;
        cx.checkpoint()?;
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        if let Some(intent) = self.writes.get(key) {
            return match intent {
                Some(payload) => Ok(ValueReader::new(Arc::clone(payload))),
                None => Err(Error::NotFound { key: key.to_vec() }),
            };
        }

        if let Some(observed) = self.reads.get(key) {
            return Ok(ValueReader::new(Arc::clone(observed.payload())));
        }

        if let Some(history) = self.db.history(key) {
            if let Some(value) = history.fetch(self.record.snapshot_version) {
                if value.is_deleted() {
                    return Err(Error::NotFound { key: key.to_vec() });
                }
                let reader = ValueReader::new(Arc::clone(value.payload()));
                self.reads.insert(key.to_vec(), value.clone());
                return Ok(reader);
            }
        }
        Err(Error::NotFound { key: key.to_vec() })
    }

    /// Buffer a write of `key`. The payload source is drained eagerly; a
    /// source failure surfaces as [`Error::Io`] and buffers nothing.
    pub fn set(&mut self, cx: &Cx, key: &[u8], mut source: impl Read) -> Result<()> {
        self.ensure_open()?;
        cx.checkpoint()?;
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let mut payload = Vec::new();
        source.read_to_end(&mut payload)?;
        self.writes.insert(key.to_vec(), Some(Arc::from(payload)));
        Ok(())
    }

    /// Buffer a delete of `key`. Deleting an absent key is not an error; the
    /// intent simply has no visible effect if the key still does not exist
    /// at commit time.
    pub fn delete(&mut self, cx: &Cx, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        cx.checkpoint()?;
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    /// All pairs visible to this transaction, in no particular order.
    pub fn scan<'a>(
        &'a mut self,
        cx: &'a Cx,
        errp: &'a mut Option<Error>,
    ) -> impl Iterator<Item = (Key, ValueReader)> + 'a {
        self.ascend(cx, &[], &[], errp)
    }

    /// Pairs with keys in `[begin, end)`, ascending. Empty bounds are
    /// unbounded.
    pub fn ascend<'a>(
        &'a mut self,
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
        &'a mut self,
        cx: &'a Cx,
        begin: &[u8],
        end: &[u8],
        errp: &'a mut Option<Error>,
    ) -> impl Iterator<Item = (Key, ValueReader)> + 'a {
        let keys = self.range_keys(begin, end, true, errp);
        RangeIter::new(keys, errp, move |key| self.get(cx, key))
    }

    /// Candidate keys for range iteration: this transaction's reads and
    /// writes plus every key currently in the database. Keys that appeared
    /// after the snapshot stay in the set; the per-key fetch filters them.
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

        let mut keys: BTreeSet<Key> = self.db.keys_in_range(begin, end);
        for key in self.reads.keys().chain(self.writes.keys()) {
            if iter::in_range(begin, end, key) {
                keys.insert(key.clone());
            }
        }

        let mut keys: Vec<Key> = keys.into_iter().collect();
        if reverse {
            keys.reverse();
        }
        keys
    }

    /// Atomically publish this transaction's writes.
    ///
    /// Succeeds only if no concurrent peer invalidated the outcome first;
    /// conflicts surface as [`Error::ReadSetConflict`],
    /// [`Error::WriteSetConflict`], or [`Error::WwConflict`]. The handle is
    /// closed whether or not the commit succeeds. The one exception is a
    /// context cancelled before the protocol starts: that returns
    /// [`Error::Interrupted`] and leaves the handle open, so the caller can
    /// still roll back.
    pub fn commit(&mut self, cx: &Cx) -> Result<()> {
        self.ensure_open()?;
        cx.checkpoint()?;
        self.open = false;
        let result = commit::run(self.db, &self.record, &self.reads, &self.writes);
        self.reads = HashMap::new();
        self.writes = HashMap::new();
        result
    }

    /// Discard all buffered state and close the handle. Never touches the
    /// database beyond liveness tracking, and is always permitted — a
    /// cancelled context does not block rollback.
    pub fn rollback(&mut self, _cx: &Cx) -> Result<()> {
        self.ensure_open()?;
        self.open = false;
        self.db.close_transaction(&self.record);
        self.reads = HashMap::new();
        self.writes = HashMap::new();
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            self.db.close_transaction(&self.record);
        }
    }
}
