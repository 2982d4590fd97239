//! The root container: key map, commit clock, liveness tracking.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use vireo_error::Result;
use vireo_mvcc::VersionHistory;
use vireo_types::{Cx, Key, SnapshotId, TxnId, Version};

use crate::iter;
use crate::snapshot::Snapshot;
use crate::transaction::Transaction;

/// An in-memory multi-version key-value store with serializable snapshot
/// isolation.
///
/// The database owns every version history; snapshots and transactions are
/// borrowing handles and cannot outlive it. It is shared freely across
/// threads — the handles themselves are single-owner.
///
/// Reads through a handle never take the database mutex: the key map is a
/// sharded concurrent map, and per-key histories are immutable once
/// published (commits swap in replacements atomically). The mutex guards
/// only handle creation, handle close, and the commit protocol.
pub struct Database {
    /// Committed state: key → retained version history.
    pub(crate) kvs: DashMap<Key, Arc<VersionHistory>>,
    pub(crate) inner: Mutex<DbInner>,
    next_txn_id: AtomicU64,
    next_snapshot_id: AtomicU64,
}

/// Mutable database-level state, guarded by the database mutex.
pub(crate) struct DbInner {
    /// The largest version committed so far; the snapshot version handed to
    /// new handles.
    pub(crate) max_commit_version: Version,
    /// Open transactions, in no particular order.
    pub(crate) live_txns: Vec<Arc<TxnRecord>>,
    /// Open snapshots and the version they pin.
    pub(crate) live_snaps: HashMap<SnapshotId, Version>,
    /// For each live transaction, every transaction whose lifetime overlapped
    /// its own — including peers that have since committed or rolled back.
    /// Entries are dropped only when the owning transaction closes.
    pub(crate) peers: HashMap<TxnId, Vec<Arc<TxnRecord>>>,
}

impl DbInner {
    /// The smallest version any current reader might still fetch: the
    /// minimum snapshot version over live snapshots, live transactions, and
    /// every peer of a live transaction. Compaction must not drop entries
    /// this floor can resolve to.
    pub(crate) fn min_live_version(&self) -> Version {
        let mut min = Version::MAX;
        for txn in &self.live_txns {
            min = min.min(txn.snapshot_version);
            if let Some(peers) = self.peers.get(&txn.id) {
                for peer in peers {
                    min = min.min(peer.snapshot_version);
                }
            }
        }
        for version in self.live_snaps.values() {
            min = min.min(*version);
        }
        min
    }

    /// Remove a transaction from liveness tracking. Peers keep their
    /// reference to the record; only the record's own peer list is dropped.
    pub(crate) fn close_transaction(&mut self, record: &Arc<TxnRecord>) {
        self.live_txns.retain(|live| !Arc::ptr_eq(live, record));
        self.peers.remove(&record.id);
    }
}

/// The database-side face of a transaction.
///
/// The user-owned [`Transaction`] handle keeps its buffers private while
/// open; this record is what peer lists hold on to, and it outlives the
/// handle for as long as any overlapping transaction is still live. At
/// commit time the handle's key sets are stashed here so those peers can run
/// their conflict checks against a transaction whose handle is long gone.
pub(crate) struct TxnRecord {
    pub(crate) id: TxnId,
    pub(crate) snapshot_version: Version,
    pub(crate) outcome: Mutex<TxnOutcome>,
}

#[derive(Default)]
pub(crate) struct TxnOutcome {
    pub(crate) committed: bool,
    pub(crate) read_keys: HashSet<Key>,
    pub(crate) written_keys: HashSet<Key>,
}

impl Database {
    /// An empty database at version zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// An empty database pre-sized for roughly `keys` entries.
    #[must_use]
    pub fn with_capacity(keys: usize) -> Self {
        Self {
            kvs: DashMap::with_capacity(keys),
            inner: Mutex::new(DbInner {
                max_commit_version: Version::ZERO,
                live_txns: Vec::new(),
                live_snaps: HashMap::new(),
                peers: HashMap::new(),
            }),
            next_txn_id: AtomicU64::new(1),
            next_snapshot_id: AtomicU64::new(1),
        }
    }

    /// The version of the most recent successful write commit.
    #[must_use]
    pub fn current_version(&self) -> Version {
        self.inner.lock().max_commit_version
    }

    /// Open a read-only snapshot pinned at the current commit version.
    pub fn snapshot(&self, cx: &Cx) -> Result<Snapshot<'_>> {
        cx.checkpoint()?;
        let id = SnapshotId::new(self.next_snapshot_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock();
        let version = inner.max_commit_version;
        inner.live_snaps.insert(id, version);
        Ok(Snapshot::new(self, id, version))
    }

    /// Open a read-write transaction pinned at the current commit version.
    pub fn begin(&self, cx: &Cx) -> Result<Transaction<'_>> {
        cx.checkpoint()?;
        let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::Relaxed))
            .expect("transaction id counter starts at 1");

        let mut inner = self.inner.lock();
        let record = Arc::new(TxnRecord {
            id,
            snapshot_version: inner.max_commit_version,
            outcome: Mutex::new(TxnOutcome::default()),
        });

        // The overlap relation is symmetric over lifetimes: the new
        // transaction inherits every currently live transaction as a peer,
        // and is appended to each of their lists.
        let DbInner {
            live_txns, peers, ..
        } = &mut *inner;
        let inherited = live_txns.clone();
        for live in live_txns.iter() {
            peers
                .get_mut(&live.id)
                .expect("every live transaction has a peer list")
                .push(Arc::clone(&record));
        }
        peers.insert(id, inherited);
        live_txns.push(Arc::clone(&record));

        tracing::trace!(txn = %id, snapshot = %record.snapshot_version, "transaction started");
        Ok(Transaction::new(self, record))
    }

    /// The published history for `key`, if any.
    pub(crate) fn history(&self, key: &[u8]) -> Option<Arc<VersionHistory>> {
        self.kvs.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Keys currently present in the store (histories may be tombstoned)
    /// restricted to `[begin, end)`, in ascending order.
    pub(crate) fn keys_in_range(&self, begin: &[u8], end: &[u8]) -> BTreeSet<Key> {
        self.kvs
            .iter()
            .filter(|entry| iter::in_range(begin, end, entry.key()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub(crate) fn close_transaction(&self, record: &Arc<TxnRecord>) {
        self.inner.lock().close_transaction(record);
    }

    pub(crate) fn discard_snapshot(&self, id: SnapshotId) {
        self.inner.lock().live_snaps.remove(&id);
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
