//! The commit protocol.
//!
//! Commits run under the database mutex, in five steps:
//!
//! 1. Read-only transactions commit immediately; they cannot conflict.
//! 2. SSI rw-dependency check against every committed concurrent peer, in
//!    both directions. First committer wins: once a writer has committed,
//!    any overlapping transaction that read what it wrote — or wrote what
//!    it read — must abort.
//! 3. Write-write check: for each written key, the history's newest version
//!    must equal the version visible at the transaction's snapshot.
//! 4. Apply the write set at `max_commit_version + 1`, compacting each
//!    touched history down to what live readers can still observe.
//! 5. Publish the new commit version and close the transaction.
//!
//! Uncommitted peers are skipped in step 2: whichever of them commits later
//! will find this transaction — by then committed — in its own peer list and
//! perform the symmetric check.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;

use vireo_error::{Error, Result, WwCause};
use vireo_mvcc::{VersionHistory, VersionedValue};
use vireo_types::{Key, Version};

use crate::database::{Database, DbInner, TxnRecord};

/// A transaction's buffered intent for one key: payload, or tombstone.
pub(crate) type WriteIntent = Option<Arc<[u8]>>;

/// Run the commit protocol. The transaction is closed in all cases.
pub(crate) fn run(
    db: &Database,
    record: &Arc<TxnRecord>,
    reads: &HashMap<Key, VersionedValue>,
    writes: &HashMap<Key, WriteIntent>,
) -> Result<()> {
    let mut inner = db.inner.lock();
    let result = validate_and_apply(db, &mut inner, record, reads, writes);
    inner.close_transaction(record);
    drop(inner);

    if let Err(err) = &result {
        tracing::debug!(txn = %record.id, error = %err, "commit aborted");
    }
    result
}

fn validate_and_apply(
    db: &Database,
    inner: &mut DbInner,
    record: &Arc<TxnRecord>,
    reads: &HashMap<Key, VersionedValue>,
    writes: &HashMap<Key, WriteIntent>,
) -> Result<()> {
    // Step 1: read-only fast path.
    if writes.is_empty() {
        record.outcome.lock().committed = true;
        return Ok(());
    }

    // Step 2: rw-dependency check against committed concurrent peers.
    if let Some(peers) = inner.peers.get(&record.id) {
        for peer in peers {
            let outcome = peer.outcome.lock();
            if !outcome.committed || outcome.written_keys.is_empty() {
                continue;
            }
            let invalidated = overlapping(reads.keys(), &outcome.written_keys);
            if !invalidated.is_empty() {
                return Err(Error::ReadSetConflict {
                    keys: invalidated,
                    peer: peer.id,
                });
            }
            let observed = overlapping(writes.keys(), &outcome.read_keys);
            if !observed.is_empty() {
                return Err(Error::WriteSetConflict {
                    keys: observed,
                    peer: peer.id,
                });
            }
        }
    }

    // Step 3: write-write check against the current histories.
    for key in writes.keys() {
        let Some(history) = db.history(key) else {
            // New to this transaction and still absent globally.
            continue;
        };
        let current = history.fetch(Version::MAX);
        let initial = history.fetch(record.snapshot_version);
        let cause = match (current, initial) {
            (None, None) => continue,
            (None, Some(_)) => WwCause::DeletedByPeer,
            (Some(_), None) => WwCause::CreatedByPeer,
            (Some(current), Some(initial)) => {
                if current.version() == initial.version() {
                    continue;
                }
                WwCause::UpdatedByPeer
            }
        };
        return Err(Error::WwConflict {
            key: key.clone(),
            cause,
        });
    }

    // Step 4: apply. The committing transaction is still live here, so the
    // compaction floor never exceeds its own snapshot version.
    let min_live = inner.min_live_version();
    let new_version = inner.max_commit_version.next();
    for (key, intent) in writes {
        let mut value = VersionedValue::new(new_version);
        match intent {
            Some(payload) => value.set_payload(Arc::clone(payload)),
            None => value.mark_deleted(),
        }

        match db.kvs.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(VersionHistory::single(value));
            }
            Entry::Occupied(mut slot) => {
                let appended = slot.get().append(value);
                match appended.compact(min_live) {
                    Some(history) => {
                        slot.insert(history);
                    }
                    None => {
                        slot.remove();
                    }
                }
            }
        }
    }

    // Step 5: publish.
    inner.max_commit_version = new_version;
    {
        let mut outcome = record.outcome.lock();
        outcome.committed = true;
        outcome.read_keys = reads.keys().cloned().collect();
        outcome.written_keys = writes.keys().cloned().collect();
    }
    tracing::trace!(
        txn = %record.id,
        version = %new_version,
        writes = writes.len(),
        "commit applied"
    );
    Ok(())
}

/// Keys present in both sets, sorted for deterministic error messages.
fn overlapping<'a>(
    keys: impl Iterator<Item = &'a Key>,
    against: &std::collections::HashSet<Key>,
) -> Vec<Key> {
    let mut found: Vec<Key> = keys.filter(|key| against.contains(*key)).cloned().collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use vireo_types::Cx;

    fn put(db: &Database, cx: &Cx, key: &[u8], value: &[u8]) {
        let mut txn = db.begin(cx).unwrap();
        txn.set(cx, key, value).unwrap();
        txn.commit(cx).unwrap();
    }

    #[test]
    fn commit_version_increases_by_exactly_one() {
        let db = Database::new();
        let cx = Cx::new();

        assert_eq!(db.current_version(), Version::ZERO);
        put(&db, &cx, b"key1", b"a");
        assert_eq!(db.current_version(), Version::new(1));
        put(&db, &cx, b"key1", b"b");
        assert_eq!(db.current_version(), Version::new(2));
    }

    #[test]
    fn read_only_commit_does_not_advance_the_clock() {
        let db = Database::new();
        let cx = Cx::new();
        put(&db, &cx, b"key1", b"a");

        let mut txn = db.begin(&cx).unwrap();
        let _ = txn.get(&cx, b"key1").unwrap();
        txn.commit(&cx).unwrap();
        assert_eq!(db.current_version(), Version::new(1));
    }

    #[test]
    fn rollback_does_not_advance_the_clock() {
        let db = Database::new();
        let cx = Cx::new();

        let mut txn = db.begin(&cx).unwrap();
        txn.set(&cx, b"key1", &b"a"[..]).unwrap();
        txn.rollback(&cx).unwrap();
        assert_eq!(db.current_version(), Version::ZERO);
        assert!(db.history(b"key1").is_none());
    }

    #[test]
    fn ww_conflict_updated_by_peer() {
        let db = Database::new();
        let cx = Cx::new();
        put(&db, &cx, b"key1", b"initial");

        // Blind writes: with no reads on either side the rw checks pass and
        // the version comparison catches the collision.
        let mut t1 = db.begin(&cx).unwrap();
        let mut t2 = db.begin(&cx).unwrap();
        t1.set(&cx, b"key1", &b"value1"[..]).unwrap();
        t2.set(&cx, b"key1", &b"value2"[..]).unwrap();

        t1.commit(&cx).unwrap();
        let err = t2.commit(&cx).unwrap_err();
        assert!(
            matches!(
                err,
                Error::WwConflict {
                    cause: WwCause::UpdatedByPeer,
                    ..
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn ww_conflict_created_by_peer() {
        let db = Database::new();
        let cx = Cx::new();

        let mut t1 = db.begin(&cx).unwrap();
        let mut t2 = db.begin(&cx).unwrap();
        t1.set(&cx, b"fresh", &b"a"[..]).unwrap();
        t2.set(&cx, b"fresh", &b"b"[..]).unwrap();

        t1.commit(&cx).unwrap();
        let err = t2.commit(&cx).unwrap_err();
        assert!(
            matches!(
                err,
                Error::WwConflict {
                    cause: WwCause::CreatedByPeer,
                    ..
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn delete_collides_with_concurrent_update() {
        let db = Database::new();
        let cx = Cx::new();
        put(&db, &cx, b"key1", b"initial");

        let mut t1 = db.begin(&cx).unwrap();
        let mut t2 = db.begin(&cx).unwrap();
        t1.delete(&cx, b"key1").unwrap();
        t2.set(&cx, b"key1", &b"value2"[..]).unwrap();

        t1.commit(&cx).unwrap();
        let err = t2.commit(&cx).unwrap_err();
        assert!(err.is_conflict(), "{err}");
    }

    #[test]
    fn rw_conflict_read_set_invalidated() {
        let db = Database::new();
        let cx = Cx::new();
        put(&db, &cx, b"key1", b"initial");

        // t2 reads key1; t1 overwrites it and commits first. t2's commit
        // must abort even though it writes a disjoint key.
        let mut t1 = db.begin(&cx).unwrap();
        let mut t2 = db.begin(&cx).unwrap();
        let _ = t2.get(&cx, b"key1").unwrap();
        t2.set(&cx, b"other", &b"x"[..]).unwrap();
        t1.set(&cx, b"key1", &b"rewritten"[..]).unwrap();

        t1.commit(&cx).unwrap();
        let err = t2.commit(&cx).unwrap_err();
        assert!(matches!(err, Error::ReadSetConflict { .. }), "{err}");
    }

    #[test]
    fn rw_conflict_write_set_observed_by_committed_reader() {
        let db = Database::new();
        let cx = Cx::new();
        put(&db, &cx, b"key1", b"initial");

        // t1 reads key1 and commits a disjoint write first. t2, which writes
        // key1, would retroactively invalidate t1's read set.
        let mut t1 = db.begin(&cx).unwrap();
        let mut t2 = db.begin(&cx).unwrap();
        let _ = t1.get(&cx, b"key1").unwrap();
        t1.set(&cx, b"other", &b"x"[..]).unwrap();
        t2.set(&cx, b"key1", &b"rewritten"[..]).unwrap();

        t1.commit(&cx).unwrap();
        let err = t2.commit(&cx).unwrap_err();
        assert!(matches!(err, Error::WriteSetConflict { .. }), "{err}");
    }

    #[test]
    fn read_only_peers_do_not_conflict() {
        let db = Database::new();
        let cx = Cx::new();
        put(&db, &cx, b"key1", b"initial");

        let mut reader = db.begin(&cx).unwrap();
        let mut writer = db.begin(&cx).unwrap();
        let _ = reader.get(&cx, b"key1").unwrap();
        reader.commit(&cx).unwrap();

        writer.set(&cx, b"key1", &b"new"[..]).unwrap();
        writer.commit(&cx).unwrap();
    }

    #[test]
    fn non_overlapping_writers_both_commit() {
        let db = Database::new();
        let cx = Cx::new();

        let mut t1 = db.begin(&cx).unwrap();
        let mut t2 = db.begin(&cx).unwrap();
        t1.set(&cx, b"a", &b"1"[..]).unwrap();
        t2.set(&cx, b"b", &b"2"[..]).unwrap();

        t1.commit(&cx).unwrap();
        t2.commit(&cx).unwrap();
        assert_eq!(db.current_version(), Version::new(2));
    }

    #[test]
    fn histories_stay_compact_across_successive_commits() {
        let db = Database::new();
        let cx = Cx::new();

        for i in 0..10_u32 {
            put(&db, &cx, b"key1", format!("value{i}").as_bytes());
            let history = db.history(b"key1").unwrap();
            // The committing transaction pins its own snapshot, so the entry
            // it superseded survives until the next commit.
            assert!(history.len() <= 2, "history grew to {}", history.len());
        }

        put(&db, &cx, b"key1", b"final");
        let history = db.history(b"key1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().version(), db.current_version());
    }

    #[test]
    fn live_snapshot_pins_old_versions() {
        let db = Database::new();
        let cx = Cx::new();
        put(&db, &cx, b"key1", b"v1");

        let snap = db.snapshot(&cx).unwrap();
        put(&db, &cx, b"key1", b"v2");
        put(&db, &cx, b"key1", b"v3");

        let history = db.history(b"key1").unwrap();
        assert_eq!(history.len(), 3, "pinned versions must not be compacted");

        drop(snap);
        put(&db, &cx, b"key1", b"v4");
        let history = db.history(b"key1").unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn delete_of_absent_key_commits_cleanly() {
        let db = Database::new();
        let cx = Cx::new();

        let mut txn = db.begin(&cx).unwrap();
        txn.delete(&cx, b"ghost").unwrap();
        txn.commit(&cx).unwrap();

        let snap = db.snapshot(&cx).unwrap();
        assert!(snap.get(&cx, b"ghost").unwrap_err().is_not_found());
    }
}
