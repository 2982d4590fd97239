//! Error types for the vireo key-value store.
//!
//! One enum covers the whole public surface: invalid input, missing keys,
//! commit-time conflicts, payload I/O, and cancellation. All errors are
//! returned to the caller; nothing is retried or recovered internally.
//! Internal invariant violations (non-monotonic version appends, zero entry
//! versions) are programmer errors and panic instead of surfacing here.

use vireo_types::cx::Interrupted;
use vireo_types::{Key, TxnId};

use thiserror::Error;

/// Why a write-write conflict aborted a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WwCause {
    /// The key did not exist at the transaction's snapshot but exists now.
    CreatedByPeer,
    /// The key existed at the transaction's snapshot but is gone now.
    DeletedByPeer,
    /// The key was rewritten after the transaction began.
    UpdatedByPeer,
}

impl WwCause {
    const fn describe(self) -> &'static str {
        match self {
            Self::CreatedByPeer => "also created by another transaction",
            Self::DeletedByPeer => "deleted by another transaction",
            Self::UpdatedByPeer => "updated after this transaction began",
        }
    }
}

/// Primary error type for vireo operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Invalid input ===
    /// Keys must be non-empty byte strings.
    #[error("key must not be empty")]
    EmptyKey,

    /// Range bounds where `begin` sorts after `end` (both non-empty).
    #[error("range begin {:?} sorts after end {:?}", String::from_utf8_lossy(.begin), String::from_utf8_lossy(.end))]
    InvalidRange { begin: Key, end: Key },

    /// Operation on a committed or rolled-back transaction handle.
    #[error("transaction is already closed")]
    TransactionClosed,

    /// Operation on a discarded snapshot handle.
    #[error("snapshot is already discarded")]
    SnapshotClosed,

    // === Missing data ===
    /// The key is absent, or tombstoned at the read version.
    #[error("key {:?} does not exist", String::from_utf8_lossy(.key))]
    NotFound { key: Key },

    // === Commit conflicts ===
    /// Keys this transaction read were written by a peer that committed
    /// first; the read set is no longer serializable.
    #[error("ssi conflict: keys [{}] read here were written by committed {peer}", join_keys(.keys))]
    ReadSetConflict { keys: Vec<Key>, peer: TxnId },

    /// Keys this transaction writes were read by a peer that committed
    /// first; committing would retroactively invalidate that peer.
    #[error("ssi conflict: keys [{}] written here were read by committed {peer}", join_keys(.keys))]
    WriteSetConflict { keys: Vec<Key>, peer: TxnId },

    /// Two concurrent transactions wrote the same key; the first committer
    /// won.
    #[error("ww-conflict: key {:?} was {}", String::from_utf8_lossy(.key), .cause.describe())]
    WwConflict { key: Key, cause: WwCause },

    // === Ambient ===
    /// Reading a payload source (or value reader) failed.
    #[error("payload I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Cancellation observed at a checkpoint.
    #[error("operation interrupted")]
    Interrupted,
}

impl Error {
    /// Whether this error is a commit-time conflict (the transaction lost a
    /// race and may be retried from a fresh snapshot).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ReadSetConflict { .. } | Self::WriteSetConflict { .. } | Self::WwConflict { .. }
        )
    }

    /// Whether this error means "no such key at the read version".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<Interrupted> for Error {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

fn join_keys(keys: &[Key]) -> String {
    let mut out = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("{:?}", String::from_utf8_lossy(key)));
    }
    out
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_classification() {
        let ww = Error::WwConflict {
            key: b"k".to_vec(),
            cause: WwCause::UpdatedByPeer,
        };
        assert!(ww.is_conflict());
        assert!(!ww.is_not_found());

        let nf = Error::NotFound { key: b"k".to_vec() };
        assert!(nf.is_not_found());
        assert!(!nf.is_conflict());

        assert!(!Error::EmptyKey.is_conflict());
    }

    #[test]
    fn messages_name_the_keys() {
        let err = Error::ReadSetConflict {
            keys: vec![b"alpha".to_vec(), b"beta".to_vec()],
            peer: TxnId::new(4).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("alpha"), "{msg}");
        assert!(msg.contains("beta"), "{msg}");
        assert!(msg.contains("txn#4"), "{msg}");
    }

    #[test]
    fn ww_causes_render_distinctly() {
        let causes = [
            WwCause::CreatedByPeer,
            WwCause::DeletedByPeer,
            WwCause::UpdatedByPeer,
        ];
        let rendered: Vec<String> = causes
            .iter()
            .map(|c| {
                Error::WwConflict {
                    key: b"k1".to_vec(),
                    cause: *c,
                }
                .to_string()
            })
            .collect();
        assert_ne!(rendered[0], rendered[1]);
        assert_ne!(rendered[1], rendered[2]);
    }

    #[test]
    fn interrupted_converts() {
        let err: Error = vireo_types::cx::Interrupted.into();
        assert!(matches!(err, Error::Interrupted));
    }
}
