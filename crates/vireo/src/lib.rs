//! vireo: a serializable in-memory multi-version key-value store.
//!
//! Keys and values are opaque byte strings. Every successful write commit
//! produces a new monotonically increasing version; reads always observe a
//! point-in-time snapshot fixed when the handle was opened. Concurrent
//! read-write transactions are validated at commit under serializable
//! snapshot isolation with a first-committer-wins policy.
//!
//! ```
//! use vireo::{Cx, Database};
//!
//! let db = Database::new();
//! let cx = Cx::new();
//!
//! let mut txn = db.begin(&cx)?;
//! txn.set(&cx, b"greeting", &b"hello"[..])?;
//! txn.commit(&cx)?;
//!
//! let snap = db.snapshot(&cx)?;
//! assert_eq!(snap.get(&cx, b"greeting")?.bytes(), b"hello");
//! # Ok::<(), vireo::Error>(())
//! ```
//!
//! The database holds everything in memory and nothing survives process
//! exit. There is no durability, replication, or secondary indexing.

mod commit;
mod database;
mod iter;
mod reader;
mod snapshot;
mod transaction;

pub use database::Database;
pub use reader::ValueReader;
pub use snapshot::Snapshot;
pub use transaction::Transaction;

pub use vireo_error::{Error, Result, WwCause};
pub use vireo_types::{Cx, Key, SnapshotId, TxnId, Version};

pub use vireo_mvcc as mvcc;
