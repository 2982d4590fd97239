//! Multi-version storage primitives for vireo.
//!
//! This crate implements the two leaf components of the engine:
//!
//! - [`VersionedValue`]: a single (version, payload-or-tombstone) record.
//! - [`VersionHistory`]: the sorted sequence of retained versions for one
//!   key, supporting point-in-time fetch, append, and compaction.
//!
//! Histories are logically immutable: `append` and `compact` return new
//! histories, and the database publishes replacements atomically via `Arc`
//! swap. A reader holding an `Arc<VersionHistory>` can walk it without any
//! locking; a concurrent commit never mutates it in place.

pub mod history;
pub mod value;

pub use history::VersionHistory;
pub use value::VersionedValue;
