//! Range iteration shared by snapshots and transactions.
//!
//! Both handle kinds iterate the same way: collect the candidate key set up
//! front, sort it, then re-fetch every key at the handle's pinned version.
//! Because histories only ever grow by appends of strictly greater versions,
//! a fetch at a fixed version is stable — commits that land mid-iteration
//! cannot change what the sequence yields.
//!
//! Errors surface through a caller-supplied slot (`&mut Option<Error>`)
//! checked after the sequence ends; "not found" (a key tombstoned at the
//! read version, or buffered as a delete) is filtered silently.

use vireo_error::{Error, Result};
use vireo_types::Key;

use crate::reader::ValueReader;

/// Reject ranges where both bounds are set and `begin` sorts after `end`.
///
/// An empty bound means "unbounded" and is never an error.
pub(crate) fn validate_range(begin: &[u8], end: &[u8]) -> Result<()> {
    if !begin.is_empty() && !end.is_empty() && begin > end {
        return Err(Error::InvalidRange {
            begin: begin.to_vec(),
            end: end.to_vec(),
        });
    }
    Ok(())
}

/// Whether `key` falls in the half-open range `[begin, end)`, with empty
/// bounds treated as unbounded.
pub(crate) fn in_range(begin: &[u8], end: &[u8], key: &[u8]) -> bool {
    (begin.is_empty() || key >= begin) && (end.is_empty() || key < end)
}

/// Lazy `(key, reader)` sequence over a pre-collected, pre-ordered key set.
///
/// `fetch` is the handle-specific point read; it runs once per yielded key,
/// which is what records transaction reads into the read set during
/// iteration.
pub(crate) struct RangeIter<'a, F> {
    keys: std::vec::IntoIter<Key>,
    fetch: F,
    errp: &'a mut Option<Error>,
}

impl<'a, F> RangeIter<'a, F>
where
    F: FnMut(&[u8]) -> Result<ValueReader>,
{
    pub(crate) fn new(keys: Vec<Key>, errp: &'a mut Option<Error>, fetch: F) -> Self {
        Self {
            keys: keys.into_iter(),
            fetch,
            errp,
        }
    }
}

impl<F> Iterator for RangeIter<'_, F>
where
    F: FnMut(&[u8]) -> Result<ValueReader>,
{
    type Item = (Key, ValueReader);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = self.keys.next()?;
            match (self.fetch)(&key) {
                Ok(reader) => return Some((key, reader)),
                Err(err) if err.is_not_found() => continue,
                Err(err) => {
                    if !matches!(err, Error::Interrupted) {
                        tracing::warn!(
                            key = %String::from_utf8_lossy(&key),
                            error = %err,
                            "range fetch failed, terminating iteration"
                        );
                    }
                    *self.errp = Some(err);
                    // Drain the remaining keys so the sequence stays done.
                    self.keys = Vec::new().into_iter();
                    return None;
                }
            }
        }
    }
}
