//! Streaming access to a fetched payload.

use std::io;
use std::sync::Arc;

/// A readable view of one value's payload.
///
/// The bytes are shared with the store (no copy at fetch time) and pinned for
/// as long as the reader lives, even if the entry is compacted away by a
/// later commit. Consume it through [`std::io::Read`], or grab the whole
/// payload with [`bytes`](Self::bytes) / [`to_vec`](Self::to_vec).
#[derive(Debug, Clone)]
pub struct ValueReader {
    payload: Arc<[u8]>,
    pos: usize,
}

impl ValueReader {
    pub(crate) fn new(payload: Arc<[u8]>) -> Self {
        Self { payload, pos: 0 }
    }

    /// The full payload, independent of the read position.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Copy the full payload out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.payload.to_vec()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl io::Read for ValueReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.payload[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}
