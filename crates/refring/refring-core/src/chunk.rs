//! In-place windows into the ring region.
//!
//! A [`WriteChunk`] is free space at the tail that the caller fills directly;
//! a [`ReadChunk`] is published data at the head that the caller inspects
//! without copying. Either one moves its index only on `commit`, with the
//! same `SeqCst` store the copying transfers use. A chunk never spans the
//! wrap point, so it always derefs to a single slice.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

/// Reserved free space at the tail. See [`RingWriter::try_reserve`].
///
/// Dropping the chunk without committing leaves the tail where it was.
///
/// [`RingWriter::try_reserve`]: crate::RingWriter::try_reserve
#[derive(Debug)]
pub struct WriteChunk<'w> {
    bytes: &'w mut [u8],
    tail: &'w AtomicU32,
    next: u32,
}

impl<'w> WriteChunk<'w> {
    pub(crate) fn new(bytes: &'w mut [u8], tail: &'w AtomicU32, next: u32) -> Self {
        Self { bytes, tail, next }
    }

    /// Publishes the whole chunk to the reader and returns its length.
    pub fn commit(self) -> usize {
        self.tail.store(self.next, Ordering::SeqCst);
        self.bytes.len()
    }
}

impl Deref for WriteChunk<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl DerefMut for WriteChunk<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

/// Published bytes at the head. See [`RingReader::read_chunk`].
///
/// Dropping the chunk without committing leaves the bytes in the ring for
/// the next read.
///
/// [`RingReader::read_chunk`]: crate::RingReader::read_chunk
#[derive(Debug)]
pub struct ReadChunk<'r> {
    bytes: &'r [u8],
    head: &'r AtomicU32,
    next: u32,
}

impl<'r> ReadChunk<'r> {
    pub(crate) fn new(bytes: &'r [u8], head: &'r AtomicU32, next: u32) -> Self {
        Self { bytes, head, next }
    }

    /// Releases the chunk's bytes back to the writer and returns how many
    /// were consumed.
    pub fn commit(self) -> usize {
        self.head.store(self.next, Ordering::SeqCst);
        self.bytes.len()
    }
}

impl Deref for ReadChunk<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}
