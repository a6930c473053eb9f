//! Wait-free single-producer, single-consumer ring over borrowed memory.
//!
//! A [`RefRingBuffer`] owns nothing but its configuration. The backing bytes,
//! the head and tail index cells and the flow-control counter are bound from
//! outside (a memory-mapped file, memory registered for remote access, or
//! plain caller-owned values) and only borrowed for `'a`.
//!
//! # Design
//! - **Writer**: the only side that stores to the tail. Copies data in, then
//!   publishes the new tail.
//! - **Reader**: the only side that stores to the head. Copies data out, then
//!   publishes the new head.
//! - Every index load and store is `SeqCst`. The index store is always the
//!   last step of a transfer, so it is the single point at which bytes change
//!   hands.
//!
//! Neither side ever waits. A full ring makes `write` return 0, an empty one
//! makes `read` return 0; retry policy is the caller's.
//!
//! Besides the copying `write` and `read`, each half can hand out a
//! [`WriteChunk`] or [`ReadChunk`]: a contiguous, unit-aligned window into
//! the region that is published only when committed.
//!
//! # Thread Safety
//! - [`RingWriter`] and [`RingReader`] are `Send` but NOT `Clone`.
//! - Both borrow the ring mutably through [`RefRingBuffer::split`], so the
//!   configuration cannot change while a transfer can be in flight.

use crate::chunk::{ReadChunk, WriteChunk};
use crate::config::RingConfig;
use crate::error::{Cell, RingError};
use crate::region::Region;
use std::ffi::c_void;
use std::fmt::Write as _;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::debug;

/// Opaque handle to a DMA buffer descriptor.
///
/// Stored and handed back verbatim; the ring never dereferences it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DmaHandle(NonNull<c_void>);

// SAFETY: never dereferenced by this crate.
unsafe impl Send for DmaHandle {}
unsafe impl Sync for DmaHandle {}

impl DmaHandle {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Local and remote descriptors registered for the backing region.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DmaDescriptors {
    pub local: Option<DmaHandle>,
    pub remote: Option<DmaHandle>,
}

/// Passive state carried for the transport. Nothing in the ring acts on it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RingFlags {
    /// The ring carries a control channel rather than payload.
    pub serve_ctrl: bool,
    /// Transfers out of the ring are paced by a DMA timer.
    pub dma_pace: bool,
    /// A snapshot is being recorded.
    pub hold_snapshot: bool,
    /// Buffer position recorded for the snapshot.
    pub snapshot_position: u32,
    /// The peer expects flow-control counter updates from the reader.
    pub require_consume_signal: bool,
}

/// A reference ring buffer: configuration plus bindings to external memory.
#[derive(Debug, Default)]
pub struct RefRingBuffer<'a> {
    config: RingConfig,
    region: Option<Region<'a>>,
    head: Option<&'a AtomicU32>,
    tail: Option<&'a AtomicU32>,
    consume_signal: Option<&'a AtomicU64>,
    flags: RingFlags,
    dma: DmaDescriptors,
}

impl<'a> RefRingBuffer<'a> {
    pub fn new(config: RingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// See [`RingConfig::set_capacity_units`].
    pub fn set_capacity_units(&mut self, value: u32) -> Result<(), RingError> {
        self.config.set_capacity_units(value)
    }

    /// See [`RingConfig::set_scale`].
    pub fn set_scale(&mut self, value: u32) -> Result<(), RingError> {
        self.config.set_scale(value)
    }

    #[inline]
    pub fn capacity_bytes(&self) -> u64 {
        self.config.capacity_bytes()
    }

    pub fn bind_region(&mut self, region: Region<'a>) {
        debug!(len = region.len(), "bound ring region");
        self.region = Some(region);
    }

    pub fn bind_head(&mut self, cell: &'a AtomicU32) {
        self.head = Some(cell);
    }

    pub fn bind_tail(&mut self, cell: &'a AtomicU32) {
        self.tail = Some(cell);
    }

    pub fn bind_consume_signal(&mut self, cell: &'a AtomicU64) {
        self.consume_signal = Some(cell);
    }

    pub fn region(&self) -> Option<&Region<'a>> {
        self.region.as_ref()
    }

    pub fn flags(&self) -> &RingFlags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut RingFlags {
        &mut self.flags
    }

    pub fn set_dma_descriptors(&mut self, local: Option<DmaHandle>, remote: Option<DmaHandle>) {
        self.dma = DmaDescriptors { local, remote };
    }

    pub fn dma_descriptors(&self) -> DmaDescriptors {
        self.dma
    }

    /// Splits the ring into its writer and reader halves.
    ///
    /// Fails fast if the region, head or tail is unbound, or if the region is
    /// shorter than the configured byte capacity. After this succeeds every
    /// transfer stays inside the region.
    pub fn split(&mut self) -> Result<(RingWriter<'_, 'a>, RingReader<'_, 'a>), RingError> {
        let indices = self.indices()?;
        let region = self.region.as_ref().ok_or(RingError::Unbound(Cell::Region))?;
        let required = self.config.capacity_bytes();
        if (region.len() as u64) < required {
            return Err(RingError::RegionTooSmall {
                required,
                actual: region.len(),
            });
        }

        debug!(
            capacity_units = self.config.capacity_units(),
            scale = self.config.scale(),
            region_len = region.len(),
            "ring split into writer and reader"
        );

        let writer = RingWriter {
            config: self.config,
            region,
            indices,
        };
        let reader = RingReader {
            config: self.config,
            region,
            indices,
            consume_signal: self.consume_signal,
        };
        Ok((writer, reader))
    }

    /// See [`RingReader::add_consume_signal`].
    pub fn add_consume_signal(&self, value: u64) -> Result<u64, RingError> {
        add_consume_signal(self.consume_signal, value)
    }

    /// See [`RingWriter::write_available_bytes`].
    pub fn write_available_bytes(&self) -> Result<u64, RingError> {
        Ok(self.indices()?.writable(&self.config))
    }

    /// See [`RingReader::read_available_bytes`].
    pub fn read_available_bytes(&self) -> Result<u64, RingError> {
        Ok(self.indices()?.readable(&self.config))
    }

    /// Best-effort hex dump of the first `len` bytes of the region.
    ///
    /// Debugging aid only; the format is not stable. Bytes a peer process is
    /// writing concurrently may be observed half-updated.
    pub fn hex_dump(&self, len: usize) -> Result<String, RingError> {
        let region = self.region.as_ref().ok_or(RingError::Unbound(Cell::Region))?;
        let mut bytes = vec![0u8; len.min(region.len())];
        // SAFETY: halves borrow `self` mutably, so no writer or reader of this
        // ring is live while `&self` is held.
        unsafe { region.copy_out(0, &mut bytes) };

        let mut out = String::with_capacity(bytes.len() * 3);
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{b:02x}");
        }
        Ok(out)
    }

    /// Emits [`RefRingBuffer::hex_dump`] at debug level.
    pub fn log_dump(&self, len: usize) -> Result<(), RingError> {
        let dump = self.hex_dump(len)?;
        debug!(len, %dump, "ring region dump");
        Ok(())
    }

    fn indices(&self) -> Result<Indices<'a>, RingError> {
        Ok(Indices {
            head: self.head.ok_or(RingError::Unbound(Cell::Head))?,
            tail: self.tail.ok_or(RingError::Unbound(Cell::Tail))?,
        })
    }
}

/// The writer half of a reference ring. Only this half stores to the tail.
#[derive(Debug)]
pub struct RingWriter<'b, 'a> {
    config: RingConfig,
    region: &'b Region<'a>,
    indices: Indices<'a>,
}

/// The reader half of a reference ring. Only this half stores to the head.
#[derive(Debug)]
pub struct RingReader<'b, 'a> {
    config: RingConfig,
    region: &'b Region<'a>,
    indices: Indices<'a>,
    consume_signal: Option<&'a AtomicU64>,
}

impl RingWriter<'_, '_> {
    /// Copies as much of `data` as currently fits into the ring.
    ///
    /// Returns the number of bytes written, which is always a multiple of
    /// `scale` and may be less than `data.len()` (zero when full). A short
    /// write is not an error.
    ///
    /// One unit of capacity is always left free, so a full ring never has
    /// `tail == head`.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let cfg = &self.config;
        let tail = self.indices.tail.load(Ordering::SeqCst);
        let head = self.indices.head.load(Ordering::SeqCst);

        let free = writable_bytes(cfg, head, tail);
        let len = cfg.align_down((data.len() as u64).min(free)) as usize;
        if len == 0 {
            return 0;
        }

        let pos = cfg.write_position_from_units(tail);
        let to_end = cfg.capacity_bytes() as usize - pos;
        // SAFETY: bytes in [tail, tail + len) are free, so the reader is not
        // touching them until the tail store below publishes them.
        unsafe {
            if to_end < len {
                self.region.copy_in(pos, &data[..to_end]);
                self.region.copy_in(0, &data[to_end..len]);
            } else {
                self.region.copy_in(pos, &data[..len]);
            }
        }

        let units = (len as u64 / cfg.scale() as u64) as u32;
        self.indices
            .tail
            .store(tail.wrapping_add(units), Ordering::SeqCst);
        len
    }

    /// Bytes a write could accept right now.
    ///
    /// Advisory: the reader may free more space at any moment, so this is a
    /// lower bound.
    pub fn write_available_bytes(&self) -> u64 {
        self.indices.writable(&self.config)
    }

    /// Bytes written but not yet consumed. Advisory.
    pub fn read_available_bytes(&self) -> u64 {
        self.indices.readable(&self.config)
    }

    /// Reserves exactly `len` contiguous bytes at the tail for in-place
    /// filling.
    ///
    /// Returns `None` if `len` is zero or not a multiple of `scale`, or if
    /// fewer than `len` free bytes lie between the tail and the end of the
    /// region. Nothing is visible to the reader until
    /// [`WriteChunk::commit`]; dropping the chunk discards it.
    pub fn try_reserve(&mut self, len: usize) -> Option<WriteChunk<'_>> {
        let cfg = &self.config;
        if len == 0 || cfg.align_down(len as u64) != len as u64 {
            return None;
        }
        let tail = self.indices.tail.load(Ordering::SeqCst);
        let head = self.indices.head.load(Ordering::SeqCst);

        let pos = cfg.write_position_from_units(tail);
        let to_end = cfg.capacity_bytes() - pos as u64;
        if writable_bytes(cfg, head, tail).min(to_end) < len as u64 {
            return None;
        }

        let units = (len as u64 / cfg.scale() as u64) as u32;
        // SAFETY: the span is free and inside the region; the reader does not
        // touch it until the commit publishes it, and `&mut self` keeps a
        // second reservation or write from overlapping it.
        let bytes = unsafe { self.region.slice_mut(pos, len) };
        Some(WriteChunk::new(bytes, self.indices.tail, tail.wrapping_add(units)))
    }

    pub fn head_units(&self) -> u32 {
        self.indices.head_units()
    }

    pub fn tail_units(&self) -> u32 {
        self.indices.tail_units()
    }

    pub fn head_bytes(&self) -> u64 {
        self.config.units_to_bytes(self.head_units())
    }

    pub fn tail_bytes(&self) -> u64 {
        self.config.units_to_bytes(self.tail_units())
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }
}

impl RingReader<'_, '_> {
    /// Copies available bytes out of the ring into `buf`.
    ///
    /// `count` of `None` or `Some(0)` reads everything available; `Some(n)`
    /// reads at most `n` bytes. The read is always additionally bounded by
    /// `buf.len()` and truncated to a multiple of `scale`. Returns the number
    /// of bytes read; zero leaves the head untouched.
    ///
    /// A tail that claims more than a full ring (a misbehaving peer) is
    /// clamped to the capacity instead of reading past the region.
    pub fn read(&mut self, buf: &mut [u8], count: Option<usize>) -> usize {
        let cfg = &self.config;
        let head = self.indices.head.load(Ordering::SeqCst);
        let tail = self.indices.tail.load(Ordering::SeqCst);

        let mut available = cfg.distance_bytes(head, tail).min(cfg.capacity_bytes());
        if let Some(n) = count.filter(|&n| n > 0) {
            available = available.min(n as u64);
        }
        available = available.min(buf.len() as u64);
        let len = cfg.align_down(available) as usize;
        if len == 0 {
            return 0;
        }

        let pos = cfg.read_position_from_units(head);
        let to_end = cfg.capacity_bytes() as usize - pos;
        // SAFETY: bytes in [head, head + len) were published by the writer's
        // tail store and are not rewritten until the head store below.
        unsafe {
            if to_end < len {
                self.region.copy_out(pos, &mut buf[..to_end]);
                self.region.copy_out(0, &mut buf[to_end..len]);
            } else {
                self.region.copy_out(pos, &mut buf[..len]);
            }
        }

        let units = (len as u64 / cfg.scale() as u64) as u32;
        self.indices
            .head
            .store(head.wrapping_add(units), Ordering::SeqCst);
        len
    }

    /// Adds `value` to the flow-control counter and returns the previous
    /// value.
    ///
    /// The reader calls this after freeing space. Deciding when the total is
    /// worth reporting to a peer is up to whoever reads and clears the
    /// counter, and that side must use atomic loads and swaps on the same
    /// cell.
    pub fn add_consume_signal(&self, value: u64) -> Result<u64, RingError> {
        add_consume_signal(self.consume_signal, value)
    }

    /// Clears the flow-control counter and returns what it held.
    ///
    /// For a notifier that runs on the reader's thread: once it has reported
    /// the freed bytes to the peer it starts counting from zero again.
    pub fn take_consume_signal(&self) -> Result<u64, RingError> {
        let cell = self
            .consume_signal
            .ok_or(RingError::Unbound(Cell::ConsumeSignal))?;
        Ok(cell.swap(0, Ordering::SeqCst))
    }

    /// Borrows the largest contiguous run of readable bytes in place.
    ///
    /// The run stops at the end of the region even if more bytes wait at its
    /// start; the next call picks those up. `None` when the ring is empty.
    pub fn read_chunk(&mut self) -> Option<ReadChunk<'_>> {
        let (head, contiguous) = self.contiguous_readable();
        let len = self.config.align_down(contiguous) as usize;
        if len == 0 {
            return None;
        }
        Some(self.chunk_at(head, len))
    }

    /// Borrows exactly `len` contiguous readable bytes in place.
    ///
    /// `None` if `len` is zero or not a multiple of `scale`, or if fewer than
    /// `len` bytes are readable before the end of the region.
    pub fn read_exact(&mut self, len: usize) -> Option<ReadChunk<'_>> {
        if len == 0 || self.config.align_down(len as u64) != len as u64 {
            return None;
        }
        let (head, contiguous) = self.contiguous_readable();
        if contiguous < len as u64 {
            return None;
        }
        Some(self.chunk_at(head, len))
    }

    /// Bytes ready to be read. Advisory: the writer may publish more at any
    /// moment, so this is a lower bound.
    pub fn read_available_bytes(&self) -> u64 {
        self.indices.readable(&self.config)
    }

    /// Bytes a write could accept right now. Advisory.
    pub fn write_available_bytes(&self) -> u64 {
        self.indices.writable(&self.config)
    }

    pub fn head_units(&self) -> u32 {
        self.indices.head_units()
    }

    pub fn tail_units(&self) -> u32 {
        self.indices.tail_units()
    }

    pub fn head_bytes(&self) -> u64 {
        self.config.units_to_bytes(self.head_units())
    }

    pub fn tail_bytes(&self) -> u64 {
        self.config.units_to_bytes(self.tail_units())
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// Head plus the readable bytes between it and the end of the region.
    fn contiguous_readable(&self) -> (u32, u64) {
        let cfg = &self.config;
        let head = self.indices.head.load(Ordering::SeqCst);
        let tail = self.indices.tail.load(Ordering::SeqCst);
        let pos = cfg.read_position_from_units(head);
        let to_end = cfg.capacity_bytes() - pos as u64;
        (head, cfg.distance_bytes(head, tail).min(to_end))
    }

    fn chunk_at(&mut self, head: u32, len: usize) -> ReadChunk<'_> {
        let cfg = &self.config;
        let pos = cfg.read_position_from_units(head);
        let units = (len as u64 / cfg.scale() as u64) as u32;
        // SAFETY: the span was published by the writer's tail store and lies
        // inside the region; the writer does not rewrite it until the head
        // moves past it, which only the chunk's commit does.
        let bytes = unsafe { self.region.slice(pos, len) };
        ReadChunk::new(bytes, self.indices.head, head.wrapping_add(units))
    }
}

#[derive(Debug, Copy, Clone)]
struct Indices<'a> {
    head: &'a AtomicU32,
    tail: &'a AtomicU32,
}

impl Indices<'_> {
    #[inline(always)]
    fn head_units(&self) -> u32 {
        self.head.load(Ordering::SeqCst)
    }

    #[inline(always)]
    fn tail_units(&self) -> u32 {
        self.tail.load(Ordering::SeqCst)
    }

    #[inline(always)]
    fn readable(&self, cfg: &RingConfig) -> u64 {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        cfg.distance_bytes(head, tail)
    }

    #[inline(always)]
    fn writable(&self, cfg: &RingConfig) -> u64 {
        let tail = self.tail.load(Ordering::SeqCst);
        let head = self.head.load(Ordering::SeqCst);
        writable_bytes(cfg, head, tail)
    }
}

/// Free bytes minus the one unit that is always kept empty.
#[inline(always)]
fn writable_bytes(cfg: &RingConfig, head: u32, tail: u32) -> u64 {
    cfg.capacity_bytes()
        .saturating_sub(cfg.distance_bytes(head, tail))
        .saturating_sub(cfg.scale() as u64)
}

#[inline(always)]
fn add_consume_signal(cell: Option<&AtomicU64>, value: u64) -> Result<u64, RingError> {
    let cell = cell.ok_or(RingError::Unbound(Cell::ConsumeSignal))?;
    Ok(cell.fetch_add(value, Ordering::SeqCst))
}
