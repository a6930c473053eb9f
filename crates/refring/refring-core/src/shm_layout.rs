//! Shared memory layout for a reference ring placed in a mapped file.
//!
//! The header carries the cells the ring is bound to, so two processes that
//! map the same file share head, tail and the flow-control counter. The
//! layout is stable across process restarts.
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                           RingHeader                               │
//! │  ┌────────┬─────────┬────────────┬───────┬──────┬──────┬────────┐  │
//! │  │ magic  │ version │ cap_units  │ scale │ head │ tail │ signal │  │
//! │  │ (8B)   │ (8B)    │ (4B)       │ (4B)  │ (4B) │ (4B) │ (8B)   │  │
//! │  └────────┴─────────┴────────────┴───────┴──────┴──────┴────────┘  │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                   data: capacity_units × scale bytes               │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

use crate::config::RingConfig;
use crate::error::RingError;
use crate::region::Region;
use crate::ring::RefRingBuffer;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64};
use tracing::debug;

/// ASCII "REFRINGB".
pub const RING_MAGIC: u64 = 0x5245_4652_494E_4742;

/// Bump on any incompatible layout change.
pub const RING_VERSION: u64 = 1;

/// Offset of the data region from the start of the mapping.
pub const DATA_OFFSET: usize = size_of::<RingHeader>();

/// Header at offset 0 of a shared ring mapping.
#[repr(C)]
#[derive(Debug)]
pub struct RingHeader {
    pub magic: u64,
    pub version: u64,
    pub capacity_units: u32,
    pub scale: u32,
    /// Units consumed. Stored by the reader only.
    pub head: AtomicU32,
    /// Units produced. Stored by the writer only.
    pub tail: AtomicU32,
    /// Flow-control counter bumped by the reader as it frees space.
    pub consume_signal: AtomicU64,
}

impl RingHeader {
    pub fn new(config: &RingConfig) -> Self {
        Self {
            magic: RING_MAGIC,
            version: RING_VERSION,
            capacity_units: config.capacity_units(),
            scale: config.scale(),
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            consume_signal: AtomicU64::new(0),
        }
    }

    /// Checks magic and version and rebuilds the ring configuration.
    pub fn validate(&self) -> Result<RingConfig, RingError> {
        if self.magic != RING_MAGIC {
            return Err(RingError::BadMagic);
        }
        if self.version != RING_VERSION {
            return Err(RingError::VersionMismatch {
                found: self.version,
                expected: RING_VERSION,
            });
        }
        RingConfig::new(self.capacity_units)?.with_scale(self.scale)
    }

    /// Builds a ring bound to this header's cells and the given data region.
    pub fn attach<'a>(&'a self, data: Region<'a>) -> Result<RefRingBuffer<'a>, RingError> {
        let config = self.validate()?;
        debug!(
            capacity_units = config.capacity_units(),
            scale = config.scale(),
            data_len = data.len(),
            "attaching ring to shared header"
        );

        let mut ring = RefRingBuffer::new(config);
        ring.bind_region(data);
        ring.bind_head(&self.head);
        ring.bind_tail(&self.tail);
        ring.bind_consume_signal(&self.consume_signal);
        Ok(ring)
    }
}

/// Total bytes needed for a mapping: header followed by the data region.
pub fn bytes_for_ring(config: &RingConfig) -> usize {
    DATA_OFFSET + config.capacity_bytes() as usize
}
