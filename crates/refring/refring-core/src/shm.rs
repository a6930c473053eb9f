//! Reference ring living in a memory-mapped file.
//!
//! One process creates the file and writes the header; any number of
//! processes may open it, but exactly one of them writes and exactly one
//! reads. The mapping is the owner of the memory; the ring only borrows it
//! for as long as the [`ShmRing`] is alive.

use crate::config::RingConfig;
use crate::region::Region;
use crate::ring::RefRingBuffer;
use crate::shm_layout::{DATA_OFFSET, RingHeader, bytes_for_ring};
use refring_mmap::MmapFileMut;
use std::io;
use std::path::Path;
use std::ptr;
use tracing::info;

pub struct ShmRing {
    /// Owns the mapping; `base` points into it.
    _mm: MmapFileMut,
    base: *mut u8,
    config: RingConfig,
}

impl ShmRing {
    /// Creates a shared ring file at `path` and initializes its header.
    ///
    /// An existing file at `path` is truncated.
    pub fn create<P: AsRef<Path>>(path: P, config: RingConfig) -> io::Result<Self> {
        let bytes = bytes_for_ring(&config);
        let mut mm = MmapFileMut::create_rw(path, bytes as u64)?;
        let base = mm.as_mut_ptr();

        // SAFETY: the file was just created and sized for the header plus
        // data, the mapping is page aligned, and nobody else has opened it.
        unsafe { ptr::write(base as *mut RingHeader, RingHeader::new(&config)) };

        info!(
            path = %mm.path().display(),
            capacity_units = config.capacity_units(),
            scale = config.scale(),
            bytes,
            "created shared ring"
        );
        Ok(Self {
            _mm: mm,
            base,
            config,
        })
    }

    /// Maps an existing shared ring file and validates its header.
    ///
    /// # Errors
    /// - The file doesn't exist or can't be mapped
    /// - The file is too small for its header or for the capacity it declares
    /// - Bad magic, version mismatch or an invalid capacity/scale
    ///   (`io::ErrorKind::InvalidData`)
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut mm = MmapFileMut::open_rw(path)?;
        if mm.len() < DATA_OFFSET {
            return Err(invalid_data("file too small for ring header"));
        }
        let base = mm.as_mut_ptr();

        // SAFETY: the mapping is page aligned and at least header sized.
        let header = unsafe { &*(base as *const RingHeader) };
        let config = header.validate().map_err(invalid_data)?;
        if mm.len() < bytes_for_ring(&config) {
            return Err(invalid_data("file too small for declared ring capacity"));
        }

        info!(
            path = %mm.path().display(),
            capacity_units = config.capacity_units(),
            scale = config.scale(),
            "opened shared ring"
        );
        Ok(Self {
            _mm: mm,
            base,
            config,
        })
    }

    #[inline]
    pub fn header(&self) -> &RingHeader {
        // SAFETY: written by `create` or validated by `open`.
        unsafe { &*(self.base as *const RingHeader) }
    }

    pub fn config(&self) -> RingConfig {
        self.config
    }

    /// Binds a ring to the header cells and data region of this mapping.
    ///
    /// The ring borrows the mapping mutably, so one [`ShmRing`] yields at most
    /// one live ring and therefore one writer and one reader. The peer
    /// process maps the same file through its own [`ShmRing`] and uses the
    /// other half.
    ///
    /// ```compile_fail
    /// # use refring_core::{RingConfig, ShmRing};
    /// let mut shm = ShmRing::create("/tmp/refring_doc", RingConfig::default()).unwrap();
    /// let first = shm.ring().unwrap();
    /// let second = shm.ring().unwrap();
    /// drop((first, second));
    /// ```
    pub fn ring(&mut self) -> io::Result<RefRingBuffer<'_>> {
        let len = self.config.capacity_bytes() as usize;
        // SAFETY: the data region lies inside the mapping, which outlives the
        // returned ring because the ring borrows `self`.
        let data = unsafe { Region::from_raw_parts(self.base.add(DATA_OFFSET), len) }
            .map_err(invalid_data)?;
        // SAFETY: written by `create` or validated by `open`; the header is
        // not borrowed through `self` while the ring is live.
        let header = unsafe { &*(self.base as *const RingHeader) };
        header.attach(data).map_err(invalid_data)
    }
}

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}
