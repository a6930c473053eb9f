//! File-backed shared mappings.
//!
//! A mapping here is the *owner* of ring memory: it allocates the span, keeps
//! it at a fixed address and unmaps it on drop. Rings only borrow from it.

use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

/// A read-write shared mapping of a whole file.
pub struct MmapFileMut {
    _file: File,
    mmap: MmapMut,
    path: PathBuf,
}

impl MmapFileMut {
    /// Create (or truncate) the file at `path`, size it to `size_bytes` and
    /// map it read-write. The new contents are zeroed.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        if size_bytes == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty file",
            ));
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(size_bytes)?;

        // SAFETY: the mapping is shared with other processes by design; all
        // concurrent access goes through the ring's atomic head/tail protocol.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: file,
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing file and map it read-write.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        // SAFETY: see `create_rw`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: file,
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Raw pointer to the start of the mapping. Stable for the lifetime of
    /// `self`.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
