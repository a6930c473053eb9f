//! Non-owning handle to the backing byte span of a reference ring.
//!
//! The span belongs to someone else: a memory-mapped file, a region
//! registered for remote access, or a plain buffer owned by the caller. The
//! handle records where it is and how long it is, and ties that to a
//! lifetime. It never frees, resizes or reallocates the span.

use crate::error::RingError;
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

/// A borrowed byte span of length `len`, valid for `'a`.
///
/// Writer and reader access disjoint byte ranges of the span concurrently,
/// which is why the marker is an `UnsafeCell` borrow and not `&'a mut [u8]`.
pub struct Region<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _marker: PhantomData<&'a UnsafeCell<[u8]>>,
}

// SAFETY: the handle is only a pointer plus length. Concurrent access is
// partitioned by the head/tail protocol of the ring that holds it.
unsafe impl Send for Region<'_> {}
unsafe impl Sync for Region<'_> {}

impl<'a> Region<'a> {
    /// Borrows a caller-owned buffer for `'a`.
    pub fn from_slice(buf: &'a mut [u8]) -> Self {
        Self {
            ptr: NonNull::from(&mut *buf).cast(),
            len: buf.len(),
            _marker: PhantomData,
        }
    }

    /// Wraps externally managed memory.
    ///
    /// # Safety
    /// - `ptr` must be valid for reads and writes of `len` bytes for all of `'a`.
    /// - The memory must not be moved or unmapped while `'a` is live.
    /// - Nothing besides the ring's writer and reader may write to it while a
    ///   ring is bound to it.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Result<Self, RingError> {
        let ptr = NonNull::new(ptr).ok_or(RingError::NullRegion)?;
        Ok(Self {
            ptr,
            len,
            _marker: PhantomData,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Byte offset of this span inside a larger registered region starting
    /// at `region_start`. Used when a transport addresses the ring relative
    /// to the memory it registered.
    pub fn offset_in(&self, region_start: *const u8) -> usize {
        (self.ptr.as_ptr() as usize).wrapping_sub(region_start as usize)
    }

    /// Copies `src` into the span starting at `offset`.
    ///
    /// # Safety
    /// No other thread may access `offset..offset + src.len()` during the call.
    #[inline(always)]
    pub(crate) unsafe fn copy_in(&self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= self.len, "write past end of region");
        // SAFETY: bounds checked above; exclusivity is the caller's contract.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len());
        }
    }

    /// Copies `dst.len()` bytes out of the span starting at `offset`.
    ///
    /// # Safety
    /// No other thread may write `offset..offset + dst.len()` during the call.
    #[inline(always)]
    pub(crate) unsafe fn copy_out(&self, offset: usize, dst: &mut [u8]) {
        assert!(offset + dst.len() <= self.len, "read past end of region");
        // SAFETY: bounds checked above; exclusivity is the caller's contract.
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Borrows `offset..offset + len` of the span.
    ///
    /// # Safety
    /// No other thread may write the range while the slice is live.
    #[inline(always)]
    pub(crate) unsafe fn slice(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset + len <= self.len, "read past end of region");
        // SAFETY: bounds checked above; exclusivity is the caller's contract.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) }
    }

    /// Mutably borrows `offset..offset + len` of the span.
    ///
    /// # Safety
    /// No other thread may access the range while the slice is live, and no
    /// other slice of the range may exist.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        assert!(offset + len <= self.len, "write past end of region");
        // SAFETY: bounds checked above; exclusivity is the caller's contract.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len) }
    }
}

impl fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_is_rejected() {
        let res = unsafe { Region::from_raw_parts(ptr::null_mut(), 16) };
        assert_eq!(res.unwrap_err(), RingError::NullRegion);
    }

    #[test]
    fn offset_inside_registered_region() {
        let mut backing = [0u8; 64];
        let start = backing.as_ptr();
        let region = Region::from_slice(&mut backing[16..48]);
        assert_eq!(region.offset_in(start), 16);
        assert_eq!(region.len(), 32);
    }

    #[test]
    fn copies_stay_in_bounds() {
        let mut backing = [0u8; 8];
        let region = Region::from_slice(&mut backing);
        let mut out = [0u8; 3];
        unsafe {
            region.copy_in(5, &[7, 8, 9]);
            region.copy_out(5, &mut out);
        }
        assert_eq!(out, [7, 8, 9]);
    }

    #[test]
    #[should_panic(expected = "write past end of region")]
    fn copy_past_end_panics() {
        let mut backing = [0u8; 4];
        let region = Region::from_slice(&mut backing);
        unsafe { region.copy_in(2, &[1, 2, 3]) };
    }
}
