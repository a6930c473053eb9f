//! Ring buffer configuration and index arithmetic utilities.
//!
//! This module provides the unit/byte bookkeeping shared by both halves of a
//! reference ring:
//! - Capacity validation (unit capacity must be a power of two)
//! - Scaling between "units" and raw bytes
//! - Wraparound position computation for head and tail counters

use crate::error::RingError;
use tracing::{debug, warn};

/// Default unit capacity of a freshly constructed configuration.
pub const DEFAULT_CAPACITY_UNITS: u32 = 1024;

/// Capacity and scale of a reference ring.
///
/// Head and tail are stored as 32-bit counters in *unit* space. A unit is
/// `scale` raw bytes, so every transfer moves whole units and a memory-mapped
/// consumer downstream never observes a partial one.
///
/// The unit capacity is always a power of 2. The byte capacity
/// (`capacity_units × scale`) need not be, which is why positions are
/// computed with `%` rather than a bitmask.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingConfig {
    capacity_units: u32,
    scale: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity_units: DEFAULT_CAPACITY_UNITS,
            scale: 1,
        }
    }
}

impl RingConfig {
    /// Creates a configuration with the given unit capacity and a scale of 1.
    ///
    /// # Example
    /// ```
    /// use refring_core::RingConfig;
    /// let cfg = RingConfig::new(1024).unwrap(); // OK: 1024 = 2^10
    /// assert!(RingConfig::new(1000).is_err());  // not a power of 2
    /// ```
    pub fn new(capacity_units: u32) -> Result<Self, RingError> {
        let mut cfg = Self::default();
        cfg.set_capacity_units(capacity_units)?;
        Ok(cfg)
    }

    /// Builder-style companion to [`RingConfig::set_scale`].
    pub fn with_scale(mut self, scale: u32) -> Result<Self, RingError> {
        self.set_scale(scale)?;
        Ok(self)
    }

    /// Sets the unit capacity.
    ///
    /// Rejects anything that is not a power of two and leaves the previous
    /// capacity in place.
    pub fn set_capacity_units(&mut self, value: u32) -> Result<(), RingError> {
        if !value.is_power_of_two() {
            warn!(value, "rejected ring capacity, must be a power of 2");
            return Err(RingError::CapacityNotPowerOfTwo(value));
        }
        self.capacity_units = value;
        debug!(
            capacity_units = value,
            capacity_bytes = self.capacity_bytes(),
            "ring capacity set"
        );
        Ok(())
    }

    /// Sets the number of raw bytes per unit.
    pub fn set_scale(&mut self, value: u32) -> Result<(), RingError> {
        if value == 0 {
            return Err(RingError::ZeroScale);
        }
        self.scale = value;
        debug!(
            scale = value,
            capacity_bytes = self.capacity_bytes(),
            "ring scale set"
        );
        Ok(())
    }

    #[inline(always)]
    pub fn capacity_units(&self) -> u32 {
        self.capacity_units
    }

    #[inline(always)]
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Byte capacity, always derived from the current unit capacity and scale.
    #[inline(always)]
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_units as u64 * self.scale as u64
    }

    /// Converts a unit counter to bytes.
    ///
    /// The counter is widened to 64 bits *before* multiplying so that a unit
    /// counter close to `u32::MAX` does not overflow.
    #[inline(always)]
    pub fn units_to_bytes(&self, units: u32) -> u64 {
        units as u64 * self.scale as u64
    }

    /// Truncates a byte length down to a whole number of units.
    #[inline(always)]
    pub fn align_down(&self, len: u64) -> u64 {
        len - len % self.scale as u64
    }

    /// Byte distance from `behind` to `front`, both in unit space.
    ///
    /// Unit counters are monotonic but stored in 32 bits, so the difference
    /// is taken with wrapping arithmetic before widening.
    ///
    /// ```text
    /// behind = 0xFFFF_FFFE, front = 0x0000_0001, scale = 4
    /// front - behind (wrapping) = 3 units = 12 bytes
    /// ```
    #[inline(always)]
    pub fn distance_bytes(&self, behind: u32, front: u32) -> u64 {
        self.units_to_bytes(front.wrapping_sub(behind))
    }

    /// Offset into the backing region for a byte-space tail.
    ///
    /// # Examples
    ///
    /// With `capacity_units = 4`, `scale = 3` (capacity 12 bytes):
    /// ```text
    /// tail_bytes =  0 →  0
    /// tail_bytes =  9 →  9
    /// tail_bytes = 12 →  0  (wraps around)
    /// tail_bytes = 15 →  3
    /// ```
    #[inline(always)]
    pub fn write_position(&self, tail_bytes: u64) -> usize {
        (tail_bytes % self.capacity_bytes()) as usize
    }

    /// Offset into the backing region for a byte-space head.
    #[inline(always)]
    pub fn read_position(&self, head_bytes: u64) -> usize {
        (head_bytes % self.capacity_bytes()) as usize
    }

    #[inline(always)]
    pub fn write_position_from_units(&self, tail_units: u32) -> usize {
        self.write_position(self.units_to_bytes(tail_units))
    }

    #[inline(always)]
    pub fn read_position_from_units(&self, head_units: u32) -> usize {
        self.read_position(self.units_to_bytes(head_units))
    }
}
