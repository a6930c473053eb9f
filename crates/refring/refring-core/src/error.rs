use std::fmt;

/// Externally supplied cell a ring buffer must be bound to before use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cell {
    Region,
    Head,
    Tail,
    ConsumeSignal,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cell::Region => "backing region",
            Cell::Head => "head index",
            Cell::Tail => "tail index",
            Cell::ConsumeSignal => "consume signal counter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    #[error("capacity {0} is not a power of two")]
    CapacityNotPowerOfTwo(u32),

    #[error("scale must be non-zero")]
    ZeroScale,

    #[error("{0} is not bound")]
    Unbound(Cell),

    #[error("backing region pointer is null")]
    NullRegion,

    #[error("backing region holds {actual} bytes, ring needs {required}")]
    RegionTooSmall { required: u64, actual: usize },

    #[error("bad magic")]
    BadMagic,

    #[error("wrong version {found}, expected {expected}")]
    VersionMismatch { found: u64, expected: u64 },
}
