mod chunk;
mod config;
mod error;
mod region;
mod ring;
mod shm;
mod shm_layout;

pub use chunk::{ReadChunk, WriteChunk};
pub use config::{DEFAULT_CAPACITY_UNITS, RingConfig};
pub use error::{Cell, RingError};
pub use region::Region;
pub use ring::{DmaDescriptors, DmaHandle, RefRingBuffer, RingFlags, RingReader, RingWriter};
pub use shm::ShmRing;
pub use shm_layout::{DATA_OFFSET, RING_MAGIC, RING_VERSION, RingHeader, bytes_for_ring};
