//! Domain entities
//!
//! Passive records describing the storage objects found on the machine.

mod disk;
mod partition;
mod volume;

pub use disk::{Disk, MediaType, PartitionStyle};
pub use partition::{Partition, PartitionId};
pub use volume::{DiskExtent, RAW_FILESYSTEM, Volume};
