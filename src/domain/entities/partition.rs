//! Partition entity

/// Stable key of a partition: (disk number, partition number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionId {
    pub disk: u32,
    pub number: u32,
}

/// A contiguous sub-range of a disk, as described by its partition table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub disk: u32,
    pub number: u32,
    /// Starting byte offset within the disk
    pub offset: u64,
    /// Length in bytes
    pub size: u64,
    /// Canonical device path (e.g. `\\.\PhysicalDrive0\Partition1`)
    pub path: String,
}

impl Partition {
    pub fn id(&self) -> PartitionId {
        PartitionId {
            disk: self.disk,
            number: self.number,
        }
    }

    /// First byte past the partition, `None` on overflow
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }
}
