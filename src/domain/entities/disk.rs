//! Physical disk entity

use super::partition::{Partition, PartitionId};
use std::fmt;

/// Media classification reported by the drive geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Fixed,
    Removable,
    Unknown,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Fixed => write!(f, "Fixed"),
            MediaType::Removable => write!(f, "Removable"),
            MediaType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Partition table style of a disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStyle {
    Mbr,
    Gpt,
    /// No recognised partition table
    Raw,
}

impl fmt::Display for PartitionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionStyle::Mbr => write!(f, "Mbr"),
            PartitionStyle::Gpt => write!(f, "Gpt"),
            PartitionStyle::Raw => write!(f, "Raw"),
        }
    }
}

/// A physical (or virtual) block device addressed by its disk number
///
/// The disk keeps only the keys of its partitions; the partition records
/// themselves live in the catalog's arena.
#[derive(Debug, Clone)]
pub struct Disk {
    /// OS disk index
    pub number: u32,
    /// Canonical device path (e.g. `\\.\PhysicalDrive0`, `/dev/sda`)
    pub path: String,
    /// Total size in bytes
    pub size: u64,
    /// Logical sector size in bytes
    pub sector_size: u32,
    pub media: MediaType,
    pub style: PartitionStyle,
    /// Partitions in partition-table order
    pub partitions: Vec<PartitionId>,
}

impl Disk {
    /// Whether the partition lies entirely inside this disk's address space
    pub fn contains(&self, partition: &Partition) -> bool {
        partition.disk == self.number && partition.end().is_some_and(|end| end <= self.size)
    }
}
