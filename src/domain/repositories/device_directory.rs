//! Device directory trait
//!
//! The OS query capability the enumeration pass is built on. Backends
//! translate their native primitives (drive probing, partition layout,
//! volume enumeration) into these plain records.

use crate::domain::entities::{DiskExtent, MediaType, PartitionStyle};
use std::io;

/// One entry of a disk's partition table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    /// Partition number; 0 marks an unused slot
    pub number: u32,
    pub offset: u64,
    pub size: u64,
    pub path: String,
}

/// Partition table of a disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveLayout {
    pub style: PartitionStyle,
    pub entries: Vec<PartitionEntry>,
}

/// What a successfully opened disk reports about itself
#[derive(Debug, Clone)]
pub struct DiskProbe {
    pub path: String,
    pub size: u64,
    pub sector_size: u32,
    pub media: MediaType,
    /// `None` when the layout query failed
    pub layout: Option<DriveLayout>,
}

/// Names under which a volume can be addressed besides its own
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeAliases {
    pub device_name: Option<String>,
    pub mount_paths: Vec<String>,
}

/// What an opened volume reports about itself
#[derive(Debug, Clone, Default)]
pub struct VolumeDetails {
    pub size: u64,
    pub label: Option<String>,
    pub file_system: Option<String>,
    pub extents: Vec<DiskExtent>,
}

pub trait DeviceDirectory {
    /// Opens disk `index` and queries it; `None` means no disk there
    fn probe_disk(&self, index: u32) -> Option<DiskProbe>;

    /// Runs the volume enumeration sequence to completion
    ///
    /// An error means the mechanism itself failed, not that a particular
    /// volume was unreadable.
    fn volume_names(&self) -> io::Result<Vec<String>>;

    /// Device name and mount paths of a volume
    fn volume_aliases(&self, name: &str) -> VolumeAliases;

    /// Opens the volume read-only and shared and queries it
    fn query_volume(&self, name: &str) -> io::Result<VolumeDetails>;
}
