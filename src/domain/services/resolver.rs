//! Name resolution
//!
//! Maps a user-supplied name to one catalog entry. Lookup order is volume,
//! disk, partition; a name matching none of them is a plain file path.

use crate::domain::catalog::Catalog;
use crate::domain::entities::{Disk, Partition, Volume};
use std::fmt;

/// The storage object a name refers to
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Volume(&'a Volume),
    Disk(&'a Disk),
    Partition(&'a Partition),
    File(&'a str),
}

impl Target<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Volume(_) => "volume",
            Target::Disk(_) => "disk",
            Target::Partition(_) => "partition",
            Target::File(_) => "file",
        }
    }
}

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Volume(v) => write!(f, "{}", v.name),
            Target::Disk(d) => write!(f, "{}", d.path),
            Target::Partition(p) => write!(f, "{}", p.path),
            Target::File(path) => write!(f, "{path}"),
        }
    }
}

pub struct Resolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, name: &'a str) -> Target<'a> {
        if let Some(volume) = self.find_volume(name) {
            return Target::Volume(volume);
        }
        if let Some(disk) = self.find_disk(name) {
            return Target::Disk(disk);
        }
        if let Some(partition) = self.find_partition(name) {
            return Target::Partition(partition);
        }
        Target::File(name)
    }

    pub fn find_volume(&self, name: &str) -> Option<&'a Volume> {
        self.catalog.volumes().iter().find(|v| v.answers_to(name))
    }

    /// Matches the device path, or a bare disk number
    pub fn find_disk(&self, name: &str) -> Option<&'a Disk> {
        let by_path = self
            .catalog
            .disks()
            .iter()
            .find(|d| d.path.eq_ignore_ascii_case(name));

        by_path.or_else(|| {
            name.parse::<u32>()
                .ok()
                .and_then(|number| self.catalog.disk(number))
        })
    }

    /// Whether `name` reaches a disk only through its bare number
    pub fn is_disk_number(&self, name: &str) -> bool {
        self.find_volume(name).is_none()
            && matches!(self.find_disk(name), Some(disk) if !disk.path.eq_ignore_ascii_case(name))
    }

    pub fn find_partition(&self, name: &str) -> Option<&'a Partition> {
        self.catalog
            .partitions()
            .find(|p| p.path.eq_ignore_ascii_case(name))
    }

    pub fn find_partition_at(&self, disk: u32, offset: u64) -> Option<&'a Partition> {
        self.catalog.partition_at(disk, offset)
    }
}
