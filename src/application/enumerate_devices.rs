//! Enumerate devices use case
//!
//! Builds the catalog snapshot: a disk pass probing every disk index, then a
//! volume pass over the OS volume sequence.

use crate::application::dto::EnumerationOptions;
use crate::domain::Catalog;
use crate::domain::entities::{Disk, Partition, PartitionStyle, Volume};
use crate::domain::repositories::DeviceDirectory;
use crate::error::{DeviceError, Result};
use tracing::{debug, warn};

pub struct EnumerateDevicesUseCase {
    options: EnumerationOptions,
}

impl EnumerateDevicesUseCase {
    pub fn new(options: EnumerationOptions) -> Self {
        Self { options }
    }

    /// Runs both passes. Only a failure of the volume enumeration mechanism
    /// is fatal; missing disks and unreadable volumes are not.
    pub fn execute<D: DeviceDirectory + ?Sized>(&self, directory: &D) -> Result<Catalog> {
        let (disks, partitions) = self.enumerate_disks(directory);
        let volumes = self.enumerate_volumes(directory)?;

        debug!(
            "Catalog built: {} disks, {} partitions, {} volumes",
            disks.len(),
            partitions.len(),
            volumes.len()
        );

        Ok(Catalog::new(disks, partitions, volumes))
    }

    fn enumerate_disks<D: DeviceDirectory + ?Sized>(
        &self,
        directory: &D,
    ) -> (Vec<Disk>, Vec<Partition>) {
        let mut disks = Vec::new();
        let mut partitions = Vec::new();

        for number in 0..self.options.max_disks {
            let Some(probe) = directory.probe_disk(number) else {
                continue;
            };

            let disk = Disk {
                number,
                path: probe.path,
                size: probe.size,
                sector_size: probe.sector_size,
                media: probe.media,
                style: probe
                    .layout
                    .as_ref()
                    .map_or(PartitionStyle::Raw, |layout| layout.style),
                partitions: Vec::new(),
            };
            debug!("Found {} ({} bytes, {})", disk.path, disk.size, disk.style);

            for entry in probe.layout.into_iter().flat_map(|layout| layout.entries) {
                if entry.number == 0 {
                    continue;
                }

                let partition = Partition {
                    disk: number,
                    number: entry.number,
                    offset: entry.offset,
                    size: entry.size,
                    path: entry.path,
                };

                if !disk.contains(&partition) {
                    warn!(
                        "Ignoring {}: offset={} size={} lies outside {} bytes of {}",
                        partition.path, partition.offset, partition.size, disk.size, disk.path
                    );
                    continue;
                }

                partitions.push(partition);
            }

            disks.push(disk);
        }

        (disks, partitions)
    }

    fn enumerate_volumes<D: DeviceDirectory + ?Sized>(&self, directory: &D) -> Result<Vec<Volume>> {
        let names = directory
            .volume_names()
            .map_err(DeviceError::Enumeration)?;

        let volumes = names
            .into_iter()
            .map(|name| {
                let aliases = directory.volume_aliases(&name);
                let mut volume = match directory.query_volume(&name) {
                    Ok(details) => Volume {
                        name,
                        size: details.size,
                        label: details.label,
                        file_system: details.file_system,
                        extents: details.extents,
                        ..Volume::default()
                    },
                    Err(e) => {
                        debug!("Volume {} is inaccessible: {}", name, e);
                        Volume::inaccessible(name)
                    }
                };
                volume.device_name = aliases.device_name;
                volume.mount_paths = aliases.mount_paths;
                volume
            })
            .collect();

        Ok(volumes)
    }
}

impl Default for EnumerateDevicesUseCase {
    fn default() -> Self {
        Self::new(EnumerationOptions::default())
    }
}
