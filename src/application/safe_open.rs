//! Safe-open protocol
//!
//! Turns a resolved target into an OS handle with the right sharing,
//! locking, dismount and unbuffered posture. Writing to a disk first locks
//! every volume that has an extent on it, then opens, dismounts and locks
//! the disk itself. The volume locks are held until the disk handle closes.

use crate::domain::Catalog;
use crate::domain::entities::{Disk, Volume};
use crate::domain::repositories::{DeviceControl, Intent};
use crate::domain::services::Target;
use crate::error::{DeviceError, Phase, Result};
use std::io::{self, Seek, SeekFrom};
use tracing::{debug, info};

/// Sector size assumed for volumes whose backing disks are unknown
pub const FALLBACK_SECTOR_SIZE: u32 = 512;

/// An opened storage object
///
/// Dropping it closes the target handle first and then releases the locked
/// aliasing volumes, last acquired first.
pub struct OpenedTarget<H> {
    // Field order is drop order: `handle` must stay first.
    handle: H,
    description: String,
    size: u64,
    base_offset: u64,
    bounded: bool,
    alignment: u64,
    held_volumes: Vec<H>,
}

impl<H> Drop for OpenedTarget<H> {
    fn drop(&mut self) {
        // Fields drop front to back after this returns.
        self.held_volumes.reverse();
    }
}

impl<H: Seek> OpenedTarget<H> {
    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Natural byte size (zero for a freshly created destination file)
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offsets and write lengths must be multiples of this
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Upper bound for addressed bytes; `None` for growable files
    pub fn capacity(&self) -> Option<u64> {
        self.bounded.then_some(self.size)
    }

    /// Number of aliasing volumes kept locked for this handle
    pub fn held_volumes(&self) -> usize {
        self.held_volumes.len()
    }

    /// Fails unless `[offset, offset + length)` fits in the target
    pub fn check_range(&self, offset: u64, length: u64) -> Result<()> {
        let Some(capacity) = self.capacity() else {
            return Ok(());
        };
        match offset.checked_add(length) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(DeviceError::OutOfRange {
                target: self.description.clone(),
                offset,
                length,
                capacity,
            }),
        }
    }

    /// Fails unless `value` is a whole number of sectors
    pub fn check_aligned(&self, what: &'static str, value: u64) -> Result<()> {
        if value % self.alignment == 0 {
            Ok(())
        } else {
            Err(DeviceError::Misaligned {
                target: self.description.clone(),
                what,
                value,
                alignment: self.alignment,
            })
        }
    }

    /// Positions the handle `offset` bytes into the target
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.check_aligned("offset", offset)?;
        let absolute = self.base_offset.checked_add(offset).ok_or_else(|| {
            DeviceError::os(
                Phase::Seek,
                self.description.clone(),
                io::Error::from(io::ErrorKind::InvalidInput),
            )
        })?;
        self.handle
            .seek(SeekFrom::Start(absolute))
            .map_err(|e| DeviceError::os(Phase::Seek, self.description.clone(), e))?;
        Ok(())
    }
}

pub struct SafeOpener<'a, C: DeviceControl> {
    catalog: &'a Catalog,
    control: &'a C,
}

impl<'a, C: DeviceControl> SafeOpener<'a, C> {
    pub fn new(catalog: &'a Catalog, control: &'a C) -> Self {
        Self { catalog, control }
    }

    pub fn open(&self, target: &Target<'_>, intent: Intent) -> Result<OpenedTarget<C::Handle>> {
        match *target {
            Target::Volume(volume) => {
                let handle = self.open_volume(volume, intent)?;
                let sector = self
                    .catalog
                    .sector_size_of(volume)
                    .unwrap_or(FALLBACK_SECTOR_SIZE);
                Ok(OpenedTarget {
                    handle,
                    description: volume.name.clone(),
                    size: volume.size,
                    base_offset: 0,
                    bounded: true,
                    alignment: u64::from(sector),
                    held_volumes: Vec::new(),
                })
            }
            Target::Disk(disk) => {
                let (handle, held_volumes) = self.open_disk(disk, intent)?;
                Ok(OpenedTarget {
                    handle,
                    description: disk.path.clone(),
                    size: disk.size,
                    base_offset: 0,
                    bounded: true,
                    alignment: u64::from(disk.sector_size.max(1)),
                    held_volumes,
                })
            }
            Target::Partition(partition) => {
                let disk = self.catalog.disk(partition.disk).ok_or_else(|| {
                    DeviceError::os(
                        Phase::Open,
                        partition.path.clone(),
                        io::Error::new(
                            io::ErrorKind::NotFound,
                            "owning disk is not in the catalog",
                        ),
                    )
                })?;
                let (handle, held_volumes) = self.open_disk(disk, intent)?;
                let mut opened = OpenedTarget {
                    handle,
                    description: partition.path.clone(),
                    size: partition.size,
                    base_offset: partition.offset,
                    bounded: true,
                    alignment: u64::from(disk.sector_size.max(1)),
                    held_volumes,
                };
                opened.seek_to(0)?;
                Ok(opened)
            }
            Target::File(path) => self.open_file(path, intent),
        }
    }

    fn open_volume(&self, volume: &Volume, intent: Intent) -> Result<C::Handle> {
        let name = volume.name.as_str();
        debug!("Opening volume {} for {:?}", name, intent);

        let handle = self
            .control
            .open_device(volume.device_path(), intent)
            .map_err(|e| DeviceError::os(Phase::Open, name, e))?;
        self.control
            .lock(&handle)
            .map_err(|e| DeviceError::os(Phase::Lock, name, e))?;
        if !volume.is_raw_filesystem() {
            self.control
                .allow_extended_io(&handle)
                .map_err(|e| DeviceError::os(Phase::ExtendedIo, name, e))?;
        }
        Ok(handle)
    }

    fn open_disk(&self, disk: &Disk, intent: Intent) -> Result<(C::Handle, Vec<C::Handle>)> {
        let mut held_volumes = Vec::new();

        if intent.is_write() {
            for volume in self.catalog.volumes_on_disk(disk.number) {
                info!("Locking volume {} on {}", volume.name, disk.path);
                held_volumes.push(self.open_volume(volume, intent)?);
            }
        }

        debug!("Opening disk {} for {:?}", disk.path, intent);
        let handle = self
            .control
            .open_device(&disk.path, intent)
            .map_err(|e| DeviceError::os(Phase::Open, disk.path.clone(), e))?;

        if intent.is_write() {
            self.control
                .dismount(&handle)
                .map_err(|e| DeviceError::os(Phase::Dismount, disk.path.clone(), e))?;
            self.control
                .lock(&handle)
                .map_err(|e| DeviceError::os(Phase::Lock, disk.path.clone(), e))?;
        }

        Ok((handle, held_volumes))
    }

    fn open_file(&self, path: &str, intent: Intent) -> Result<OpenedTarget<C::Handle>> {
        debug!("Opening file {} for {:?}", path, intent);
        let handle = self
            .control
            .open_file(path, intent)
            .map_err(|e| DeviceError::os(Phase::Open, path, e))?;
        let size = match intent {
            Intent::Read => self
                .control
                .file_size(&handle)
                .map_err(|e| DeviceError::os(Phase::Size, path, e))?,
            Intent::Write => 0,
        };

        Ok(OpenedTarget {
            handle,
            description: path.to_string(),
            size,
            base_offset: 0,
            bounded: false,
            alignment: 1,
            held_volumes: Vec::new(),
        })
    }
}
