//! Shared fixtures: an in-memory machine with two disks and four volumes
//!
//! Disk 0 (64 KiB, MBR) has partition 1 at 4 KiB and partition 2 at 20 KiB.
//! Disk 1 (32 KiB) has no partition table.
//!
//! - `\\?\Volume{1111}\` (C:) is partition 1 of disk 0
//! - `\\?\Volume{2222}\` (E:) spans partition 2 of disk 0 and the start of disk 1
//! - `\\?\Volume{3333}\` is an unformatted (RAW) volume on disk 1
//! - `\\?\Volume{4444}\` cannot be opened

#![allow(dead_code)]

use rawdev::application::EnumerateDevicesUseCase;
use rawdev::domain::Catalog;
use rawdev::domain::entities::{MediaType, PartitionStyle};
use rawdev::infrastructure::{MemoryDevices, MemoryDisk, MemoryVolume};

pub const DISK0: &str = r"\\.\PhysicalDrive0";
pub const DISK1: &str = r"\\.\PhysicalDrive1";
pub const PARTITION1: &str = r"\\.\PhysicalDrive0\Partition1";
pub const PARTITION2: &str = r"\\.\PhysicalDrive0\Partition2";

pub const SYSTEM: &str = r"\\?\Volume{1111}\";
pub const SPANNED: &str = r"\\?\Volume{2222}\";
pub const UNFORMATTED: &str = r"\\?\Volume{3333}\";
pub const LOCKED_OUT: &str = r"\\?\Volume{4444}\";

pub const DISK0_SIZE: usize = 64 * 1024;
pub const DISK1_SIZE: usize = 32 * 1024;
pub const PARTITION1_OFFSET: u64 = 4096;
pub const PARTITION1_SIZE: u64 = 16 * 1024;
pub const PARTITION2_OFFSET: u64 = 20 * 1024;
pub const PARTITION2_SIZE: u64 = 32 * 1024;

/// The device path a volume handle is opened with
pub fn device_path(volume: &str) -> String {
    volume.trim_end_matches('\\').to_string()
}

pub fn disk0_byte(i: usize) -> u8 {
    (i % 251) as u8
}

pub fn disk1_byte(i: usize) -> u8 {
    (i % 241) as u8 ^ 0x5A
}

pub fn machine() -> MemoryDevices {
    MemoryDevices::new()
        .with_disk(
            MemoryDisk::new(0, DISK0_SIZE)
                .style(PartitionStyle::Mbr)
                .partition(1, PARTITION1_OFFSET, PARTITION1_SIZE)
                .partition(2, PARTITION2_OFFSET, PARTITION2_SIZE)
                .filled_with(disk0_byte),
        )
        .with_disk(
            MemoryDisk::new(1, DISK1_SIZE)
                .media(MediaType::Removable)
                .filled_with(disk1_byte),
        )
        .with_volume(
            MemoryVolume::new(SYSTEM)
                .device_name(r"\Device\HarddiskVolume1")
                .mount_path(r"C:\")
                .label("SYSTEM")
                .file_system("NTFS")
                .extent(0, PARTITION1_OFFSET, PARTITION1_SIZE),
        )
        .with_volume(
            MemoryVolume::new(SPANNED)
                .device_name(r"\Device\HarddiskVolume2")
                .mount_path(r"E:\")
                .file_system("NTFS")
                .extent(0, PARTITION2_OFFSET, PARTITION2_SIZE)
                .extent(1, 0, 8192),
        )
        .with_volume(
            MemoryVolume::new(UNFORMATTED)
                .file_system("RAW")
                .extent(1, 16384, 16384),
        )
        .with_volume(MemoryVolume::new(LOCKED_OUT).inaccessible())
}

pub fn catalog_of(devices: &MemoryDevices) -> Catalog {
    EnumerateDevicesUseCase::default()
        .execute(devices)
        .expect("enumeration of the in-memory machine")
}
