//! Windows device backend
//!
//! Disks are `\\.\PhysicalDriveN`, volumes are `\\?\Volume{GUID}\` names
//! from the volume enumeration sequence. Handles are unbuffered std files;
//! the storage ioctls go through `DeviceIoControl` on their raw handles.

use super::device_file::DeviceFile;
use crate::domain::entities::{DiskExtent, MediaType, PartitionStyle};
use crate::domain::repositories::{
    DeviceControl, DeviceDirectory, DiskProbe, DriveLayout, Intent, PartitionEntry,
    VolumeAliases, VolumeDetails,
};
use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::AsRawHandle;
use std::ptr;
use tracing::debug;
use windows_sys::Win32::Foundation::{
    ERROR_INSUFFICIENT_BUFFER, ERROR_MORE_DATA, ERROR_NO_MORE_FILES, HANDLE,
};
use windows_sys::Win32::Storage::FileSystem::{
    FILE_FLAG_NO_BUFFERING, FILE_FLAG_SEQUENTIAL_SCAN, FILE_FLAG_WRITE_THROUGH, FILE_SHARE_READ,
    FILE_SHARE_WRITE, FindFirstVolumeW, FindNextVolumeW, FindVolumeClose,
    GetVolumeInformationByHandleW, GetVolumePathNamesForVolumeNameW, QueryDosDeviceW,
};
use windows_sys::Win32::System::IO::DeviceIoControl;
use windows_sys::Win32::System::Ioctl::{
    DISK_EXTENT, DISK_GEOMETRY, DRIVE_LAYOUT_INFORMATION_EX, FSCTL_ALLOW_EXTENDED_DASD_IO,
    FSCTL_DISMOUNT_VOLUME, FSCTL_LOCK_VOLUME, FixedMedia, GET_LENGTH_INFORMATION,
    IOCTL_DISK_GET_DRIVE_GEOMETRY, IOCTL_DISK_GET_DRIVE_LAYOUT_EX, IOCTL_DISK_GET_LENGTH_INFO,
    IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS, PARTITION_INFORMATION_EX, RemovableMedia,
    VOLUME_DISK_EXTENTS,
};

/// Room for a `\\?\Volume{GUID}\` name
const VOLUME_NAME_LEN: usize = 261;

/// Room for an NT device name such as `\Device\HarddiskVolume3`
const DEVICE_NAME_LEN: usize = 1024;

/// Starting size for variable-length ioctl replies, grown 4x on shortage
const INITIAL_IOCTL_BUFFER: usize = 4096;
const MAX_IOCTL_BUFFER: usize = 1 << 20;

const DEFAULT_SECTOR_SIZE: u32 = 512;

#[derive(Debug, Default)]
pub struct WindowsDevices;

impl WindowsDevices {
    pub fn new() -> Self {
        Self
    }

    pub fn disk_path(index: u32) -> String {
        format!(r"\\.\PhysicalDrive{}", index)
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

/// Splits a double-NUL-terminated string list
fn from_wide_multi(buf: &[u16]) -> Vec<String> {
    buf.split(|&c| c == 0)
        .take_while(|s| !s.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

fn raw(file: &File) -> HANDLE {
    file.as_raw_handle() as HANDLE
}

/// Read-only shared handle for metadata queries
fn open_for_query(path: &str) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE)
        .open(path)
}

fn ioctl(file: &File, code: u32) -> io::Result<()> {
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            raw(file),
            code,
            ptr::null(),
            0,
            ptr::null_mut(),
            0,
            &mut returned,
            ptr::null_mut(),
        )
    };
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Fixed-size ioctl reply
fn ioctl_out<T: Copy>(file: &File, code: u32) -> io::Result<T> {
    // SAFETY: only instantiated with plain C structures.
    let mut out: T = unsafe { mem::zeroed() };
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            raw(file),
            code,
            ptr::null(),
            0,
            (&mut out as *mut T).cast::<c_void>(),
            mem::size_of::<T>() as u32,
            &mut returned,
            ptr::null_mut(),
        )
    };
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(out)
    }
}

/// Variable-size ioctl reply; the buffer is `u64` words so the reply
/// structures land suitably aligned
fn ioctl_growing(file: &File, code: u32) -> io::Result<Vec<u64>> {
    let mut bytes = INITIAL_IOCTL_BUFFER;
    loop {
        let mut buf = vec![0u64; bytes / mem::size_of::<u64>()];
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                raw(file),
                code,
                ptr::null(),
                0,
                buf.as_mut_ptr().cast::<c_void>(),
                bytes as u32,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok != 0 {
            return Ok(buf);
        }

        let err = io::Error::last_os_error();
        let short = matches!(
            err.raw_os_error(),
            Some(c) if c == ERROR_INSUFFICIENT_BUFFER as i32 || c == ERROR_MORE_DATA as i32
        );
        if !short || bytes >= MAX_IOCTL_BUFFER {
            return Err(err);
        }
        bytes *= 4;
    }
}

fn read_layout(file: &File, disk_path: &str) -> io::Result<DriveLayout> {
    let buf = ioctl_growing(file, IOCTL_DISK_GET_DRIVE_LAYOUT_EX)?;
    let layout = buf.as_ptr().cast::<DRIVE_LAYOUT_INFORMATION_EX>();

    // SAFETY: the ioctl succeeded, so the buffer holds the header followed
    // by PartitionCount entries.
    let (style, raw_entries) = unsafe {
        let count = (*layout).PartitionCount as usize;
        let first = ptr::addr_of!((*layout).PartitionEntry).cast::<PARTITION_INFORMATION_EX>();
        (
            (*layout).PartitionStyle,
            std::slice::from_raw_parts(first, count),
        )
    };

    let style = match style {
        0 => PartitionStyle::Mbr,
        1 => PartitionStyle::Gpt,
        _ => PartitionStyle::Raw,
    };
    let entries = raw_entries
        .iter()
        .map(|entry| PartitionEntry {
            number: entry.PartitionNumber,
            offset: entry.StartingOffset as u64,
            size: entry.PartitionLength as u64,
            path: format!(r"{}\Partition{}", disk_path, entry.PartitionNumber),
        })
        .collect();

    Ok(DriveLayout { style, entries })
}

fn read_extents(file: &File) -> io::Result<Vec<DiskExtent>> {
    let buf = ioctl_growing(file, IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS)?;
    let header = buf.as_ptr().cast::<VOLUME_DISK_EXTENTS>();

    // SAFETY: as in read_layout.
    let raw_extents = unsafe {
        let count = (*header).NumberOfDiskExtents as usize;
        let first = ptr::addr_of!((*header).Extents).cast::<DISK_EXTENT>();
        std::slice::from_raw_parts(first, count)
    };

    Ok(raw_extents
        .iter()
        .map(|extent| DiskExtent {
            disk: extent.DiskNumber,
            offset: extent.StartingOffset as u64,
            length: extent.ExtentLength as u64,
        })
        .collect())
}

fn volume_information(file: &File) -> io::Result<(Option<String>, Option<String>)> {
    let mut label = [0u16; VOLUME_NAME_LEN];
    let mut file_system = [0u16; VOLUME_NAME_LEN];
    let ok = unsafe {
        GetVolumeInformationByHandleW(
            raw(file),
            label.as_mut_ptr(),
            label.len() as u32,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
            file_system.as_mut_ptr(),
            file_system.len() as u32,
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }

    let non_empty = |s: String| (!s.is_empty()).then_some(s);
    Ok((non_empty(from_wide(&label)), non_empty(from_wide(&file_system))))
}

impl DeviceDirectory for WindowsDevices {
    fn probe_disk(&self, index: u32) -> Option<DiskProbe> {
        let path = Self::disk_path(index);
        let file = open_for_query(&path).ok()?;

        let size = ioctl_out::<GET_LENGTH_INFORMATION>(&file, IOCTL_DISK_GET_LENGTH_INFO)
            .map(|info| info.Length as u64)
            .unwrap_or(0);
        let geometry = ioctl_out::<DISK_GEOMETRY>(&file, IOCTL_DISK_GET_DRIVE_GEOMETRY);
        let (sector_size, media) = match geometry {
            Ok(geometry) => {
                let media = if geometry.MediaType == FixedMedia {
                    MediaType::Fixed
                } else if geometry.MediaType == RemovableMedia {
                    MediaType::Removable
                } else {
                    MediaType::Unknown
                };
                (geometry.BytesPerSector.max(1), media)
            }
            Err(_) => (DEFAULT_SECTOR_SIZE, MediaType::Unknown),
        };
        let layout = match read_layout(&file, &path) {
            Ok(layout) => Some(layout),
            Err(e) => {
                debug!("No layout for {}: {}", path, e);
                None
            }
        };

        Some(DiskProbe {
            path,
            size,
            sector_size,
            media,
            layout,
        })
    }

    fn volume_names(&self) -> io::Result<Vec<String>> {
        let mut buf = [0u16; VOLUME_NAME_LEN];
        let find = unsafe { FindFirstVolumeW(buf.as_mut_ptr(), buf.len() as u32) };
        if find as isize == -1 {
            return Err(io::Error::last_os_error());
        }

        let mut names = Vec::new();
        let outcome = loop {
            names.push(from_wide(&buf));
            if unsafe { FindNextVolumeW(find, buf.as_mut_ptr(), buf.len() as u32) } == 0 {
                let err = io::Error::last_os_error();
                break if err.raw_os_error() == Some(ERROR_NO_MORE_FILES as i32) {
                    Ok(())
                } else {
                    Err(err)
                };
            }
        };
        unsafe { FindVolumeClose(find) };

        outcome.map(|()| names)
    }

    fn volume_aliases(&self, name: &str) -> VolumeAliases {
        let mut aliases = VolumeAliases::default();

        // QueryDosDevice wants `Volume{GUID}` without prefix or trailing slash.
        if let Some(short) = name.strip_prefix(r"\\?\").map(|s| s.trim_end_matches('\\')) {
            let short = wide(short);
            let mut buf = vec![0u16; DEVICE_NAME_LEN];
            let len =
                unsafe { QueryDosDeviceW(short.as_ptr(), buf.as_mut_ptr(), buf.len() as u32) };
            if len != 0 {
                aliases.device_name = Some(from_wide(&buf));
            }
        }

        let name_w = wide(name);
        let mut buf = vec![0u16; VOLUME_NAME_LEN];
        loop {
            let mut needed = 0u32;
            let ok = unsafe {
                GetVolumePathNamesForVolumeNameW(
                    name_w.as_ptr(),
                    buf.as_mut_ptr(),
                    buf.len() as u32,
                    &mut needed,
                )
            };
            if ok != 0 {
                aliases.mount_paths = from_wide_multi(&buf);
                break;
            }
            let more = io::Error::last_os_error().raw_os_error() == Some(ERROR_MORE_DATA as i32);
            if !more || needed as usize <= buf.len() {
                break;
            }
            buf = vec![0u16; needed as usize];
        }

        aliases
    }

    fn query_volume(&self, name: &str) -> io::Result<VolumeDetails> {
        let file = open_for_query(name.trim_end_matches('\\'))?;

        let size = ioctl_out::<GET_LENGTH_INFORMATION>(&file, IOCTL_DISK_GET_LENGTH_INFO)
            .map(|info| info.Length as u64)
            .unwrap_or(0);
        let (label, file_system) = volume_information(&file).unwrap_or((None, None));
        let extents = read_extents(&file).unwrap_or_default();

        Ok(VolumeDetails {
            size,
            label,
            file_system,
            extents,
        })
    }
}

impl DeviceControl for WindowsDevices {
    type Handle = DeviceFile;

    fn open_device(&self, path: &str, intent: Intent) -> io::Result<DeviceFile> {
        let mut flags = FILE_FLAG_NO_BUFFERING;
        if intent.is_write() {
            flags |= FILE_FLAG_WRITE_THROUGH;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(intent.is_write())
            .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE)
            .custom_flags(flags)
            .open(path)?;
        Ok(DeviceFile::new(file, path))
    }

    fn open_file(&self, path: &str, intent: Intent) -> io::Result<DeviceFile> {
        let mut options = OpenOptions::new();
        options
            .share_mode(FILE_SHARE_READ)
            .custom_flags(FILE_FLAG_SEQUENTIAL_SCAN);
        match intent {
            Intent::Read => options.read(true),
            Intent::Write => options.write(true).create(true).truncate(true),
        };
        Ok(DeviceFile::new(options.open(path)?, path))
    }

    fn lock(&self, handle: &DeviceFile) -> io::Result<()> {
        ioctl(handle.file(), FSCTL_LOCK_VOLUME)
    }

    fn dismount(&self, handle: &DeviceFile) -> io::Result<()> {
        ioctl(handle.file(), FSCTL_DISMOUNT_VOLUME)
    }

    fn allow_extended_io(&self, handle: &DeviceFile) -> io::Result<()> {
        ioctl(handle.file(), FSCTL_ALLOW_EXTENDED_DASD_IO)
    }

    fn file_size(&self, handle: &DeviceFile) -> io::Result<u64> {
        Ok(handle.file().metadata()?.len())
    }
}
