//! In-memory device backend
//!
//! Disks are byte vectors; volumes are views onto the disk bytes through
//! their extents, so writing a disk is visible through its volumes and the
//! other way round. Every control call is recorded, failures can be
//! injected per call, and device handles enforce sector alignment like
//! unbuffered OS handles do.

use crate::domain::entities::{DiskExtent, MediaType, PartitionStyle};
use crate::domain::repositories::{
    DeviceControl, DeviceDirectory, DiskProbe, DriveLayout, Intent, PartitionEntry,
    VolumeAliases, VolumeDetails,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

type Bytes = Rc<RefCell<Vec<u8>>>;

/// OS error codes reported by the in-memory backend
pub const ERROR_NOT_FOUND: i32 = 2;
pub const ERROR_ACCESS_DENIED: i32 = 5;

/// One observable call into the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    OpenDevice { path: String, intent: Intent },
    OpenFile { path: String, intent: Intent },
    Lock(String),
    Dismount(String),
    ExtendedIo(String),
}

pub struct MemoryDisk {
    number: u32,
    path: String,
    sector_size: u32,
    media: MediaType,
    style: PartitionStyle,
    partitions: Vec<PartitionEntry>,
    data: Bytes,
}

impl MemoryDisk {
    pub fn new(number: u32, size: usize) -> Self {
        Self {
            number,
            path: format!(r"\\.\PhysicalDrive{}", number),
            sector_size: 512,
            media: MediaType::Fixed,
            style: PartitionStyle::Raw,
            partitions: Vec::new(),
            data: Rc::new(RefCell::new(vec![0; size])),
        }
    }

    pub fn sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self
    }

    pub fn media(mut self, media: MediaType) -> Self {
        self.media = media;
        self
    }

    pub fn style(mut self, style: PartitionStyle) -> Self {
        self.style = style;
        self
    }

    pub fn partition(mut self, number: u32, offset: u64, size: u64) -> Self {
        self.partitions.push(PartitionEntry {
            number,
            offset,
            size,
            path: format!(r"{}\Partition{}", self.path, number),
        });
        self
    }

    pub fn filled_with(self, pattern: impl Fn(usize) -> u8) -> Self {
        for (i, byte) in self.data.borrow_mut().iter_mut().enumerate() {
            *byte = pattern(i);
        }
        self
    }
}

pub struct MemoryVolume {
    name: String,
    device_name: Option<String>,
    mount_paths: Vec<String>,
    label: Option<String>,
    file_system: Option<String>,
    extents: Vec<DiskExtent>,
    accessible: bool,
}

impl MemoryVolume {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_name: None,
            mount_paths: Vec::new(),
            label: None,
            file_system: None,
            extents: Vec::new(),
            accessible: true,
        }
    }

    pub fn device_name(mut self, device_name: impl Into<String>) -> Self {
        self.device_name = Some(device_name.into());
        self
    }

    pub fn mount_path(mut self, path: impl Into<String>) -> Self {
        self.mount_paths.push(path.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn file_system(mut self, file_system: impl Into<String>) -> Self {
        self.file_system = Some(file_system.into());
        self
    }

    pub fn extent(mut self, disk: u32, offset: u64, length: u64) -> Self {
        self.extents.push(DiskExtent {
            disk,
            offset,
            length,
        });
        self
    }

    /// The volume refuses to be opened at all
    pub fn inaccessible(mut self) -> Self {
        self.accessible = false;
        self
    }

    fn device_path(&self) -> &str {
        self.name.strip_suffix('\\').unwrap_or(&self.name)
    }

    fn size(&self) -> u64 {
        self.extents.iter().map(|extent| extent.length).sum()
    }
}

#[derive(Default)]
pub struct MemoryDevices {
    disks: Vec<MemoryDisk>,
    volumes: Vec<MemoryVolume>,
    files: RefCell<HashMap<String, Bytes>>,
    calls: RefCell<Vec<DeviceCall>>,
    failures: Vec<(DeviceCall, i32)>,
    enumeration_failure: Option<i32>,
}

impl MemoryDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disk(mut self, disk: MemoryDisk) -> Self {
        self.disks.push(disk);
        self
    }

    pub fn with_volume(mut self, volume: MemoryVolume) -> Self {
        self.volumes.push(volume);
        self
    }

    pub fn with_file(self, path: impl Into<String>, contents: Vec<u8>) -> Self {
        self.files
            .borrow_mut()
            .insert(path.into(), Rc::new(RefCell::new(contents)));
        self
    }

    /// Makes `call` fail with OS error `code` every time it is made
    pub fn failing(mut self, call: DeviceCall, code: i32) -> Self {
        self.failures.push((call, code));
        self
    }

    /// Makes the volume enumeration mechanism itself fail
    pub fn failing_enumeration(mut self, code: i32) -> Self {
        self.enumeration_failure = Some(code);
        self
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.borrow().clone()
    }

    pub fn disk_bytes(&self, number: u32) -> Option<Vec<u8>> {
        self.disks
            .iter()
            .find(|disk| disk.number == number)
            .map(|disk| disk.data.borrow().clone())
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).map(|bytes| bytes.borrow().clone())
    }

    fn record(&self, call: DeviceCall) -> io::Result<()> {
        let failure = self
            .failures
            .iter()
            .find(|(failing, _)| *failing == call)
            .map(|&(_, code)| code);
        self.calls.borrow_mut().push(call);
        match failure {
            Some(code) => Err(io::Error::from_raw_os_error(code)),
            None => Ok(()),
        }
    }

    fn disk(&self, number: u32) -> Option<&MemoryDisk> {
        self.disks.iter().find(|disk| disk.number == number)
    }

    fn volume_segments(&self, volume: &MemoryVolume) -> Option<(Vec<Segment>, usize)> {
        let mut segments = Vec::new();
        let mut sector_size = 1;
        for extent in &volume.extents {
            let disk = self.disk(extent.disk)?;
            sector_size = sector_size.max(disk.sector_size as usize);
            segments.push(Segment {
                bytes: Rc::clone(&disk.data),
                offset: extent.offset,
                length: extent.length,
            });
        }
        Some((segments, sector_size))
    }
}

#[derive(Debug)]
struct Segment {
    bytes: Bytes,
    offset: u64,
    length: u64,
}

#[derive(Debug)]
enum Backing {
    /// Fixed-size device made of one or more disk ranges
    Device { segments: Vec<Segment>, sector_size: usize },
    /// Growable plain file
    File(Bytes),
}

#[derive(Debug)]
pub struct MemoryHandle {
    path: String,
    backing: Backing,
    writable: bool,
    position: u64,
}

impl MemoryHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn check_alignment(&self, len: usize) -> io::Result<()> {
        if let Backing::Device { sector_size, .. } = self.backing {
            if self.position % sector_size as u64 != 0 || len % sector_size != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "unaligned transfer of {} bytes at {} on {}-byte sectors",
                        len, self.position, sector_size
                    ),
                ));
            }
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        match &self.backing {
            Backing::Device { segments, .. } => segments.iter().map(|s| s.length).sum(),
            Backing::File(bytes) => bytes.borrow().len() as u64,
        }
    }

    /// Walks the device segments covering `[position, position + len)`,
    /// handing each piece to `visit` as (segment, offset in segment, offset
    /// in the caller's buffer, piece length)
    fn walk(&self, len: usize, mut visit: impl FnMut(&Segment, usize, usize, usize)) -> usize {
        let Backing::Device { segments, .. } = &self.backing else {
            return 0;
        };
        let mut done = 0;
        let mut segment_start = 0u64;
        for segment in segments {
            let segment_end = segment_start + segment.length;
            let at = self.position + done as u64;
            if done < len && at < segment_end && at >= segment_start {
                let within = (at - segment_start) as usize;
                let piece = (len - done).min((segment_end - at) as usize);
                visit(segment, segment.offset as usize + within, done, piece);
                done += piece;
            }
            segment_start = segment_end;
        }
        done
    }
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_alignment(buf.len())?;
        let n = match &self.backing {
            Backing::File(bytes) => {
                let bytes = bytes.borrow();
                let start = (self.position as usize).min(bytes.len());
                let n = buf.len().min(bytes.len() - start);
                buf[..n].copy_from_slice(&bytes[start..start + n]);
                n
            }
            Backing::Device { .. } => self.walk(buf.len(), |segment, from, to, piece| {
                let bytes = segment.bytes.borrow();
                buf[to..to + piece].copy_from_slice(&bytes[from..from + piece]);
            }),
        };
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::from_raw_os_error(ERROR_ACCESS_DENIED));
        }
        self.check_alignment(buf.len())?;
        let n = match &self.backing {
            Backing::File(bytes) => {
                let mut bytes = bytes.borrow_mut();
                let start = self.position as usize;
                if bytes.len() < start + buf.len() {
                    bytes.resize(start + buf.len(), 0);
                }
                bytes[start..start + buf.len()].copy_from_slice(buf);
                buf.len()
            }
            Backing::Device { .. } => self.walk(buf.len(), |segment, to, from, piece| {
                let mut bytes = segment.bytes.borrow_mut();
                bytes[to..to + piece].copy_from_slice(&buf[from..from + piece]);
            }),
        };
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target =
            target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        self.position = target;
        Ok(target)
    }
}

impl DeviceDirectory for MemoryDevices {
    fn probe_disk(&self, index: u32) -> Option<DiskProbe> {
        let disk = self.disk(index)?;
        Some(DiskProbe {
            path: disk.path.clone(),
            size: disk.data.borrow().len() as u64,
            sector_size: disk.sector_size,
            media: disk.media,
            layout: Some(DriveLayout {
                style: disk.style,
                entries: disk.partitions.clone(),
            }),
        })
    }

    fn volume_names(&self) -> io::Result<Vec<String>> {
        if let Some(code) = self.enumeration_failure {
            return Err(io::Error::from_raw_os_error(code));
        }
        Ok(self.volumes.iter().map(|volume| volume.name.clone()).collect())
    }

    fn volume_aliases(&self, name: &str) -> VolumeAliases {
        self.volumes
            .iter()
            .find(|volume| volume.name == name)
            .map(|volume| VolumeAliases {
                device_name: volume.device_name.clone(),
                mount_paths: volume.mount_paths.clone(),
            })
            .unwrap_or_default()
    }

    fn query_volume(&self, name: &str) -> io::Result<VolumeDetails> {
        let volume = self
            .volumes
            .iter()
            .find(|volume| volume.name == name)
            .ok_or_else(|| io::Error::from_raw_os_error(ERROR_NOT_FOUND))?;
        if !volume.accessible {
            return Err(io::Error::from_raw_os_error(ERROR_ACCESS_DENIED));
        }
        Ok(VolumeDetails {
            size: volume.size(),
            label: volume.label.clone(),
            file_system: volume.file_system.clone(),
            extents: volume.extents.clone(),
        })
    }
}

impl DeviceControl for MemoryDevices {
    type Handle = MemoryHandle;

    fn open_device(&self, path: &str, intent: Intent) -> io::Result<MemoryHandle> {
        self.record(DeviceCall::OpenDevice {
            path: path.to_string(),
            intent,
        })?;

        let backing = if let Some(disk) = self.disks.iter().find(|disk| disk.path == path) {
            let length = disk.data.borrow().len() as u64;
            Backing::Device {
                segments: vec![Segment {
                    bytes: Rc::clone(&disk.data),
                    offset: 0,
                    length,
                }],
                sector_size: disk.sector_size as usize,
            }
        } else {
            let volume = self
                .volumes
                .iter()
                .find(|volume| volume.device_path() == path)
                .ok_or_else(|| io::Error::from_raw_os_error(ERROR_NOT_FOUND))?;
            if !volume.accessible {
                return Err(io::Error::from_raw_os_error(ERROR_ACCESS_DENIED));
            }
            let (segments, sector_size) = self
                .volume_segments(volume)
                .ok_or_else(|| io::Error::from_raw_os_error(ERROR_NOT_FOUND))?;
            Backing::Device {
                segments,
                sector_size,
            }
        };

        Ok(MemoryHandle {
            path: path.to_string(),
            backing,
            writable: intent.is_write(),
            position: 0,
        })
    }

    fn open_file(&self, path: &str, intent: Intent) -> io::Result<MemoryHandle> {
        self.record(DeviceCall::OpenFile {
            path: path.to_string(),
            intent,
        })?;

        let bytes = match intent {
            Intent::Read => self
                .files
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::from_raw_os_error(ERROR_NOT_FOUND))?,
            Intent::Write => {
                let bytes = Rc::new(RefCell::new(Vec::new()));
                self.files
                    .borrow_mut()
                    .insert(path.to_string(), Rc::clone(&bytes));
                bytes
            }
        };

        Ok(MemoryHandle {
            path: path.to_string(),
            backing: Backing::File(bytes),
            writable: intent.is_write(),
            position: 0,
        })
    }

    fn lock(&self, handle: &MemoryHandle) -> io::Result<()> {
        self.record(DeviceCall::Lock(handle.path.clone()))
    }

    fn dismount(&self, handle: &MemoryHandle) -> io::Result<()> {
        self.record(DeviceCall::Dismount(handle.path.clone()))
    }

    fn allow_extended_io(&self, handle: &MemoryHandle) -> io::Result<()> {
        self.record(DeviceCall::ExtendedIo(handle.path.clone()))
    }

    fn file_size(&self, handle: &MemoryHandle) -> io::Result<u64> {
        Ok(handle.len())
    }
}
