//! Linux device backend
//!
//! Disks are the non-virtual entries of `/sys/block`, numbered in name
//! order. Volumes are the filesystems udev links under `/dev/disk/by-uuid`.
//! Locking takes an exclusive `flock` and refuses nodes that are still
//! mounted; dismounting unmounts every mount point of the node.
//!
//! `flock` belongs to the open file description, so a second descriptor on
//! a node this process already locked would conflict with our own lock.
//! That happens whenever a filesystem sits on the whole disk: the volume
//! and the disk are the same node. Such nodes are locked once.

use super::device_file::DeviceFile;
use crate::domain::entities::{DiskExtent, MediaType, PartitionStyle};
use crate::domain::repositories::{
    DeviceControl, DeviceDirectory, DiskProbe, DriveLayout, Intent, PartitionEntry,
    VolumeAliases, VolumeDetails,
};
use rustix::fs::{FlockOperation, flock};
use rustix::mount::{UnmountFlags, unmount};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// sysfs reports sizes and offsets in 512-byte units regardless of the
/// device's logical block size
const SYSFS_SECTOR: u64 = 512;

const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Prefixes of kernel block devices that are not physical disks
const VIRTUAL_PREFIXES: &[&str] = &["loop", "ram", "zram", "dm-", "md", "sr", "fd", "nbd"];

/// Stacked devices (dm, md) are resolved through their slaves this deep
const MAX_SLAVE_DEPTH: usize = 8;

const GPT_SIGNATURE: &[u8] = b"EFI PART";
const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Where the backend looks for kernel and udev state
#[derive(Debug, Clone)]
pub struct LinuxPaths {
    pub sys: PathBuf,
    pub dev: PathBuf,
    pub mounts: PathBuf,
    pub udev_data: PathBuf,
}

impl Default for LinuxPaths {
    fn default() -> Self {
        Self {
            sys: PathBuf::from("/sys"),
            dev: PathBuf::from("/dev"),
            mounts: PathBuf::from("/proc/self/mounts"),
            udev_data: PathBuf::from("/run/udev/data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MountEntry {
    source: String,
    target: String,
    fstype: String,
}

pub struct LinuxDevices {
    paths: LinuxPaths,
    /// Kernel names of the physical disks; the index is the disk number
    disks: Vec<String>,
    /// (device, inode) of every node this process has locked
    locked: RefCell<HashSet<(u64, u64)>>,
}

impl LinuxDevices {
    pub fn new() -> Self {
        Self::with_paths(LinuxPaths::default())
    }

    pub fn with_paths(paths: LinuxPaths) -> Self {
        let disks = list_disks(&paths.sys.join("block"));
        debug!("Physical disks: {:?}", disks);
        Self {
            paths,
            disks,
            locked: RefCell::new(HashSet::new()),
        }
    }

    pub fn disk_names(&self) -> &[String] {
        &self.disks
    }

    fn class_block(&self, kernel_name: &str) -> PathBuf {
        self.paths.sys.join("class/block").join(kernel_name)
    }

    fn mounts(&self) -> Vec<MountEntry> {
        fs::read_to_string(&self.paths.mounts)
            .map(|text| parse_mounts(&text))
            .unwrap_or_default()
    }

    /// Mount entries whose source is the same node as `path`
    fn mounts_of(&self, path: &str) -> Vec<MountEntry> {
        let Ok(node) = fs::canonicalize(path) else {
            return Vec::new();
        };
        self.mounts()
            .into_iter()
            .filter(|entry| fs::canonicalize(&entry.source).is_ok_and(|source| source == node))
            .collect()
    }

    fn udev_properties(&self, kernel_name: &str) -> Vec<(String, String)> {
        let Some(dev) = read_trimmed(&self.class_block(kernel_name).join("dev")) else {
            return Vec::new();
        };
        fs::read_to_string(self.paths.udev_data.join(format!("b{}", dev)))
            .map(|text| parse_udev_properties(&text))
            .unwrap_or_default()
    }

    fn partition_entries(&self, disk: &str) -> Vec<PartitionEntry> {
        let disk_dir = self.paths.sys.join("block").join(disk);
        let Ok(children) = fs::read_dir(&disk_dir) else {
            return Vec::new();
        };

        let mut entries: Vec<PartitionEntry> = children
            .flatten()
            .filter_map(|child| {
                let dir = child.path();
                let number = read_u64(&dir.join("partition"))?;
                let start = read_u64(&dir.join("start"))?;
                let size = read_u64(&dir.join("size"))?;
                let name = child.file_name().to_string_lossy().into_owned();
                Some(PartitionEntry {
                    number: u32::try_from(number).ok()?,
                    offset: start * SYSFS_SECTOR,
                    size: size * SYSFS_SECTOR,
                    path: self.paths.dev.join(name).to_string_lossy().into_owned(),
                })
            })
            .collect();
        entries.sort_by_key(|entry| entry.number);
        entries
    }

    fn extents_of(&self, kernel_name: &str, depth: usize) -> Vec<DiskExtent> {
        if let Some(number) = self.disks.iter().position(|disk| disk == kernel_name) {
            let length = read_u64(&self.class_block(kernel_name).join("size")).unwrap_or(0);
            return vec![DiskExtent {
                disk: number as u32,
                offset: 0,
                length: length * SYSFS_SECTOR,
            }];
        }

        let class_dir = self.class_block(kernel_name);
        if class_dir.join("partition").exists() {
            let parent = fs::canonicalize(&class_dir).ok().and_then(|dir| {
                dir.parent()
                    .and_then(Path::file_name)
                    .map(|name| name.to_string_lossy().into_owned())
            });
            let number =
                parent.and_then(|parent| self.disks.iter().position(|disk| *disk == parent));
            let start = read_u64(&class_dir.join("start"));
            let size = read_u64(&class_dir.join("size"));
            return match (number, start, size) {
                (Some(number), Some(start), Some(size)) => vec![DiskExtent {
                    disk: number as u32,
                    offset: start * SYSFS_SECTOR,
                    length: size * SYSFS_SECTOR,
                }],
                _ => Vec::new(),
            };
        }

        if depth >= MAX_SLAVE_DEPTH {
            return Vec::new();
        }
        let Ok(slaves) = fs::read_dir(class_dir.join("slaves")) else {
            return Vec::new();
        };
        let mut names: Vec<String> = slaves
            .flatten()
            .map(|slave| slave.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
            .iter()
            .flat_map(|slave| self.extents_of(slave, depth + 1))
            .collect()
    }
}

impl Default for LinuxDevices {
    fn default() -> Self {
        Self::new()
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_u64(path: &Path) -> Option<u64> {
    read_trimmed(path)?.parse().ok()
}

fn is_virtual(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn list_disks(sys_block: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(sys_block) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !is_virtual(name))
        .collect();
    names.sort();
    names
}

/// Undoes the octal escapes the kernel uses for blanks in mount fields
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = (bytes[i] == b'\\')
            .then(|| field.get(i + 1..i + 4))
            .flatten()
            .and_then(|digits| u8::from_str_radix(digits, 8).ok());
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 4;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(MountEntry {
                source: unescape_mount_field(fields.next()?),
                target: unescape_mount_field(fields.next()?),
                fstype: fields.next()?.to_string(),
            })
        })
        .collect()
}

/// `E:KEY=VALUE` lines of a udev database entry
fn parse_udev_properties(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| line.strip_prefix("E:"))
        .filter_map(|property| property.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn udev_value(properties: &[(String, String)], key: &str) -> Option<String> {
    properties
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .filter(|v| !v.is_empty())
}

/// Partition style from the first two sectors of a disk
fn detect_partition_style(head: &[u8], sector_size: usize) -> PartitionStyle {
    let lba1 = head.get(sector_size..sector_size + GPT_SIGNATURE.len());
    if lba1 == Some(GPT_SIGNATURE) {
        PartitionStyle::Gpt
    } else if head.get(510..512) == Some(&MBR_SIGNATURE[..]) {
        PartitionStyle::Mbr
    } else {
        PartitionStyle::Raw
    }
}

fn read_partition_style(file: &File, sector_size: u32) -> PartitionStyle {
    let mut head = vec![0u8; sector_size as usize * 2];
    match file.read_exact_at(&mut head, 0) {
        Ok(()) => detect_partition_style(&head, sector_size as usize),
        Err(_) => PartitionStyle::Raw,
    }
}

fn busy() -> io::Error {
    io::Error::from_raw_os_error(libc::EBUSY)
}

impl DeviceDirectory for LinuxDevices {
    fn probe_disk(&self, index: u32) -> Option<DiskProbe> {
        let name = self.disks.get(index as usize)?;
        let path = self.paths.dev.join(name).to_string_lossy().into_owned();
        let file = File::open(&path).ok()?;

        let sys_dir = self.paths.sys.join("block").join(name);
        let size = read_u64(&sys_dir.join("size")).unwrap_or(0) * SYSFS_SECTOR;
        let sector_size = read_u64(&sys_dir.join("queue/logical_block_size"))
            .and_then(|s| u32::try_from(s).ok())
            .filter(|&s| s > 0)
            .unwrap_or(DEFAULT_SECTOR_SIZE);
        let media = match read_trimmed(&sys_dir.join("removable")).as_deref() {
            Some("0") => MediaType::Fixed,
            Some("1") => MediaType::Removable,
            _ => MediaType::Unknown,
        };
        let layout = DriveLayout {
            style: read_partition_style(&file, sector_size),
            entries: self.partition_entries(name),
        };

        Some(DiskProbe {
            path,
            size,
            sector_size,
            media,
            layout: Some(layout),
        })
    }

    fn volume_names(&self) -> io::Result<Vec<String>> {
        let by_uuid = self.paths.dev.join("disk/by-uuid");
        let entries = match fs::read_dir(&by_uuid) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            names.push(entry?.path().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn volume_aliases(&self, name: &str) -> VolumeAliases {
        let device_name = fs::canonicalize(name)
            .ok()
            .map(|node| node.to_string_lossy().into_owned());
        let mount_paths = self
            .mounts_of(name)
            .into_iter()
            .map(|entry| entry.target)
            .collect();

        VolumeAliases {
            device_name,
            mount_paths,
        }
    }

    fn query_volume(&self, name: &str) -> io::Result<VolumeDetails> {
        File::open(name)?;

        let node = fs::canonicalize(name)?;
        let kernel_name = node
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let size =
            read_u64(&self.class_block(&kernel_name).join("size")).unwrap_or(0) * SYSFS_SECTOR;
        let properties = self.udev_properties(&kernel_name);
        let file_system = udev_value(&properties, "ID_FS_TYPE")
            .or_else(|| self.mounts_of(name).into_iter().next().map(|entry| entry.fstype));
        let label = udev_value(&properties, "ID_FS_LABEL");

        Ok(VolumeDetails {
            size,
            label,
            file_system,
            extents: self.extents_of(&kernel_name, 0),
        })
    }
}

impl DeviceControl for LinuxDevices {
    type Handle = DeviceFile;

    fn open_device(&self, path: &str, intent: Intent) -> io::Result<DeviceFile> {
        let mut flags = libc::O_DIRECT;
        if intent.is_write() {
            flags |= libc::O_DSYNC;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(intent.is_write())
            .custom_flags(flags)
            .open(path)?;
        Ok(DeviceFile::new(file, path))
    }

    fn open_file(&self, path: &str, intent: Intent) -> io::Result<DeviceFile> {
        let file = match intent {
            Intent::Read => File::open(path)?,
            Intent::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        };
        Ok(DeviceFile::new(file, path))
    }

    fn lock(&self, handle: &DeviceFile) -> io::Result<()> {
        let metadata = handle.file().metadata()?;
        let node = (metadata.dev(), metadata.ino());
        if self.locked.borrow().contains(&node) {
            debug!("{} is already locked by this process", handle.path());
        } else {
            flock(handle.file(), FlockOperation::NonBlockingLockExclusive)?;
            self.locked.borrow_mut().insert(node);
        }
        if !self.mounts_of(handle.path()).is_empty() {
            return Err(busy());
        }
        Ok(())
    }

    fn dismount(&self, handle: &DeviceFile) -> io::Result<()> {
        for entry in self.mounts_of(handle.path()).into_iter().rev() {
            info!("Unmounting {} from {}", entry.source, entry.target);
            unmount(entry.target.as_str(), UnmountFlags::empty())?;
        }
        Ok(())
    }

    fn allow_extended_io(&self, _handle: &DeviceFile) -> io::Result<()> {
        // Block device nodes already span the whole device.
        Ok(())
    }

    fn file_size(&self, handle: &DeviceFile) -> io::Result<u64> {
        Ok(handle.file().metadata()?.len())
    }
}
