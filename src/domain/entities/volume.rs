//! Volume entity

/// Filesystem name the OS reports for an unformatted volume
pub const RAW_FILESYSTEM: &str = "RAW";

/// Where a slice of a volume physically lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskExtent {
    pub disk: u32,
    pub offset: u64,
    pub length: u64,
}

/// An OS-level mountable storage unit
///
/// A volume may span several disks, so every extent counts when deciding
/// whether it aliases a disk.
#[derive(Debug, Clone, Default)]
pub struct Volume {
    /// OS-assigned volume name, stable across reboots
    pub name: String,
    /// Kernel device name (e.g. `\Device\HarddiskVolume2`)
    pub device_name: Option<String>,
    /// Drive letters and folder mount points
    pub mount_paths: Vec<String>,
    pub label: Option<String>,
    pub file_system: Option<String>,
    /// Size in bytes; zero when the volume could not be opened
    pub size: u64,
    pub extents: Vec<DiskExtent>,
}

impl Volume {
    /// A volume that exists but could not be queried
    pub fn inaccessible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_raw_filesystem(&self) -> bool {
        self.file_system.as_deref() == Some(RAW_FILESYSTEM)
    }

    pub fn is_on_disk(&self, disk: u32) -> bool {
        self.extents.iter().any(|e| e.disk == disk)
    }

    pub fn is_accessible(&self) -> bool {
        self.size > 0
    }

    /// Path used to open the volume itself (the volume name without its
    /// trailing separator)
    pub fn device_path(&self) -> &str {
        self.name.strip_suffix('\\').unwrap_or(&self.name)
    }

    /// Case-insensitive exact match against the name, device name or any
    /// mount path
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self
                .device_name
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(name))
            || self.mount_paths.iter().any(|m| m.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spanned() -> Volume {
        Volume {
            name: "\\\\?\\Volume{884d6af9-a72a-11e5-8080-005056c00008}\\".to_string(),
            device_name: Some("\\Device\\HarddiskVolume2".to_string()),
            mount_paths: vec!["H:\\".to_string(), "C:\\mnt\\data\\".to_string()],
            label: Some("data".to_string()),
            file_system: Some("NTFS".to_string()),
            size: 4096,
            extents: vec![
                DiskExtent {
                    disk: 0,
                    offset: 1_048_576,
                    length: 2048,
                },
                DiskExtent {
                    disk: 3,
                    offset: 1_048_576,
                    length: 2048,
                },
            ],
        }
    }

    #[test]
    fn test_is_on_disk_checks_every_extent() {
        let v = spanned();
        assert!(v.is_on_disk(0));
        assert!(v.is_on_disk(3));
        assert!(!v.is_on_disk(1));
    }

    #[test]
    fn test_raw_filesystem() {
        let mut v = spanned();
        assert!(!v.is_raw_filesystem());
        v.file_system = Some(RAW_FILESYSTEM.to_string());
        assert!(v.is_raw_filesystem());
        v.file_system = None;
        assert!(!v.is_raw_filesystem());
    }

    #[test]
    fn test_device_path_strips_trailing_separator() {
        let v = spanned();
        assert_eq!(
            v.device_path(),
            "\\\\?\\Volume{884d6af9-a72a-11e5-8080-005056c00008}"
        );
        assert_eq!(Volume::inaccessible("/dev/sdb1").device_path(), "/dev/sdb1");
    }

    #[test]
    fn test_answers_to_is_exact_and_case_insensitive() {
        let v = spanned();
        assert!(v.answers_to("h:\\"));
        assert!(v.answers_to("C:\\MNT\\DATA\\"));
        assert!(v.answers_to("\\device\\harddiskvolume2"));
        assert!(v.answers_to("\\\\?\\VOLUME{884D6AF9-A72A-11E5-8080-005056C00008}\\"));
        assert!(!v.answers_to("H:"));
        assert!(!v.answers_to("\\Device\\HarddiskVolume"));
    }

    #[test]
    fn test_inaccessible_volume_is_zeroed() {
        let v = Volume::inaccessible("\\\\?\\Volume{x}\\");
        assert!(!v.is_accessible());
        assert!(v.extents.is_empty());
        assert!(v.file_system.is_none());
    }
}
