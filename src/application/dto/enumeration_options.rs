//! Enumeration options DTO

/// Highest disk index probed by default
pub const DEFAULT_MAX_DISKS: u32 = 1024;

/// Options for building the device catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationOptions {
    /// Disk indices `0..max_disks` are probed
    pub max_disks: u32,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            max_disks: DEFAULT_MAX_DISKS,
        }
    }
}

impl EnumerationOptions {
    pub fn with_max_disks(mut self, max_disks: u32) -> Self {
        self.max_disks = max_disks;
        self
    }
}
