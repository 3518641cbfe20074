//! Infrastructure layer
//!
//! Concrete implementations of the device repositories. The OS backends are
//! compiled per platform; the in-memory backend is always available.

mod device_file;
pub mod memory_devices;

#[cfg(target_os = "linux")]
pub mod linux_devices;

#[cfg(windows)]
pub mod windows_devices;

pub use device_file::DeviceFile;
pub use memory_devices::{DeviceCall, MemoryDevices, MemoryDisk, MemoryHandle, MemoryVolume};

#[cfg(target_os = "linux")]
pub use linux_devices::{LinuxDevices, LinuxPaths};

#[cfg(windows)]
pub use windows_devices::WindowsDevices;

/// Backend for the platform being compiled
#[cfg(target_os = "linux")]
pub type PlatformDevices = LinuxDevices;

#[cfg(windows)]
pub type PlatformDevices = WindowsDevices;

#[cfg(not(any(target_os = "linux", windows)))]
compile_error!("raw device access is only implemented for Linux and Windows");
