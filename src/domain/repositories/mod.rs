//! Repository traits (interfaces)
//!
//! These traits define the contracts for the operating system services the
//! domain depends on.

mod device_control;
mod device_directory;

pub use device_control::{DeviceControl, Intent};
pub use device_directory::{
    DeviceDirectory, DiskProbe, DriveLayout, PartitionEntry, VolumeAliases, VolumeDetails,
};
