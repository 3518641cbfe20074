//! Application layer
//!
//! Use cases that orchestrate the domain over the OS repositories.

pub mod dto;
mod copy_device;
mod enumerate_devices;
mod safe_open;

pub use copy_device::{CopyDeviceUseCase, CopyFailure, CopyStage};
pub use enumerate_devices::EnumerateDevicesUseCase;
pub use safe_open::{FALLBACK_SECTOR_SIZE, OpenedTarget, SafeOpener};
