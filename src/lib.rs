//! rawdev
//!
//! Raw, sector-level access to block storage: enumerate disks, partitions
//! and volumes, resolve a name to one of them, and copy bytes between any
//! two storage objects or files.

pub mod aligned_buffer;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;

pub use error::{DeviceError, Phase, Result};
