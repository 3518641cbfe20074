//! Device control trait
//!
//! The handle-level OS capability the safe-open protocol drives. Each call
//! maps onto one OS primitive so that the protocol's ordering (lock every
//! aliasing volume, then open, dismount and lock the disk) is decided in one
//! place and can be observed through a recording backend.

use std::io::{self, Read, Seek, Write};

/// Whether a target is opened as a copy source or destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Write,
}

impl Intent {
    pub fn is_write(self) -> bool {
        matches!(self, Intent::Write)
    }
}

pub trait DeviceControl {
    type Handle: Read + Write + Seek;

    /// Opens a disk or volume for unbuffered access, shared for read and
    /// write, with write-through when writing
    fn open_device(&self, path: &str, intent: Intent) -> io::Result<Self::Handle>;

    /// Opens a plain file: existing only for reading, created or truncated
    /// for writing
    fn open_file(&self, path: &str, intent: Intent) -> io::Result<Self::Handle>;

    /// Takes the OS exclusive lock on a volume or disk handle
    fn lock(&self, handle: &Self::Handle) -> io::Result<()>;

    /// Forces the OS to dismount whatever is mounted on the handle
    fn dismount(&self, handle: &Self::Handle) -> io::Result<()>;

    /// Allows I/O past the filesystem's nominal end on a volume handle
    fn allow_extended_io(&self, handle: &Self::Handle) -> io::Result<()>;

    /// Byte size of an opened plain file
    fn file_size(&self, handle: &Self::Handle) -> io::Result<u64>;
}
