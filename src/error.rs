use std::fmt;
use std::io;
use thiserror::Error;

/// The step of a device operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Lock,
    Dismount,
    ExtendedIo,
    Size,
    Seek,
    Read,
    Write,
    Flush,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Open => "open",
            Phase::Lock => "lock",
            Phase::Dismount => "dismount",
            Phase::ExtendedIo => "extended-io",
            Phase::Size => "size",
            Phase::Seek => "seek",
            Phase::Read => "read",
            Phase::Write => "write",
            Phase::Flush => "flush",
        };
        f.write_str(name)
    }
}

/// Errors raised while enumerating, opening or copying storage objects
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("{phase} failed on {target}: {source}")]
    Os {
        phase: Phase,
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("{phase} failed: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: io::Error,
    },

    #[error("volume enumeration failed: {0}")]
    Enumeration(#[source] io::Error),

    #[error("{what} {value} is not a multiple of the {alignment}-byte sector size of {target}")]
    Misaligned {
        target: String,
        what: &'static str,
        value: u64,
        alignment: u64,
    },

    #[error("range {offset}+{length} exceeds the {capacity} bytes of {target}")]
    OutOfRange {
        target: String,
        offset: u64,
        length: u64,
        capacity: u64,
    },

    #[error("source ended after {copied} of {expected} bytes")]
    SourceExhausted { copied: u64, expected: u64 },
}

impl DeviceError {
    pub fn os(phase: Phase, target: impl Into<String>, source: io::Error) -> Self {
        DeviceError::Os {
            phase,
            target: target.into(),
            source,
        }
    }

    /// The underlying OS error code, when the failure came from the OS.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            DeviceError::Os { source, .. }
            | DeviceError::Io { source, .. }
            | DeviceError::Enumeration(source) => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            DeviceError::Os { phase, .. } | DeviceError::Io { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
