//! Copy options DTO

use crate::domain::services::DEFAULT_CHUNK_SIZE;

/// Options for a raw copy between two storage objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    /// Name of the source (volume, disk, partition or file path)
    pub source: String,
    /// Name of the destination
    pub destination: String,
    /// Byte offset into the source to start reading from
    pub source_offset: Option<u64>,
    /// Byte offset into the destination to start writing at
    pub destination_offset: Option<u64>,
    /// Number of bytes to copy instead of the source's natural size
    pub length: Option<u64>,
    /// Size of the reused transfer buffer; a non-zero multiple of 4096
    pub chunk_size: usize,
}

impl CopyOptions {
    /// Creates copy options for the given source and destination names
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            source_offset: None,
            destination_offset: None,
            length: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_source_offset(mut self, offset: u64) -> Self {
        self.source_offset = Some(offset);
        self
    }

    pub fn with_destination_offset(mut self, offset: u64) -> Self {
        self.destination_offset = Some(offset);
        self
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the transfer buffer size, a non-zero multiple of 4096 bytes
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }
}
