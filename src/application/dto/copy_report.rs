//! Copy report DTO

use std::time::Duration;

/// Outcome of a completed copy
#[derive(Debug, Clone)]
pub struct CopyReport {
    /// Resolved source, as displayed to the user
    pub source: String,
    /// Kind of the resolved source (volume, disk, partition, file)
    pub source_kind: &'static str,
    pub destination: String,
    pub destination_kind: &'static str,
    pub source_offset: u64,
    pub destination_offset: u64,
    /// Bytes transferred
    pub bytes_copied: u64,
    pub duration: Duration,
}

impl CopyReport {
    /// Average throughput in bytes per second
    pub fn throughput(&self) -> u64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            (self.bytes_copied as f64 / secs) as u64
        } else {
            self.bytes_copied
        }
    }
}
