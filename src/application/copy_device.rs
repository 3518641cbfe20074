//! Copy device use case
//!
//! Resolves both names, opens the source and destination through the
//! safe-open protocol, applies the requested offsets and length, and streams
//! the bytes across.

use crate::aligned_buffer::DEFAULT_ALIGNMENT;
use crate::application::dto::{CopyOptions, CopyReport};
use crate::application::safe_open::{OpenedTarget, SafeOpener};
use crate::domain::Catalog;
use crate::domain::repositories::{DeviceControl, Intent};
use crate::domain::services::{CopyEngine, Resolver};
use crate::error::{DeviceError, Phase};
use std::fmt;
use std::io::{Seek, Write};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// The stage a copy was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStage {
    OpenSource,
    OpenDestination,
    Copy,
}

impl fmt::Display for CopyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStage::OpenSource => write!(f, "open-source"),
            CopyStage::OpenDestination => write!(f, "open-destination"),
            CopyStage::Copy => write!(f, "copy"),
        }
    }
}

#[derive(Error, Debug)]
#[error("{stage} failed: {error}")]
pub struct CopyFailure {
    pub stage: CopyStage,
    #[source]
    pub error: DeviceError,
}

impl CopyFailure {
    pub fn os_code(&self) -> Option<i32> {
        self.error.os_code()
    }
}

fn at(stage: CopyStage) -> impl Fn(DeviceError) -> CopyFailure {
    move |error| CopyFailure { stage, error }
}

pub struct CopyDeviceUseCase<'a, C: DeviceControl> {
    catalog: &'a Catalog,
    control: &'a C,
}

impl<'a, C: DeviceControl> CopyDeviceUseCase<'a, C> {
    pub fn new(catalog: &'a Catalog, control: &'a C) -> Self {
        Self { catalog, control }
    }

    /// Executes the copy
    ///
    /// `on_progress` receives the number of whole gigabytes copied so far,
    /// once per gigabyte.
    pub fn execute<F: FnMut(u64)>(
        &self,
        options: &CopyOptions,
        on_progress: F,
    ) -> Result<CopyReport, CopyFailure> {
        check_chunk_size(options.chunk_size).map_err(at(CopyStage::Copy))?;

        let start_time = Instant::now();
        let resolver = Resolver::new(self.catalog);
        let opener = SafeOpener::new(self.catalog, self.control);

        let source_target = resolver.resolve(&options.source);
        info!("Source: {} {}", source_target.kind(), source_target);
        let mut source = opener
            .open(&source_target, Intent::Read)
            .map_err(at(CopyStage::OpenSource))?;
        let byte_count = adjust_source(&mut source, options).map_err(at(CopyStage::OpenSource))?;

        let dest_target = resolver.resolve(&options.destination);
        if resolver.is_disk_number(&options.destination) {
            warn!(
                "Destination '{}' names a disk by number: writing raw to {}",
                options.destination, dest_target
            );
        }
        info!("Destination: {} {}", dest_target.kind(), dest_target);
        let mut dest = opener
            .open(&dest_target, Intent::Write)
            .map_err(at(CopyStage::OpenDestination))?;
        adjust_destination(&mut dest, options, byte_count)
            .map_err(at(CopyStage::OpenDestination))?;

        let mut engine = CopyEngine::new(options.chunk_size, source.alignment() as usize);
        let bytes_copied = engine
            .copy(source.handle_mut(), dest.handle_mut(), byte_count, on_progress)
            .map_err(at(CopyStage::Copy))?;
        dest.handle_mut()
            .flush()
            .map_err(|e| DeviceError::os(Phase::Flush, dest.description(), e))
            .map_err(at(CopyStage::Copy))?;

        let report = CopyReport {
            source: source_target.to_string(),
            source_kind: source_target.kind(),
            destination: dest_target.to_string(),
            destination_kind: dest_target.kind(),
            source_offset: options.source_offset.unwrap_or(0),
            destination_offset: options.destination_offset.unwrap_or(0),
            bytes_copied,
            duration: start_time.elapsed(),
        };

        info!(
            "Copied {} bytes in {:.2}s ({} bytes/s)",
            report.bytes_copied,
            report.duration.as_secs_f64(),
            report.throughput()
        );

        Ok(report)
    }
}

/// The transfer buffer must be a non-zero number of whole pages
fn check_chunk_size(chunk_size: usize) -> Result<(), DeviceError> {
    if chunk_size != 0 && chunk_size % DEFAULT_ALIGNMENT == 0 {
        return Ok(());
    }
    Err(DeviceError::Misaligned {
        target: "transfer buffer".to_string(),
        what: "chunk size",
        value: chunk_size as u64,
        alignment: DEFAULT_ALIGNMENT as u64,
    })
}

/// Applies the length override and source offset; returns the byte count
fn adjust_source<H: Seek>(
    source: &mut OpenedTarget<H>,
    options: &CopyOptions,
) -> Result<u64, DeviceError> {
    let offset = options.source_offset.unwrap_or(0);

    let byte_count = match options.length {
        Some(length) => {
            info!("Forcing size={}", length);
            length
        }
        None => source.size().saturating_sub(offset),
    };
    if options.source_offset.is_some() {
        info!("Forcing source offset={}", offset);
    }

    source.check_range(offset, byte_count)?;
    source.seek_to(offset)?;
    Ok(byte_count)
}

fn adjust_destination<H: Seek>(
    dest: &mut OpenedTarget<H>,
    options: &CopyOptions,
    byte_count: u64,
) -> Result<(), DeviceError> {
    let offset = options.destination_offset.unwrap_or(0);
    if options.destination_offset.is_some() {
        info!("Forcing destination offset={}", offset);
    }

    dest.check_range(offset, byte_count)?;
    // Unbuffered writes cannot end mid-sector.
    dest.check_aligned("length", byte_count)?;
    dest.seek_to(offset)?;
    Ok(())
}
