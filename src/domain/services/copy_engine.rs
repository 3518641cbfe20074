//! Sequential chunked copy between two opened handles
//!
//! The engine knows nothing about disks or volumes. It reads one chunk into a
//! single reused sector-aligned buffer, writes it, and repeats until exactly
//! `byte_count` bytes have moved.

use crate::aligned_buffer::{AlignedBuffer, DEFAULT_ALIGNMENT};
use crate::error::{DeviceError, Phase, Result};
use std::io::{ErrorKind, Read, Write};

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
pub const GIGABYTE: u64 = 1024 * 1024 * 1024;

pub struct CopyEngine {
    buffer: AlignedBuffer,
    read_granularity: usize,
    progress_unit: u64,
}

impl CopyEngine {
    /// `read_granularity` is the source's sector size (1 for buffered
    /// sources); every read request is a multiple of it.
    pub fn new(chunk_size: usize, read_granularity: usize) -> Self {
        let read_granularity = read_granularity.max(1).next_power_of_two();
        let alignment = read_granularity.max(DEFAULT_ALIGNMENT);
        let chunk_size = chunk_size.max(1).next_multiple_of(alignment);

        Self {
            buffer: AlignedBuffer::new(chunk_size, alignment),
            read_granularity,
            progress_unit: GIGABYTE,
        }
    }

    /// Changes the progress milestone size (one gigabyte by default)
    pub fn with_progress_unit(mut self, unit: u64) -> Self {
        self.progress_unit = unit.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    /// Copies `byte_count` bytes from the current position of `source` to
    /// the current position of `dest`.
    ///
    /// `on_progress` receives 1, 2, 3, ... once per progress unit crossed.
    /// The first read or write error aborts the copy.
    pub fn copy<R, W, F>(
        &mut self,
        source: &mut R,
        dest: &mut W,
        byte_count: u64,
        mut on_progress: F,
    ) -> Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
        F: FnMut(u64),
    {
        let mut total = 0u64;
        let mut reported = 0u64;

        while total < byte_count {
            let wanted = (byte_count - total).min(self.buffer.len() as u64) as usize;
            // Unbuffered sources only accept whole sectors; the excess of the
            // final rounded-up read is dropped.
            let request = wanted
                .next_multiple_of(self.read_granularity)
                .min(self.buffer.len());

            let read = read_once(source, &mut self.buffer[..request])?;
            if read == 0 {
                return Err(DeviceError::SourceExhausted {
                    copied: total,
                    expected: byte_count,
                });
            }

            let take = read.min(wanted);
            dest.write_all(&self.buffer[..take])
                .map_err(|source| DeviceError::Io {
                    phase: Phase::Write,
                    source,
                })?;
            total += take as u64;

            let milestone = total / self.progress_unit;
            while reported < milestone {
                reported += 1;
                on_progress(reported);
            }
        }

        Ok(total)
    }
}

fn read_once<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match source.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(DeviceError::Io {
                    phase: Phase::Read,
                    source,
                });
            }
        }
    }
}
