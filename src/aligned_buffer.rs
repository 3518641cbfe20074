//! Sector-aligned heap buffer for unbuffered device I/O

use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::ops::{Deref, DerefMut};

pub const DEFAULT_ALIGNMENT: usize = 4096;

pub struct AlignedBuffer {
    ptr: *mut u8,
    size: usize,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocates `size` zeroed bytes whose address is a multiple of
    /// `alignment`. The capacity is rounded up to the alignment.
    pub fn new(size: usize, alignment: usize) -> Self {
        assert!(size > 0, "Buffer size must be greater than 0");
        assert!(
            alignment.is_power_of_two(),
            "Alignment must be a power of 2"
        );

        let capacity = size.next_multiple_of(alignment);
        let layout = Layout::from_size_align(capacity, alignment)
            .expect("Invalid layout for aligned allocation");

        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }

        Self { ptr, size, layout }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        (self.ptr as usize) % self.layout.align() == 0
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.ptr, self.layout);
        }
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for AlignedBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

unsafe impl Send for AlignedBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_buffer_creation() {
        let buffer = AlignedBuffer::new(1024, 4096);
        assert_eq!(buffer.len(), 1024);
        assert!(buffer.is_aligned());
        assert_eq!(buffer.as_ptr() as usize % 4096, 0);
    }

    #[test]
    fn test_aligned_buffer_starts_zeroed() {
        let mut buffer = AlignedBuffer::new(8192, 512);
        assert!(buffer.iter().all(|&b| b == 0));
        buffer[8191] = 0xAA;
        assert_eq!(buffer[8191], 0xAA);
    }

    #[test]
    fn test_large_alignment() {
        let buffer = AlignedBuffer::new(4096, 65536);
        assert_eq!(buffer.alignment(), 65536);
        assert!(buffer.is_aligned());
    }

    #[test]
    #[should_panic(expected = "Buffer size must be greater than 0")]
    fn test_zero_size_panics() {
        let _ = AlignedBuffer::new(0, 4096);
    }

    #[test]
    #[should_panic(expected = "Alignment must be a power of 2")]
    fn test_non_power_of_two_alignment_panics() {
        let _ = AlignedBuffer::new(1024, 1000);
    }
}
