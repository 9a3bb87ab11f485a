//! Typed views over a flat snapshot byte buffer.
//!
//! Every non-object channel occupies `FLAG_SIZE + element_size` bytes starting at
//! its offset: an `f32` existence flag followed by the value. Values are read and
//! written through `bytemuck` so no offset is ever reinterpreted in place.

use bytemuck::Pod;

use crate::interp::Interpolate;

/// Size of the leading existence/weight flag of each channel.
pub const FLAG_SIZE: usize = std::mem::size_of::<f32>();

/// Grow-only byte buffer holding one snapshot's non-object channels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueBuffer {
    bytes: Vec<u8>,
}

impl ValueBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Base address of the storage; stable until the buffer grows.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Zero-extend to at least `len` bytes. Never shrinks.
    pub fn grow_to(&mut self, len: usize) {
        if len > self.bytes.len() {
            self.bytes.resize(len, 0);
        }
    }

    #[inline]
    pub fn read_at<T: Pod>(&self, offset: usize) -> T {
        let size = std::mem::size_of::<T>();
        debug_assert!(
            offset + size <= self.bytes.len(),
            "read of {size} bytes at {offset} past buffer end {}",
            self.bytes.len()
        );
        bytemuck::pod_read_unaligned(&self.bytes[offset..offset + size])
    }

    #[inline]
    pub fn write_at<T: Pod>(&mut self, offset: usize, value: &T) {
        let size = std::mem::size_of::<T>();
        debug_assert!(
            offset + size <= self.bytes.len(),
            "write of {size} bytes at {offset} past buffer end {}",
            self.bytes.len()
        );
        self.bytes[offset..offset + size].copy_from_slice(bytemuck::bytes_of(value));
    }

    #[inline]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset + len <= self.bytes.len());
        &self.bytes[offset..offset + len]
    }

    #[inline]
    pub fn write_bytes(&mut self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.bytes.len());
        self.bytes[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Existence flag of the channel at `offset`; 0 when the channel lies past the end.
    #[inline]
    pub fn flag(&self, offset: usize) -> f32 {
        if offset + FLAG_SIZE > self.bytes.len() {
            return 0.0;
        }
        self.read_at::<f32>(offset)
    }

    #[inline]
    pub fn set_flag(&mut self, offset: usize, flag: f32) {
        self.write_at(offset, &flag);
    }

    /// Write a sampled numeric value behind the flag at `offset` and mark it present.
    pub(crate) fn store_numeric<T: Interpolate>(
        &mut self,
        offset: usize,
        value: T,
        mode: StoreMode,
    ) {
        let value_offset = offset + FLAG_SIZE;
        let stored = match mode {
            StoreMode::Overwrite => value,
            StoreMode::Accumulate if self.flag(offset) > 0.0 => {
                T::combine(&self.read_at::<T>(value_offset), &value)
            }
            StoreMode::Accumulate => value,
        };
        self.write_at(value_offset, &stored);
        self.set_flag(offset, 1.0);
    }
}

/// How an evaluator writes samples into a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StoreMode {
    /// Fresh sample (push).
    Overwrite,
    /// Combine with an already present value (pop).
    Accumulate,
}
