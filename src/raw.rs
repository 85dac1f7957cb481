//! Spec-exact sentinel surface.
//!
//! [`crate::RegionHeap`]'s inherent methods return `Result<T, HeapError>`,
//! which is the idiomatic shape for this code but not the shape the
//! original six operations had: `init` returned `0`/non-zero, `allocate`
//! and `resize` returned a pointer or `NULL`, `read`/`write` returned a
//! byte count or `-1`, and `free` was silent. This module is a thin
//! adapter from one to the other for callers that want exactly that
//! contract (e.g. a C-callable shim, or a test harness ported from the
//! original driver) instead of `?`-composable errors.
//!
//! Every function here is implemented in terms of the `Result` surface —
//! it does not duplicate any validation or mutation logic.

use crate::error::HeapError;
use crate::heap::RegionHeap;

/// Sentinel returned in place of a payload offset when an operation that
/// would otherwise return a pointer fails.
pub const NULL: u64 = u64::MAX;

/// Sentinel returned by [`read_raw`]/[`write_raw`] on any failure.
pub const FAIL: i64 = -1;

impl<'a> RegionHeap<'a> {
    /// `allocate`, spec surface: returns the payload offset or [`NULL`].
    #[must_use]
    pub fn allocate_raw(&mut self, size: u64) -> u64 {
        self.allocate(size).unwrap_or(NULL)
    }

    /// `free`, spec surface: silent no-op on any failure, including `p ==
    /// NULL`.
    pub fn free_raw(&mut self, payload_offset: u64) {
        if payload_offset == NULL {
            return;
        }
        let _ = self.free(payload_offset);
    }

    /// `read`, spec surface: returns bytes copied or `-1`.
    #[must_use]
    pub fn read_raw(&mut self, payload_offset: u64, offset: u64, out: &mut [u8]) -> i64 {
        match self.read(payload_offset, offset, out) {
            Ok(n) => n as i64,
            Err(_) => FAIL,
        }
    }

    /// `write`, spec surface: returns bytes written or `-1`.
    #[must_use]
    pub fn write_raw(&mut self, payload_offset: u64, offset: u64, src: &[u8]) -> i64 {
        match self.write(payload_offset, offset, src) {
            Ok(n) => n as i64,
            Err(_) => FAIL,
        }
    }

    /// `resize`, spec surface: `payload_offset == NULL` behaves as
    /// `allocate`; a new size of `0` behaves as `free` and returns
    /// [`NULL`]; any other failure also returns [`NULL`].
    #[must_use]
    pub fn resize_raw(&mut self, payload_offset: u64, new_size: u64) -> u64 {
        let target = (payload_offset != NULL).then_some(payload_offset);
        match self.resize(target, new_size) {
            Ok(Some(p)) => p,
            Ok(None) | Err(_) => NULL,
        }
    }
}

/// Maps a [`HeapError`] onto the spec's error taxonomy, for callers that
/// want to distinguish corruption from an ordinary bad argument without
/// depending on [`HeapError`] directly.
#[must_use]
pub const fn is_corruption(err: HeapError) -> bool {
    err.is_corruption()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: [u8; 5] = [0xE1, 0xD2, 0xC3, 0xB4, 0xA5];

    fn region_of(len: usize) -> alloc::vec::Vec<u8> {
        let mut region = alloc::vec::Vec::with_capacity(len);
        for i in 0..len {
            region.push(PATTERN[i % 5]);
        }
        region
    }

    #[test]
    fn allocate_raw_returns_null_on_exhaustion() {
        let mut region = region_of(64);
        let mut heap = RegionHeap::init(&mut region).unwrap();
        assert_eq!(heap.allocate_raw(1024), NULL);
    }

    #[test]
    fn free_raw_of_null_is_a_silent_no_op() {
        let mut region = region_of(1024);
        let mut heap = RegionHeap::init(&mut region).unwrap();
        heap.free_raw(NULL);
    }

    #[test]
    fn read_raw_and_write_raw_round_trip() {
        let mut region = region_of(1024);
        let mut heap = RegionHeap::init(&mut region).unwrap();
        let a = heap.allocate_raw(8);
        assert_ne!(a, NULL);
        let data = [9u8; 8];
        assert_eq!(heap.write_raw(a, 0, &data), 8);
        let mut out = [0u8; 8];
        assert_eq!(heap.read_raw(a, 0, &mut out), 8);
        assert_eq!(out, data);
    }

    #[test]
    fn resize_raw_to_zero_returns_null() {
        let mut region = region_of(1024);
        let mut heap = RegionHeap::init(&mut region).unwrap();
        let a = heap.allocate_raw(32);
        assert_eq!(heap.resize_raw(a, 0), NULL);
    }
}
