//! Optional process-wide convenience wrapper over one [`RegionHeap`].
//!
//! The library surface is instance-based (see [`crate::heap`]): a caller
//! can run as many independent `RegionHeap`s as it has regions for, and
//! nothing here is required to use the crate. This module exists for
//! callers that want the original's "one allocator, module-global state"
//! feel — ported from the teacher crate's `static_heap` module, which
//! guards a `FreeListAllocator` behind a spinlock. Unlike that module,
//! this crate does not reserve a fixed-size `.bss` array: the region is
//! still caller-supplied, so [`GlobalHeap::init`] takes a `&'static mut
//! [u8]` instead of computing an address from static storage.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::HeapError;
use crate::heap::RegionHeap;

/// A tiny spinlock for short critical sections, adapted inline from the
/// teacher crate's `kernel_sync::spin_lock::SpinLock` (that crate's
/// version additionally threads through architecture-specific interrupt
/// control that has no counterpart here, so it is not taken as a
/// dependency — see DESIGN.md).
///
/// Suitable only for uniprocessor or short critical sections: it busy-waits
/// with [`core::hint::spin_loop`] and does not disable interrupts.
struct SpinLock<T> {
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion is enforced by `locked`; sharing across threads
// is sound as long as `T` itself is `Send`.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        // Safety: the compare_exchange above gives this call exclusive access
        // until `locked` is released below.
        let result = {
            let inner = unsafe { &mut *self.inner.get() };
            f(inner)
        };
        self.locked.store(false, Ordering::Release);
        result
    }
}

/// Process-wide allocator instance, guarded by a spinlock.
///
/// `None` until [`init`](Self::init) succeeds; every other method returns
/// [`HeapError::NotInitialized`] until then.
pub struct GlobalHeap {
    inner: SpinLock<Option<RegionHeap<'static>>>,
}

/// The process-wide instance. Unused until [`GlobalHeap::init`] is called.
pub static HEAP: GlobalHeap = GlobalHeap::new();

impl GlobalHeap {
    const fn new() -> Self {
        Self {
            inner: SpinLock::new(None),
        }
    }

    /// Initialize the global instance over `region`.
    ///
    /// Replaces any previously initialized instance (dropping its borrow
    /// of the old region).
    ///
    /// # Safety
    /// `region` must remain valid for the rest of the process and must
    /// not be accessed through any path other than this singleton for as
    /// long as it stays installed.
    pub unsafe fn init(&self, region: &'static mut [u8]) -> Result<(), HeapError> {
        let heap = RegionHeap::init(region)?;
        self.inner.with_lock(|slot| *slot = Some(heap));
        Ok(())
    }

    fn with<R>(&self, f: impl FnOnce(&mut RegionHeap<'static>) -> R) -> Result<R, HeapError> {
        self.inner
            .with_lock(|slot| slot.as_mut().map(f))
            .ok_or(HeapError::NotInitialized)
    }

    /// See [`RegionHeap::allocate`].
    pub fn allocate(&self, size: u64) -> Result<u64, HeapError> {
        self.with(|heap| heap.allocate(size))?
    }

    /// See [`RegionHeap::free`].
    pub fn free(&self, payload_offset: u64) -> Result<(), HeapError> {
        self.with(|heap| heap.free(payload_offset))?
    }

    /// See [`RegionHeap::read`].
    pub fn read(&self, payload_offset: u64, offset: u64, out: &mut [u8]) -> Result<usize, HeapError> {
        self.with(|heap| heap.read(payload_offset, offset, out))?
    }

    /// See [`RegionHeap::write`].
    pub fn write(&self, payload_offset: u64, offset: u64, src: &[u8]) -> Result<usize, HeapError> {
        self.with(|heap| heap.write(payload_offset, offset, src))?
    }

    /// See [`RegionHeap::resize`].
    pub fn resize(&self, payload_offset: Option<u64>, new_size: u64) -> Result<Option<u64>, HeapError> {
        self.with(|heap| heap.resize(payload_offset, new_size))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak_region(len: usize) -> &'static mut [u8] {
        let pattern = [0xE1u8, 0xD2, 0xC3, 0xB4, 0xA5];
        let mut region = alloc::vec![0u8; len];
        for (i, byte) in region.iter_mut().enumerate() {
            *byte = pattern[i % 5];
        }
        alloc::boxed::Box::leak(region.into_boxed_slice())
    }

    #[test]
    fn uninitialized_global_reports_not_initialized() {
        let heap = GlobalHeap::new();
        assert_eq!(heap.allocate(16), Err(HeapError::NotInitialized));
    }

    #[test]
    fn init_then_allocate_and_free_round_trip() {
        let heap = GlobalHeap::new();
        let region = leak_region(1024);
        // Safety: `region` was just leaked and is touched only through `heap`.
        unsafe { heap.init(region).expect("pattern-filled region") };
        let a = heap.allocate(64).expect("room for 64 bytes");
        assert!(heap.free(a).is_ok());
    }
}
