//! Error taxonomy for the Result-returning surface.
//!
//! One variant per distinct failure mode, `#[error("...")]` messages, no
//! wrapped causes — mirrors the granularity of the teacher crate's
//! `VmmError`. Every variant maps onto one of spec.md's four error
//! categories (bad argument, state error, integrity failure, space
//! exhaustion); see [`HeapError::is_corruption`].

/// Errors produced by the `corruption_heap` Result surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// `init` was given fewer than 20 bytes.
    #[error("region too small to hold a pattern and a header")]
    RegionTooSmall,
    /// `init` was given a region whose first 20 bytes do not repeat the
    /// 5-byte pattern found in the first 5 bytes.
    #[error("region's first 20 bytes are not 5-byte periodic")]
    PatternNotPeriodic,
    /// `allocate(0)`.
    #[error("requested allocation size is zero")]
    ZeroSizeRequest,
    /// `allocate(s)` with `s > region_len - header_size`.
    #[error("requested allocation size exceeds the region's capacity")]
    RequestTooLarge,
    /// Best-fit search found no free block large enough.
    #[error("no free block large enough to satisfy the request")]
    OutOfMemory,
    /// A payload pointer/offset does not land inside the managed region.
    #[error("pointer does not refer to a location inside the managed region")]
    OutOfRegion,
    /// The block a payload pointer resolves to is not `Allocated` (already
    /// free, or a double-free).
    #[error("block is not allocated (double free or invalid pointer)")]
    NotAllocated,
    /// The block's checksum failed validation; it has been quarantined.
    #[error("block failed integrity validation and has been quarantined")]
    Corrupt,
    /// `write` was called with `offset + len != size`: the write contract
    /// requires covering precisely to the end of the payload.
    #[error("write must cover exactly to the end of the payload (offset + len == size)")]
    WriteNotTailAligned,
    /// A [`crate::singleton`] call was made before [`crate::singleton::GlobalHeap::init`]
    /// succeeded.
    #[error("global heap singleton has not been initialized")]
    NotInitialized,
}

impl HeapError {
    /// Whether this error indicates the affected block is now quarantined.
    #[must_use]
    pub const fn is_corruption(self) -> bool {
        matches!(self, Self::Corrupt)
    }
}
