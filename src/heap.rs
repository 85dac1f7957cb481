//! The allocator instance: init, allocate, free, read, write, resize.
//!
//! Works entirely in `u64` byte offsets into a caller-owned `&mut [u8]`
//! region — no raw pointers, no `unsafe`. A "payload pointer" in the spec's
//! vocabulary is a payload *offset* here; see the REDESIGN notes in
//! SPEC_FULL.md for why offsets replace addresses throughout.

use alloc::vec::Vec;

use crate::error::HeapError;
use crate::free_list::{FreeList, FreeNode};
use crate::header::{self, HEADER_SIZE, Header, Status, Validation};
use crate::layout::{self, FREE_NODE_SIZE, MIN_FREE_BLOCK_SIZE, MIN_SPLIT_SIZE, PAYLOAD_ALIGN};
use crate::pattern::Pattern;
use log::{debug, trace, warn};

/// A single allocator instance bound to one caller-supplied region.
///
/// Non-goals (see spec): thread safety, multiple heaps sharing hidden
/// process state, returning memory to the OS, compaction. See
/// [`crate::singleton`] for an optional process-wide convenience wrapper.
pub struct RegionHeap<'a> {
    region: &'a mut [u8],
    free_list: FreeList,
    pattern: Pattern,
}

impl<'a> RegionHeap<'a> {
    /// Initialize the allocator over `region`.
    ///
    /// Rejects regions shorter than 20 bytes (can't confirm the pattern) or
    /// shorter than `HEADER_SIZE + FREE_NODE_SIZE` (couldn't hold even the
    /// single whole-region free block this creates) — the second bound is
    /// stricter than the spec's bare ">= 20 bytes" wording but is required
    /// for the resulting free block to be internally consistent; see
    /// DESIGN.md.
    ///
    /// # Errors
    /// Returns [`HeapError::RegionTooSmall`] or
    /// [`HeapError::PatternNotPeriodic`] without mutating `region`.
    pub fn init(region: &'a mut [u8]) -> Result<Self, HeapError> {
        if region.len() < 20 {
            warn!("init: region of {} bytes is below the 20-byte minimum", region.len());
            return Err(HeapError::RegionTooSmall);
        }
        let pattern = Pattern::capture(region).ok_or_else(|| {
            warn!("init: first 20 bytes are not 5-byte periodic");
            HeapError::PatternNotPeriodic
        })?;
        let len = region.len() as u64;
        if len < HEADER_SIZE + FREE_NODE_SIZE {
            warn!("init: region of {len} bytes cannot hold a header and a free-node");
            return Err(HeapError::RegionTooSmall);
        }

        let mut header = Header {
            size: len,
            status: Status::Free,
            checksum: 0,
            checksum_not: 0,
            checksum_xor: 0,
            padding: 0,
        };
        header.encode(region, 0);
        let node_offset = HEADER_SIZE;
        FreeNode { next: None, prev: None, header: 0 }.encode(region, node_offset);
        let mut free_list = FreeList::new();
        free_list.insert(region, node_offset);
        header.reseal(region, 0);

        debug!("init: {len} byte region ready, whole-region free block at offset 0");
        Ok(Self { region, free_list, pattern })
    }

    /// Total length of the managed region.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.region.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Direct mutable access to the managed region's raw bytes, bypassing
    /// every header/checksum check.
    ///
    /// Exists for test and demo harnesses that need to simulate a "storm"
    /// flipping bits between calls without holding a second, aliasing
    /// borrow of the region alongside the `RegionHeap` itself — see
    /// `demos/storm_harness.rs`. Not meant for ordinary callers: nothing
    /// about the returned slice is validated on the next call in, by
    /// design (that is what the checksum/quarantine machinery is for).
    pub fn raw_region_mut(&mut self) -> &mut [u8] {
        self.region
    }

    fn check_bounds(&self, payload_offset: u64) -> Result<u64, HeapError> {
        let len = self.len();
        if payload_offset < HEADER_SIZE || payload_offset >= len {
            return Err(HeapError::OutOfRegion);
        }
        let header_offset = payload_offset - HEADER_SIZE;
        if header_offset + HEADER_SIZE > len {
            return Err(HeapError::OutOfRegion);
        }
        Ok(header_offset)
    }

    /// Resolve `payload_offset` to its header, checking status *before*
    /// validating — matches the free() contract, which must treat a
    /// double-free (status already FREE) as a plain no-op without first
    /// forcing a checksum pass over it.
    fn resolve_for_free(&mut self, payload_offset: u64) -> Result<(u64, Header), HeapError> {
        let header_offset = self.check_bounds(payload_offset)?;
        let raw = Header::decode(self.region, header_offset);
        if raw.status != Status::Allocated {
            return Err(HeapError::NotAllocated);
        }
        let (header, validation) = header::validate(self.region, header_offset);
        if validation == Validation::Corrupt {
            warn!("free: block at offset {header_offset} failed validation, quarantined");
            return Err(HeapError::Corrupt);
        }
        Ok((header_offset, header))
    }

    /// Resolve `payload_offset` to its header for read/write/resize:
    /// validates the checksum first, then checks allocation status.
    fn resolve_for_access(&mut self, payload_offset: u64) -> Result<(u64, Header), HeapError> {
        let header_offset = self.check_bounds(payload_offset)?;
        let (header, validation) = header::validate(self.region, header_offset);
        if validation == Validation::Corrupt {
            warn!("access: block at offset {header_offset} failed validation, quarantined");
            return Err(HeapError::Corrupt);
        }
        if header.status != Status::Allocated {
            return Err(HeapError::NotAllocated);
        }
        Ok((header_offset, header))
    }

    /// Validate every node on the free list, quarantining and unlinking any
    /// block whose checksum no longer holds (a storm may have flipped bits
    /// in a free block's header since the last call), and return the
    /// remaining valid `(node_offset, header_offset, header)` triples.
    ///
    /// This is the only place the free list is walked; every operation
    /// that needs to find a free neighbor or candidate goes through here,
    /// which keeps invariant I3 (free list iff valid and FREE) intact no
    /// matter when the corruption happened.
    fn scan_and_scrub_free_list(&mut self) -> Vec<(u64, u64, Header)> {
        let entries: Vec<(u64, u64)> = self.free_list.iter(self.region).collect();
        let mut out = Vec::with_capacity(entries.len());
        for (node_offset, header_offset) in entries {
            let (header, validation) = header::validate(self.region, header_offset);
            if validation == Validation::Corrupt || header.status != Status::Free {
                warn!("scrub: free-list entry at offset {header_offset} is no longer valid, unlinking");
                self.free_list.remove(self.region, node_offset);
                continue;
            }
            out.push((node_offset, header_offset, header));
        }
        out
    }

    fn best_fit(&mut self, size: u64) -> Option<(u64, u64, Header)> {
        let entries = self.scan_and_scrub_free_list();
        let mut best: Option<(u64, u64, Header)> = None;
        for (node_offset, header_offset, header) in entries {
            let need = layout::padding_for(header_offset) + HEADER_SIZE + size;
            if header.size >= need {
                let better = best.as_ref().is_none_or(|(_, _, b)| header.size < b.size);
                if better {
                    best = Some((node_offset, header_offset, header));
                }
            }
        }
        best
    }

    /// Allocate a payload of `size` bytes. Returns the payload offset.
    ///
    /// # Errors
    /// [`HeapError::ZeroSizeRequest`], [`HeapError::RequestTooLarge`], or
    /// [`HeapError::OutOfMemory`].
    pub fn allocate(&mut self, size: u64) -> Result<u64, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSizeRequest);
        }
        let capacity = self.len() - HEADER_SIZE;
        if size > capacity {
            return Err(HeapError::RequestTooLarge);
        }
        let Some((node_offset, header_offset, header)) = self.best_fit(size) else {
            trace!("allocate: no free block fits {size} bytes");
            return Err(HeapError::OutOfMemory);
        };
        self.free_list.remove(self.region, node_offset);

        let padding = layout::padding_for(header_offset);
        let used = padding + HEADER_SIZE + size;
        let remainder = header.size - used;
        let mut final_size = size;

        if remainder >= MIN_SPLIT_SIZE {
            let new_free_offset = header_offset + used;
            let mut new_free_header = Header {
                size: remainder,
                status: Status::Free,
                checksum: 0,
                checksum_not: 0,
                checksum_xor: 0,
                padding: 0,
            };
            new_free_header.encode(self.region, new_free_offset);
            let node_off = new_free_offset + HEADER_SIZE;
            FreeNode { next: None, prev: None, header: new_free_offset }.encode(self.region, node_off);
            self.free_list.insert(self.region, node_off);
            new_free_header.reseal(self.region, new_free_offset);
        } else {
            final_size += remainder;
        }

        let new_header_offset = header_offset + padding;
        if padding > 0 {
            self.pattern.refill(self.region, header_offset, padding);
        }
        let padding_u8 = u8::try_from(padding).expect("padding is always < PAYLOAD_ALIGN");
        let mut alloc_header = Header {
            size: final_size,
            status: Status::Allocated,
            checksum: 0,
            checksum_not: 0,
            checksum_xor: 0,
            padding: padding_u8,
        };
        alloc_header.encode(self.region, new_header_offset);
        alloc_header.reseal(self.region, new_header_offset);

        trace!("allocate: {size} bytes -> payload offset {}", new_header_offset + HEADER_SIZE);
        Ok(new_header_offset + HEADER_SIZE)
    }

    /// Free a previously allocated payload. A no-op on an out-of-region
    /// offset, a double-free, or a corrupted block (which is quarantined
    /// instead).
    pub fn free(&mut self, payload_offset: u64) -> Result<(), HeapError> {
        let (header_offset, header) = self.resolve_for_free(payload_offset)?;

        let block_start = header_offset - u64::from(header.padding);
        let next_addr = header_offset + HEADER_SIZE + header.size;
        let entries = self.scan_and_scrub_free_list();
        let right = entries.iter().find(|&&(_, ho, _)| ho == next_addr).copied();
        let left = entries
            .iter()
            .find(|&&(_, ho, h)| ho + h.size == block_start)
            .copied();

        let mut new_header_offset = block_start;
        let mut total_size = next_addr - block_start;

        if let Some((right_node, _, right_header)) = right {
            self.free_list.remove(self.region, right_node);
            total_size += right_header.size;
        }
        if let Some((left_node, left_ho, left_header)) = left {
            self.free_list.remove(self.region, left_node);
            new_header_offset = left_ho;
            total_size = left_header.size + total_size;
        }

        let mut merged = Header {
            size: total_size,
            status: Status::Free,
            checksum: 0,
            checksum_not: 0,
            checksum_xor: 0,
            padding: 0,
        };
        merged.encode(self.region, new_header_offset);
        let node_offset = new_header_offset + HEADER_SIZE;
        FreeNode { next: None, prev: None, header: new_header_offset }.encode(self.region, node_offset);
        self.free_list.insert(self.region, node_offset);

        debug_assert!(
            total_size >= MIN_FREE_BLOCK_SIZE,
            "a freestanding free block can never be smaller than header + free-node"
        );
        let wipe_start = node_offset + FREE_NODE_SIZE;
        let wipe_len = total_size - HEADER_SIZE - FREE_NODE_SIZE;
        if wipe_len > 0 {
            self.pattern.refill(self.region, wipe_start, wipe_len);
        }
        merged.reseal(self.region, new_header_offset);

        trace!("free: payload offset {payload_offset} -> merged free block of {total_size} bytes");
        Ok(())
    }

    /// Read up to `out.len()` bytes from the payload at `offset`.
    ///
    /// Returns the number of bytes copied (`0` if `out` is empty or
    /// `offset == size`). Never mutates the block.
    ///
    /// # Errors
    /// [`HeapError::OutOfRegion`] (including `offset > size`),
    /// [`HeapError::Corrupt`], or [`HeapError::NotAllocated`].
    pub fn read(&mut self, payload_offset: u64, offset: u64, out: &mut [u8]) -> Result<usize, HeapError> {
        let (_, header) = self.resolve_for_access(payload_offset)?;
        let len = out.len() as u64;
        if len == 0 || offset == header.size {
            return Ok(0);
        }
        if offset > header.size {
            // Not specified by name in the source this was distilled from; rather than
            // replicate its unsigned-underflow read-past-end behavior, this is treated as
            // an ordinary bad-argument error. See DESIGN.md.
            return Err(HeapError::OutOfRegion);
        }
        let available = header.size - offset;
        let to_read = core::cmp::min(len, available) as usize;
        let start = (payload_offset + offset) as usize;
        out[..to_read].copy_from_slice(&self.region[start..start + to_read]);
        Ok(to_read)
    }

    /// Write `src` to the payload at `offset`. The repository's write
    /// contract requires `offset + src.len() == size`: writes must cover
    /// precisely to the end of the payload (see DESIGN.md for why this
    /// unusual-looking rule is kept rather than relaxed).
    ///
    /// # Errors
    /// [`HeapError::WriteNotTailAligned`] if `offset + src.len() != size`,
    /// plus the same validation errors as [`read`](Self::read).
    pub fn write(&mut self, payload_offset: u64, offset: u64, src: &[u8]) -> Result<usize, HeapError> {
        let (header_offset, mut header) = self.resolve_for_access(payload_offset)?;
        let len = src.len() as u64;
        if offset.checked_add(len) != Some(header.size) {
            return Err(HeapError::WriteNotTailAligned);
        }
        if len == 0 {
            return Ok(0);
        }
        let start = (payload_offset + offset) as usize;
        self.region[start..start + len as usize].copy_from_slice(src);
        header.reseal(self.region, header_offset);
        Ok(len as usize)
    }

    /// Resize the allocation at `payload_offset` (or allocate fresh if
    /// `payload_offset` is `None`) to `new_size` bytes.
    ///
    /// `new_size == 0` is equivalent to [`free`](Self::free) and returns
    /// `Ok(None)` regardless of whether `payload_offset` was a valid
    /// allocation (matching the spec's "no-op on bad free target" rule).
    ///
    /// # Errors
    /// [`HeapError::Corrupt`], [`HeapError::NotAllocated`], or
    /// [`HeapError::OutOfMemory`] if even the allocate-copy-free fallback
    /// fails.
    pub fn resize(&mut self, payload_offset: Option<u64>, new_size: u64) -> Result<Option<u64>, HeapError> {
        let Some(ptr) = payload_offset else {
            return self.allocate(new_size).map(Some);
        };
        if new_size == 0 {
            let _ = self.free(ptr);
            return Ok(None);
        }
        let header_offset = self.check_bounds(ptr)?;
        let (header, validation) = header::validate(self.region, header_offset);
        if validation == Validation::Corrupt {
            return Err(HeapError::Corrupt);
        }
        if header.status != Status::Allocated {
            return Err(HeapError::NotAllocated);
        }
        if new_size == header.size {
            return Ok(Some(ptr));
        }
        let result = if new_size > header.size {
            self.grow(header_offset, header, new_size)
        } else {
            self.shrink(header_offset, header, new_size)
        };
        result.map(Some)
    }

    fn find_free_at(&mut self, target_header_offset: u64) -> Option<(u64, u64, Header)> {
        self.scan_and_scrub_free_list()
            .into_iter()
            .find(|&(_, ho, _)| ho == target_header_offset)
    }

    fn find_free_ending_at(&mut self, block_start: u64) -> Option<(u64, u64, Header)> {
        self.scan_and_scrub_free_list()
            .into_iter()
            .find(|&(_, ho, h)| ho + h.size == block_start)
    }

    /// Try to grow in place by absorbing the right (forward) free
    /// neighbor. The header never moves, so alignment is unaffected.
    fn try_forward_grow(&mut self, header_offset: u64, header: &Header, new_size: u64, delta: u64) -> Option<u64> {
        let next_addr = header_offset + HEADER_SIZE + header.size;
        let (right_node, right_ho, right_header) = self.find_free_at(next_addr)?;
        if right_header.size <= delta {
            return None; // not enough room; leave the right block untouched
        }
        let residual = right_header.size - delta;
        if residual < MIN_SPLIT_SIZE {
            return None; // forfeit: residual too small to stand alone, leave right block untouched
        }
        self.free_list.remove(self.region, right_node);
        let new_free_offset = right_ho + delta;
        let mut new_free_header = Header {
            size: residual,
            status: Status::Free,
            checksum: 0,
            checksum_not: 0,
            checksum_xor: 0,
            padding: 0,
        };
        new_free_header.encode(self.region, new_free_offset);
        let node_off = new_free_offset + HEADER_SIZE;
        FreeNode { next: None, prev: None, header: new_free_offset }.encode(self.region, node_off);
        self.free_list.insert(self.region, node_off);
        new_free_header.reseal(self.region, new_free_offset);

        let mut grown = *header;
        grown.size = new_size;
        grown.reseal(self.region, header_offset);
        Some(header_offset + HEADER_SIZE)
    }

    /// Try to grow in place by claiming space from the left (backward)
    /// free neighbor.
    ///
    /// Only attempted when `delta` is a multiple of [`PAYLOAD_ALIGN`]: the
    /// block's right edge is fixed (the `next` block must not move), which
    /// forces the new header to land exactly `delta` bytes before the old
    /// one. That shift only preserves the 40-byte payload alignment
    /// invariant when `delta` is itself a multiple of 40; otherwise no
    /// valid in-place position exists and the operation falls back to
    /// allocate-copy-free. Moving the header back by `delta` also moves
    /// the payload's start back by `delta`, so the old payload bytes (still
    /// sitting at their old absolute offsets) land at relative offset
    /// `delta` in the new payload, not `0` — they are moved into place
    /// with an overlap-safe `copy_within` before the header is resealed.
    fn try_backward_grow(&mut self, header_offset: u64, header: &Header, new_size: u64, delta: u64) -> Option<u64> {
        if delta % PAYLOAD_ALIGN != 0 {
            return None;
        }
        let block_start = header_offset - u64::from(header.padding);
        let (_, left_ho, mut left_header) = self.find_free_ending_at(block_start)?;
        if left_header.size < delta + MIN_FREE_BLOCK_SIZE {
            return None;
        }
        let new_header_offset = header_offset - delta;

        left_header.size -= delta;
        left_header.reseal(self.region, left_ho);

        let old_payload_start = (header_offset + HEADER_SIZE) as usize;
        let new_payload_start = (new_header_offset + HEADER_SIZE) as usize;
        let old_payload_len = header.size as usize;
        self.region.copy_within(old_payload_start..old_payload_start + old_payload_len, new_payload_start);

        let mut grown = Header {
            size: new_size,
            status: Status::Allocated,
            checksum: 0,
            checksum_not: 0,
            checksum_xor: 0,
            padding: header.padding,
        };
        grown.encode(self.region, new_header_offset);
        grown.reseal(self.region, new_header_offset);

        Some(new_header_offset + HEADER_SIZE)
    }

    fn grow(&mut self, header_offset: u64, header: Header, new_size: u64) -> Result<u64, HeapError> {
        let delta = new_size - header.size;
        if let Some(ptr) = self.try_forward_grow(header_offset, &header, new_size, delta) {
            return Ok(ptr);
        }
        if let Some(ptr) = self.try_backward_grow(header_offset, &header, new_size, delta) {
            return Ok(ptr);
        }
        debug!("resize: falling back to allocate-copy-free to grow to {new_size} bytes");
        let old_ptr = header_offset + HEADER_SIZE;
        let new_ptr = self.allocate(new_size)?;
        let to_copy = core::cmp::min(header.size, new_size) as usize;
        self.region.copy_within(old_ptr as usize..old_ptr as usize + to_copy, new_ptr as usize);
        let _ = self.free(old_ptr);
        Ok(new_ptr)
    }

    fn shrink(&mut self, header_offset: u64, header: Header, new_size: u64) -> Result<u64, HeapError> {
        let delta = header.size - new_size;
        let next_addr = header_offset + HEADER_SIZE + header.size;
        let right = self.find_free_at(next_addr);

        if let Some((right_node, right_ho, right_header)) = right {
            self.free_list.remove(self.region, right_node);
            let new_free_offset = header_offset + HEADER_SIZE + new_size;
            let merged_size = delta + right_header.size;
            let mut new_free_header = Header {
                size: merged_size,
                status: Status::Free,
                checksum: 0,
                checksum_not: 0,
                checksum_xor: 0,
                padding: 0,
            };
            new_free_header.encode(self.region, new_free_offset);
            let node_off = new_free_offset + HEADER_SIZE;
            FreeNode { next: None, prev: None, header: new_free_offset }.encode(self.region, node_off);
            self.free_list.insert(self.region, node_off);
            new_free_header.reseal(self.region, new_free_offset);
            debug_assert_eq!(right_ho, next_addr);

            let mut shrunk = header;
            shrunk.size = new_size;
            shrunk.reseal(self.region, header_offset);
            return Ok(header_offset + HEADER_SIZE);
        }

        if delta >= PAYLOAD_ALIGN {
            let new_free_offset = header_offset + HEADER_SIZE + new_size;
            let mut new_free_header = Header {
                size: delta,
                status: Status::Free,
                checksum: 0,
                checksum_not: 0,
                checksum_xor: 0,
                padding: 0,
            };
            new_free_header.encode(self.region, new_free_offset);
            let node_off = new_free_offset + HEADER_SIZE;
            FreeNode { next: None, prev: None, header: new_free_offset }.encode(self.region, node_off);
            self.free_list.insert(self.region, node_off);
            new_free_header.reseal(self.region, new_free_offset);

            let mut shrunk = header;
            shrunk.size = new_size;
            shrunk.reseal(self.region, header_offset);
            return Ok(header_offset + HEADER_SIZE);
        }

        debug!("resize: falling back to allocate-copy-free to shrink to {new_size} bytes");
        let old_ptr = header_offset + HEADER_SIZE;
        let new_ptr = self.allocate(new_size)?;
        let to_copy = new_size as usize;
        self.region.copy_within(old_ptr as usize..old_ptr as usize + to_copy, new_ptr as usize);
        let _ = self.free(old_ptr);
        Ok(new_ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: [u8; 5] = [0xE1, 0xD2, 0xC3, 0xB4, 0xA5];

    fn region_of(len: usize) -> Vec<u8> {
        let mut region = Vec::with_capacity(len);
        for i in 0..len {
            region.push(PATTERN[i % 5]);
        }
        region
    }

    fn init(region: &mut [u8]) -> RegionHeap<'_> {
        RegionHeap::init(region).expect("init succeeds on a pattern-filled region")
    }

    #[test]
    fn basic_alloc_and_free_reunites_whole_region() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(16).unwrap();
        let b = heap.allocate(32).unwrap();
        let c = heap.allocate(64).unwrap();
        heap.free(a).unwrap();
        heap.free(b).unwrap();
        heap.free(c).unwrap();
        assert_eq!(heap.free_list.iter(heap.region).count(), 1);
        let (_, header_offset) = heap.free_list.iter(heap.region).next().unwrap();
        let header = Header::decode(heap.region, header_offset);
        assert_eq!(header.size, 1024);
    }

    #[test]
    fn freed_block_is_reused() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(128).unwrap();
        heap.free(a).unwrap();
        let b = heap.allocate(128).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn coalesce_two_left_then_allocate_across() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(32).unwrap();
        let b = heap.allocate(32).unwrap();
        let _c = heap.allocate(32).unwrap();
        heap.free(b).unwrap();
        heap.free(a).unwrap();
        let d = heap.allocate(64).unwrap();
        assert_eq!(d, a);
    }

    #[test]
    fn split_returns_head_of_original_block() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(128).unwrap();
        heap.free(a).unwrap();
        let b = heap.allocate(64).unwrap();
        let c = heap.allocate(64).unwrap();
        assert_eq!(b, a);
        assert_ne!(c, b);
    }

    #[test]
    fn zero_size_allocation_rejected() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        assert_eq!(heap.allocate(0), Err(HeapError::ZeroSizeRequest));
        assert!(heap.allocate(1).is_ok());
    }

    #[test]
    fn free_of_out_of_region_offset_is_a_safe_no_op() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        assert_eq!(heap.free(9_999), Err(HeapError::OutOfRegion));
        let a = heap.allocate(64).unwrap();
        assert!(heap.free(a).is_ok());
    }

    #[test]
    fn resize_grows_forward_into_right_neighbor() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(64).unwrap();
        let b = heap.resize(Some(a), 128).unwrap().unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn resize_to_zero_frees_and_returns_none() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(128).unwrap();
        let result = heap.resize(Some(a), 0).unwrap();
        assert_eq!(result, None);
        assert_eq!(heap.free_list.iter(heap.region).count(), 1);
    }

    #[test]
    fn resize_of_null_is_allocate() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.resize(None, 128).unwrap();
        assert!(a.is_some());
    }

    #[test]
    fn double_free_is_a_no_op_and_heap_stays_consistent() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(64).unwrap();
        heap.free(a).unwrap();
        assert_eq!(heap.free(a), Err(HeapError::NotAllocated));
        assert_eq!(heap.free_list.iter(heap.region).count(), 1);
    }

    #[test]
    fn corrupted_header_is_quarantined_and_never_reused() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(64).unwrap();
        let header_offset = (a - HEADER_SIZE) as usize;
        // Flip a bit in the stored checksum byte; the header itself is untouched.
        heap.region[header_offset + 9] ^= 0x01;

        let mut out = [0u8; 8];
        assert_eq!(heap.read(a, 0, &mut out), Err(HeapError::Corrupt));

        let status_byte = heap.region[header_offset + 8];
        assert_eq!(status_byte, crate::header::QUARANTINE_SENTINEL);

        // A corrupted, never-freed block was never on the free list and isn't now.
        assert_eq!(heap.free_list.iter(heap.region).count(), 0);
        // free() checks status before validating; a quarantined block reads as
        // not-allocated rather than resurrecting through the free path.
        assert_eq!(heap.free(a), Err(HeapError::NotAllocated));
    }

    #[test]
    fn quarantined_block_breaks_coalescing_between_its_neighbors() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(32).unwrap();
        let b = heap.allocate(32).unwrap();
        let c = heap.allocate(32).unwrap();

        // Put b on the free list, then corrupt its checksum byte in place.
        // free() writes the merged free header at the block's own start
        // offset, which generally differs from `b`'s old payload-relative
        // header offset once padding is absorbed, so read it back from the
        // free list rather than recomputing it.
        heap.free(b).unwrap();
        let (_, b_header_offset) = heap.free_list.iter(heap.region).next().unwrap();
        let b_header_offset = b_header_offset as usize;
        heap.region[b_header_offset + 9] ^= 0x01;

        // Freeing a's neighbors forces a free-list scrub that discovers b no
        // longer validates; b is quarantined and unlinked instead of merged.
        heap.free(a).unwrap();
        heap.free(c).unwrap();

        assert_eq!(
            heap.region[b_header_offset + 8],
            crate::header::QUARANTINE_SENTINEL
        );
        // a's block and c's block are both free but never merged through b.
        assert_eq!(heap.free_list.iter(heap.region).count(), 2);

        // The quarantined extent can never be allocated over: only two
        // small standalone pockets remain free, not one contiguous run.
        assert!(heap.allocate(64).is_err());
    }

    #[test]
    fn write_requires_exact_tail_alignment() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(16).unwrap();
        let data = [1u8; 16];
        assert!(heap.write(a, 0, &data).is_ok());
        assert_eq!(heap.write(a, 1, &data[..15]), Err(HeapError::WriteNotTailAligned));
    }

    #[test]
    fn read_after_write_round_trips() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(8).unwrap();
        let data = [7u8; 8];
        heap.write(a, 0, &data).unwrap();
        let mut out = [0u8; 8];
        let n = heap.read(a, 0, &mut out).unwrap();
        assert_eq!(n, 8);
        assert_eq!(out, data);
    }

    #[test]
    fn resize_preserves_payload_prefix() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(32).unwrap();
        let data = [9u8; 32];
        heap.write(a, 0, &data).unwrap();
        let b = heap.resize(Some(a), 64).unwrap().unwrap();
        let mut out = [0u8; 32];
        heap.read(b, 0, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn unrelated_relink_does_not_quarantine_a_middle_free_block() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(50).unwrap();
        let b = heap.allocate(50).unwrap();
        let c = heap.allocate(50).unwrap();
        let d = heap.allocate(50).unwrap();
        let _ = (a, c);

        heap.free(b).unwrap();
        // b's free header offset can differ from its padding-absorbed
        // allocated header offset; read it back from the list head rather
        // than recomputing it (same caveat as the quarantine tests above).
        let (_, b_header_offset) = heap.free_list.iter(heap.region).next().unwrap();

        // Freeing d merges it with the trailing free block, which unlinks
        // that block from the list and rewrites the `next`/`prev` field of
        // whichever node sat next to it — here, b. That relink must not be
        // mistaken for corruption.
        heap.free(d).unwrap();

        // Force a free-list scrub (the next call that walks the list) and
        // confirm b survived the relink unquarantined and still reachable.
        let _ = heap.allocate(8).unwrap();

        let status_byte = heap.region[b_header_offset as usize + 8];
        assert_ne!(
            status_byte,
            crate::header::QUARANTINE_SENTINEL,
            "relinking a neighboring free node must not quarantine b"
        );
        assert!(
            heap.free_list.iter(heap.region).any(|(_, ho)| ho == b_header_offset),
            "b must still be reachable from the free list after the relink"
        );
    }

    #[test]
    fn resize_grows_backward_into_left_neighbor_and_preserves_payload() {
        let mut region = region_of(1024);
        let mut heap = init(&mut region);
        let a = heap.allocate(50).unwrap();
        let b = heap.allocate(20).unwrap();
        let _c = heap.allocate(50).unwrap();

        let data = [3u8; 20];
        heap.write(b, 0, &data).unwrap();

        // Freeing a leaves b with a free left neighbor and an allocated
        // (non-free) right neighbor, forcing the grow through the
        // backward-merge path rather than the forward one.
        heap.free(a).unwrap();

        let grown = heap.resize(Some(b), 60).unwrap().unwrap();
        assert_ne!(grown, b, "backward growth must move the header/payload start");

        let mut out = [0u8; 20];
        heap.read(grown, 0, &mut out).unwrap();
        assert_eq!(out, data, "P7: backward-grown payload must preserve its old prefix");
    }
}
