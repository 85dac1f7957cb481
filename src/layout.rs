//! Block addressing and alignment-padding arithmetic.

use crate::header::HEADER_SIZE;

/// Required alignment, in bytes, of every allocated payload relative to the
/// region base.
pub const PAYLOAD_ALIGN: u64 = 40;

/// Byte width of a free-node record (see [`crate::free_list`]).
pub const FREE_NODE_SIZE: u64 = 24;

/// Minimum total bytes a remainder must have to be carved off as its own
/// free block instead of being absorbed into the preceding allocation.
pub const MIN_SPLIT_SIZE: u64 = HEADER_SIZE + FREE_NODE_SIZE;

/// Minimum bytes needed for a header-only free block (no payload): a header
/// plus room for the free-node that must live at its payload offset.
pub const MIN_FREE_BLOCK_SIZE: u64 = HEADER_SIZE + FREE_NODE_SIZE;

/// Minimum padding `p >= 0` such that a header placed at
/// `candidate_header_offset + p` has its payload land on a `PAYLOAD_ALIGN`
/// boundary relative to the region base.
#[must_use]
pub const fn padding_for(candidate_header_offset: u64) -> u64 {
    let after_header = candidate_header_offset + HEADER_SIZE;
    let misalignment = after_header % PAYLOAD_ALIGN;
    if misalignment == 0 {
        0
    } else {
        PAYLOAD_ALIGN - misalignment
    }
}

/// Total byte span of a block given its header's `size` and `padding`
/// fields, per the block's own status.
#[must_use]
pub const fn block_bytes(status_is_allocated: bool, size: u64, padding: u64) -> u64 {
    if status_is_allocated {
        HEADER_SIZE + padding + size
    } else {
        // Free blocks store their total extent (incl. header) directly in `size`.
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_for_aligned_offset_is_zero() {
        // header placed so that offset + HEADER_SIZE is already a multiple of 40
        let offset = PAYLOAD_ALIGN - HEADER_SIZE;
        assert_eq!(padding_for(offset), 0);
    }

    #[test]
    fn padding_for_rounds_up_to_next_boundary() {
        let offset = 0;
        let p = padding_for(offset);
        assert_eq!((offset + HEADER_SIZE + p) % PAYLOAD_ALIGN, 0);
        assert!(p < PAYLOAD_ALIGN);
    }

    #[test]
    fn block_bytes_allocated_includes_padding_and_header() {
        assert_eq!(block_bytes(true, 100, 7), HEADER_SIZE + 7 + 100);
    }

    #[test]
    fn block_bytes_free_is_total_size() {
        assert_eq!(block_bytes(false, 512, 0), 512);
    }
}
