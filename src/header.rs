//! Block header encoding, checksumming, and quarantine transition.
//!
//! Mirrors the `header` struct from the original allocator: a fixed-size
//! record at the front of every block carrying `size`, `status`, a
//! triple-redundant checksum, and the padding count absorbed in front of
//! allocated blocks. Headers are never kept as live Rust references into the
//! region — they are decoded from bytes, validated, and re-encoded on every
//! mutation, so a storm that flips bits between calls can never be read
//! through a stale reference.

/// Byte width of an encoded [`Header`] inside the region.
pub const HEADER_SIZE: u64 = 13;

/// Sentinel byte stamped into a header's status field the moment it is
/// quarantined, so a quarantined block stays identifiable even if further
/// bits are flipped afterward (hardening suggested by the design notes:
/// any single further flip of this sentinel still decodes to "not 0, not 1",
/// i.e. still [`Status::Quarantined`]).
pub const QUARANTINE_SENTINEL: u8 = 0xFF;

/// Tag of a block header.
///
/// `Free` and `Allocated` round-trip exactly through their single-byte
/// encoding; any other byte value decodes to `Quarantined`, matching the
/// spec's "QUARANTINED = anything else" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Free,
    Allocated,
    Quarantined,
}

impl Status {
    const FREE: u8 = 0;
    const ALLOCATED: u8 = 1;

    #[must_use]
    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            Self::Free => Self::FREE,
            Self::Allocated => Self::ALLOCATED,
            Self::Quarantined => QUARANTINE_SENTINEL,
        }
    }

    #[must_use]
    pub(crate) const fn from_byte(byte: u8) -> Self {
        match byte {
            Self::FREE => Self::Free,
            Self::ALLOCATED => Self::Allocated,
            _ => Self::Quarantined,
        }
    }
}

/// Decoded block header.
///
/// For allocated blocks `size` is the payload byte count; for free blocks
/// `size` is the total block byte count including the header itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub size: u64,
    pub status: Status,
    pub checksum: u8,
    pub checksum_not: u8,
    pub checksum_xor: u8,
    pub padding: u8,
}

impl Header {
    /// Decode a header from `region[offset..]` without validating it.
    ///
    /// Callers must run [`validate`] before trusting anything other than
    /// what is needed to locate the block (its extent).
    pub(crate) fn decode(region: &[u8], offset: u64) -> Self {
        let o = offset as usize;
        let size = u64::from_le_bytes(region[o..o + 8].try_into().unwrap());
        let status = Status::from_byte(region[o + 8]);
        let checksum = region[o + 9];
        let checksum_not = region[o + 10];
        let checksum_xor = region[o + 11];
        let padding = region[o + 12];
        Self {
            size,
            status,
            checksum,
            checksum_not,
            checksum_xor,
            padding,
        }
    }

    /// Encode `self` into `region[offset..]`.
    pub(crate) fn encode(&self, region: &mut [u8], offset: u64) {
        let o = offset as usize;
        region[o..o + 8].copy_from_slice(&self.size.to_le_bytes());
        region[o + 8] = self.status.to_byte();
        region[o + 9] = self.checksum;
        region[o + 10] = self.checksum_not;
        region[o + 11] = self.checksum_xor;
        region[o + 12] = self.padding;
    }

    /// Recompute and stamp all three checksum fields in place, then write
    /// the header back to `region[offset..]`.
    pub(crate) fn reseal(&mut self, region: &mut [u8], offset: u64) {
        self.checksum = compute_checksum(region, offset, self.size, self.status);
        self.checksum_not = !self.checksum;
        self.checksum_xor = self.checksum ^ self.checksum_not;
        self.encode(region, offset);
    }

    /// Force this header into the quarantined state and persist the
    /// sentinel status byte immediately — even if the rest of the header
    /// is suspect, the status byte itself is trustworthy from this point
    /// on.
    pub(crate) fn quarantine(region: &mut [u8], offset: u64) {
        region[offset as usize + 8] = QUARANTINE_SENTINEL;
    }
}

/// `Σ bytes(size) + status + Σ payload[0..size]`, low 8 bits.
///
/// The payload summation is skipped when `size == 0`, and is only read when
/// the payload genuinely lies within the region (callers only reach this
/// after confirming the block's claimed extent fits).
fn compute_checksum(region: &[u8], header_offset: u64, size: u64, status: Status) -> u8 {
    let mut sum: u32 = 0;
    for byte in size.to_le_bytes() {
        sum = sum.wrapping_add(u32::from(byte));
    }
    sum = sum.wrapping_add(u32::from(status.to_byte()));
    if size > 0 {
        let payload_start = (header_offset + HEADER_SIZE) as usize;
        let payload_end = payload_start + size as usize;
        if payload_end <= region.len() {
            for &byte in &region[payload_start..payload_end] {
                sum = sum.wrapping_add(u32::from(byte));
            }
        }
    }
    (sum & 0xFF) as u8
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Validation {
    Ok,
    Corrupt,
}

/// Decode the header at `offset`, check its triple-redundant checksum, and
/// irreversibly quarantine it on any mismatch.
///
/// Three independent checks, per the design rationale: `checksum` alone
/// cannot tell a payload flip from a metadata flip; `checksum_not` catches a
/// single-bit flip of the checksum byte itself; `checksum_xor` catches a
/// coordinated flip that fakes complementarity (e.g. both bytes zeroed).
pub(crate) fn validate(region: &mut [u8], offset: u64) -> (Header, Validation) {
    let header = Header::decode(region, offset);
    if header.checksum_not != !header.checksum {
        Header::quarantine(region, offset);
        return (Header::decode(region, offset), Validation::Corrupt);
    }
    if header.checksum_xor != (header.checksum ^ header.checksum_not) {
        Header::quarantine(region, offset);
        return (Header::decode(region, offset), Validation::Corrupt);
    }
    let recomputed = compute_checksum(region, offset, header.size, header.status);
    if recomputed != header.checksum {
        Header::quarantine(region, offset);
        return (Header::decode(region, offset), Validation::Corrupt);
    }
    (header, Validation::Ok)
}
