//! Storm-harness demo.
//!
//! Mirrors the original allocator's `runme.c` driver: seeds a
//! pattern-filled buffer, drives a sequence of allocate/free/resize
//! calls against [`corruption_heap::RegionHeap`], and — matching what the
//! original called a "storm" — flips random bits in the region between
//! calls. The point of the exercise is purely to demonstrate that the
//! allocator never panics and never misuses a block it has reason to
//! distrust: a corrupted block should be reported and quarantined, never
//! silently reused.
//!
//! This binary is example/demo tooling, not part of the library surface
//! (see spec.md's "Out of scope" list) — the allocator itself never
//! generates randomness or touches a CLI.
//!
//! ```text
//! cargo run --example storm_harness -- --seed 1 --storm 4 --size 4096
//! ```

use corruption_heap::{HeapError, RegionHeap};

const PATTERN: [u8; 5] = [0xE1, 0xD2, 0xC3, 0xB4, 0xA5];

/// Tiny, dependency-free xorshift64* PRNG. Good enough to scatter bit
/// flips across a buffer deterministically from a seed; not intended for
/// anything security-sensitive.
struct Xorshift64(u64);

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        // xorshift64* is undefined at seed 0.
        Self(if seed == 0 { 0xDEAD_BEEF_CAFE_F00D } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn next_in(&mut self, bound: u64) -> u64 {
        if bound == 0 { 0 } else { self.next_u64() % bound }
    }
}

struct Args {
    seed: u64,
    storm: u32,
    size: usize,
}

fn parse_args() -> Args {
    let mut args = Args { seed: 0, storm: 0, size: 1024 };
    let mut argv = std::env::args().skip(1);
    while let Some(flag) = argv.next() {
        match flag.as_str() {
            "--seed" => args.seed = argv.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "--storm" => args.storm = argv.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "--size" => args.size = argv.next().and_then(|s| s.parse().ok()).unwrap_or(1024),
            other => {
                eprintln!("unknown or incomplete argument: {other}");
                std::process::exit(1);
            }
        }
    }
    args
}

/// Flip `count` random bits anywhere in `region`. This is the "storm":
/// it happens strictly between calls into the heap, never during one.
fn storm(rng: &mut Xorshift64, region: &mut [u8], count: u32) {
    for _ in 0..count {
        let byte = rng.next_in(region.len() as u64) as usize;
        let bit = rng.next_in(8) as u32;
        region[byte] ^= 1 << bit;
    }
}

fn main() {
    env_logger::init();
    let args = parse_args();
    log::info!("seed = {}, storm = {}, size = {}", args.seed, args.storm, args.size);

    let mut region = vec![0u8; args.size];
    for (i, byte) in region.iter_mut().enumerate() {
        *byte = PATTERN[i % 5];
    }

    let mut heap = RegionHeap::init(&mut region).expect("pattern-filled region of sane size");
    let mut rng = Xorshift64::new(args.seed);

    log::info!("=== allocate a few blocks ===");
    let p2 = heap.allocate(640).ok();
    let p1 = heap.allocate(64).expect("64 bytes always fits a fresh 1KiB+ region");
    log::info!("allocated 64 bytes at offset {p1}");
    if let Some(p2) = p2 {
        heap.free(p2).expect("p2 was a fresh allocation");
    }

    storm(&mut rng, heap.raw_region_mut(), args.storm);

    log::info!("=== resize p1 to 640 bytes ===");
    match heap.resize(Some(p1), 640) {
        Ok(Some(p1b)) if p1b == p1 => log::info!("resize returned the same offset {p1b}"),
        Ok(Some(p1b)) => log::info!("resize moved the allocation to offset {p1b}"),
        Ok(None) => unreachable!("resize to a non-zero size never returns None"),
        Err(HeapError::Corrupt) => log::warn!("p1's header was caught by the storm; quarantined"),
        Err(other) => log::warn!("resize failed: {other}"),
    }

    storm(&mut rng, heap.raw_region_mut(), args.storm);

    log::info!("=== double free probe ===");
    match heap.free(p1) {
        Ok(()) => log::info!("freed p1"),
        Err(err) => log::info!("free(p1) reported {err} (already freed, moved, or quarantined)"),
    }
    match heap.free(p1) {
        Ok(()) => unreachable!("a block cannot be freed twice"),
        Err(err) => log::info!("second free(p1) correctly reported {err}"),
    }

    log::info!("storm harness completed without panicking");
}
