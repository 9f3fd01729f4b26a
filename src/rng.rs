//! Counter-based RNG substreams.
//!
//! The source seeds one global `Mulberry32` generator at entry and threads
//! it through the whole run. That doesn't parallelize: two workers sharing
//! one mutable generator would race, and the consumption order would no
//! longer be reproducible. Instead every substream here is its own
//! `ChaCha8Rng`, seeded by hashing `(master_seed, chunk_id, stream_id)` into
//! a 256-bit seed with a SplitMix64-style mix (the same shape of
//! counter-based derivation used by batch-indexed `SeedableRng::seed_from_u64`
//! elsewhere in this corpus, generalized to three key components instead of
//! one so the pilot pass and the main pass never share a stream).

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Logical identity of a substream within a run, so the pilot pass, the main
/// pass, and every chunk of the main pass draw from independent streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    Pilot,
    MainChunk(u64),
}

impl StreamId {
    fn tag(self) -> u64 {
        match self {
            StreamId::Pilot => 0xA11CE_u64,
            StreamId::MainChunk(chunk_id) => 0xC0FFEE_0000_0000_u64 ^ chunk_id,
        }
    }
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a deterministic 32-byte seed from the master seed and a stream
/// identity. Same inputs always produce the same seed; different chunk ids
/// produce independent-looking seeds even though they share a master seed.
pub fn derive_seed(master_seed: u64, stream: StreamId) -> [u8; 32] {
    let mut state = master_seed ^ stream.tag();
    let mut seed = [0u8; 32];
    for chunk in seed.chunks_exact_mut(8) {
        state = splitmix64(state);
        chunk.copy_from_slice(&state.to_le_bytes());
    }
    seed
}

pub fn rng_for_stream(master_seed: u64, stream: StreamId) -> ChaCha8Rng {
    ChaCha8Rng::from_seed(derive_seed(master_seed, stream))
}
