//! Deterministic random number generation.
//!
//! k-means seeding and the synthetic scenarios in tests and benchmarks need
//! reproducible randomness. [`SimpleRng`] is a minimal Xorshift64 generator
//! that implements [`rand::RngCore`], so it can be passed anywhere a
//! `rand::Rng` is expected.

/// Xorshift64 generator.
///
/// Same seed, same stream on every platform; not suitable for anything
/// security related.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Seeded generator; a zero seed is replaced by 1 (the all-zero state never leaves zero)
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn step(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

impl rand::RngCore for SimpleRng {
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.step()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
