/// Source of the non-deterministic choices the file system makes: simulated
/// block contents, file sizes, block selection and handle numbers.
///
/// Swapping in a seeded generator makes every one of those choices
/// reproducible.
pub trait RandomSource {
    fn next_u64(&mut self) -> u64;

    /// Returns a value in `0..bound`. `bound` must be non-zero.
    fn below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        self.next_u64() % bound
    }

    /// Returns a value in `low..=high`.
    fn between(&mut self, low: u64, high: u64) -> u64 {
        debug_assert!(low <= high);
        match (high - low).checked_add(1) {
            Some(span) => low + self.below(span),
            None => self.next_u64(),
        }
    }
}

/// 64-bit linear congruential generator (Knuth's MMIX constants).
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn seeded(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seeds the generator from the operating system.
    pub fn from_entropy() -> Result<Self, getrandom::Error> {
        let mut seed = [0u8; 8];
        getrandom::getrandom(&mut seed)?;
        Ok(Self::seeded(u64::from_le_bytes(seed)))
    }
}

impl RandomSource for Lcg {
    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        // Low bits of an LCG have short periods.
        self.state.rotate_left(32)
    }
}
