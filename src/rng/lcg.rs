use super::{fill_bytes_from_u64, RandomSource};
use rand::{RngCore, SeedableRng};

const MULTIPLIER: u64 = 1_103_515_245;
const INCREMENT: u64 = 12_345;
/// Outputs are 15-bit words, floats divide by this scale
const OUTPUT_SCALE: u64 = 32_768;

/// The classic C-library linear-congruential generator.
///
/// Cheap enough to be called several times per breeding, which is what the engine
/// uses it for by default. Each raw word only carries 15 bits; the `RngCore`
/// implementation stitches several words together for wider outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcgRng {
    state: u64,
}

impl LcgRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn from_seed_str(seed: &str) -> Self {
        let mut rng = Self::new(0);
        rng.seed(seed);
        rng
    }

    #[inline]
    fn step(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT);
        (self.state / 65_536) % OUTPUT_SCALE
    }
}

impl RandomSource for LcgRng {
    #[inline]
    fn next_raw(&mut self) -> u64 {
        self.step()
    }

    #[inline]
    fn float(&mut self) -> f64 {
        self.step() as f64 / OUTPUT_SCALE as f64
    }

    fn reseed(&mut self, seed: u64) {
        self.state = seed;
    }

    fn raw_bits(&self) -> u32 {
        15
    }
}

impl RngCore for LcgRng {
    fn next_u32(&mut self) -> u32 {
        let (a, b, c) = (self.step(), self.step(), self.step());
        ((a << 17) | (b << 2) | (c >> 13)) as u32
    }

    fn next_u64(&mut self) -> u64 {
        // 75 bits are drawn, the oldest 11 shift out
        let mut word = 0u64;
        for _ in 0..5 {
            word = (word << 15) | self.step();
        }
        word
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        fill_bytes_from_u64(self, dst)
    }
}

impl SeedableRng for LcgRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }
}
