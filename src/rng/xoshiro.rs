use super::{fill_bytes_from_u64, RandomSource};
use rand::{RngCore, SeedableRng};

/// Draws discarded after every reseed
const WARM_UP_DRAWS: usize = 100;

/// Substitute for a zero seed, which would leave the state stuck at zero
const ZERO_SEED_FALLBACK: u64 = 0x2545_F491_4F6C_DD1D;

/// xoshiro256** with a multiplicative seeding scheme.
///
/// Slower than [`super::LcgRng`] but each draw carries a full 64 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xoshiro256StarStar {
    state: [u64; 4],
}

impl Xoshiro256StarStar {
    pub fn new(seed: u64) -> Self {
        let mut rng = Self { state: [0; 4] };
        rng.reseed(seed);
        rng
    }

    pub fn from_seed_str(seed: &str) -> Self {
        let mut rng = Self::new(0);
        rng.seed(seed);
        rng
    }

    #[inline]
    fn step(&mut self) -> u64 {
        let s = &mut self.state;
        let result = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = s[1] << 17;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(45);

        result
    }
}

impl RandomSource for Xoshiro256StarStar {
    #[inline]
    fn next_raw(&mut self) -> u64 {
        self.step()
    }

    #[inline]
    fn float(&mut self) -> f64 {
        // top 53 bits over 2^53: the full 64-bit range at f64 precision, never 1.0
        (self.step() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn reseed(&mut self, seed: u64) {
        let seed = if seed == 0 { ZERO_SEED_FALLBACK } else { seed };
        self.state = [
            seed.wrapping_mul(3_216_541_354),
            seed.wrapping_mul(23_215_623),
            seed.wrapping_mul(328_999),
            seed.wrapping_mul(32_956),
        ];
        for _ in 0..WARM_UP_DRAWS {
            self.step();
        }
    }
}

impl RngCore for Xoshiro256StarStar {
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.step()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        fill_bytes_from_u64(self, dst)
    }
}

impl SeedableRng for Xoshiro256StarStar {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }
}
