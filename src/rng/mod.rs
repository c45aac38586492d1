//! Deterministic pseudo-random sources used by every part of the engine.
//!
//! Two algorithms are provided, a fast linear-congruential generator (`LcgRng`) and
//! a xoshiro256** generator (`Xoshiro256StarStar`). Both expose the same drawing API
//! through the `RandomSource` trait, and both implement `rand::RngCore` so callbacks
//! can reach for the `rand` API on the very same stream.

pub mod lcg;
pub mod xoshiro;

pub use lcg::LcgRng;
pub use xoshiro::Xoshiro256StarStar;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Odd constant used to spread worker indices over the seed space
const STREAM_DERIVATION_PRIME: u64 = 0x9E37_79B9_7F4A_7C15;

/// Hashes a seed string into a 32-bit seed.
///
/// Every ASCII character contributes `(hash + value * position)^2`; non-ASCII
/// characters are skipped but still advance the position. Empty input yields 0.
pub fn seed_hash(seed: &str) -> u32 {
    let mut hash: u32 = 0;
    for (idx, ch) in seed.chars().enumerate() {
        if ch.is_ascii() {
            let term = hash.wrapping_add((ch as u32).wrapping_mul(idx as u32));
            hash = term.wrapping_mul(term);
        }
    }
    hash
}

/// Derives the seed of worker `worker` from a run-wide base seed.
pub fn derive_stream_seed(base_seed: u64, worker: usize) -> u64 {
    base_seed.wrapping_add((worker as u64).wrapping_mul(STREAM_DERIVATION_PRIME))
}

/// The drawing contract shared by both generators.
///
/// Implementors only provide the raw word, the float scale and reseeding; every
/// ranged draw is built on top of those.
pub trait RandomSource {
    /// Next raw word of the underlying generator.
    fn next_raw(&mut self) -> u64;

    /// Uniform float in `[0, 1)`.
    fn float(&mut self) -> f64;

    /// Restarts the stream from a numeric seed.
    fn reseed(&mut self, seed: u64);

    /// Restarts the stream from a string seed, see [`seed_hash`].
    fn seed(&mut self, seed: &str) {
        self.reseed(u64::from(seed_hash(seed)));
    }

    /// Random bits carried by one raw word.
    fn raw_bits(&self) -> u32 {
        64
    }

    /// A fully random 64-bit word, stitched from several raw words when one raw word
    /// is narrower.
    fn wide_raw(&mut self) -> u64 {
        let bits = self.raw_bits();
        if bits >= 64 {
            return self.next_raw();
        }
        let mut word = 0u64;
        let mut filled = 0;
        while filled < 64 {
            word = (word << bits) | self.next_raw();
            filled += bits;
        }
        word
    }

    /// Non-negative uniform integer.
    fn int(&mut self) -> i64 {
        (self.next_raw() & i64::MAX as u64) as i64
    }

    /// Uniform integer in `[min, max]`. Reversed bounds are swapped.
    ///
    /// Spans one raw word can cover take a single draw; wider spans draw a stitched
    /// word so every value stays reachable.
    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        if lo == hi {
            return lo;
        }
        let span = (i128::from(hi) - i128::from(lo) + 1) as u128;
        let single_word = 1u128 << self.raw_bits().min(63);
        let offset = if span <= single_word {
            (self.int() as u128) % span
        } else {
            (self.wide_raw() as u128) % span
        };
        (i128::from(lo) + offset as i128) as i64
    }

    /// Uniform index in `[0, len)`, `None` when `len` is zero.
    fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.int_range(0, len as i64 - 1) as usize)
    }

    /// `float()` scaled into `[min, max)`.
    fn float_range(&mut self, min: f64, max: f64) -> f64 {
        self.float() * (max - min) + min
    }

    /// Uniform pick from a slice.
    fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T>
    where
        Self: Sized,
    {
        let idx = self.index(items.len())?;
        items.get(idx)
    }

    /// Index picked with probability proportional to its weight.
    ///
    /// Negative and NaN weights count as zero; `None` when no weight is positive.
    fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        let weight = |w: f64| if w > 0.0 { w } else { 0.0 };
        let total: f64 = weights.iter().map(|&w| weight(w)).sum();
        if total <= 0.0 {
            return None;
        }
        let mut remaining = self.float() * total;
        let mut last_positive = None;
        for (idx, &w) in weights.iter().enumerate() {
            let w = weight(w);
            if w == 0.0 {
                continue;
            }
            if remaining < w {
                return Some(idx);
            }
            remaining -= w;
            last_positive = Some(idx);
        }
        // rounding can leave a sliver past the last weight
        last_positive
    }

    /// Builds a new ordering by inserting every item at a random position of the
    /// output so far.
    fn shuffle<T, I>(&mut self, items: I) -> Vec<T>
    where
        Self: Sized,
        I: IntoIterator<Item = T>,
    {
        let mut results = Vec::new();
        for item in items {
            let at = self.int_range(0, results.len() as i64) as usize;
            results.insert(at, item);
        }
        results
    }

    /// Removes and returns one uniformly chosen element, keeping the others in order.
    fn remove_random<T>(&mut self, items: &mut Vec<T>) -> Option<T>
    where
        Self: Sized,
    {
        let idx = self.index(items.len())?;
        Some(items.remove(idx))
    }

    /// Bernoulli trial, `true` with probability `p`.
    fn maybe(&mut self, p: f64) -> bool {
        self.float() < p
    }
}

/// Generator algorithm selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RngKind {
    #[default]
    Lcg,
    Xoshiro,
}

/// The generator handed to every model callback.
#[derive(Debug, Clone)]
pub enum Prng {
    Lcg(LcgRng),
    Xoshiro(Xoshiro256StarStar),
}

impl Prng {
    /// Builds a generator of the given kind from a numeric seed
    pub fn new(kind: RngKind, seed: u64) -> Self {
        match kind {
            RngKind::Lcg => Prng::Lcg(LcgRng::new(seed)),
            RngKind::Xoshiro => Prng::Xoshiro(Xoshiro256StarStar::new(seed)),
        }
    }

    /// Builds a generator of the given kind from a string seed
    pub fn from_seed_str(kind: RngKind, seed: &str) -> Self {
        Self::new(kind, u64::from(seed_hash(seed)))
    }

    /// Builds the independent stream of one ring worker
    pub fn for_worker(kind: RngKind, base_seed: u64, worker: usize) -> Self {
        Self::new(kind, derive_stream_seed(base_seed, worker))
    }

    pub fn kind(&self) -> RngKind {
        match self {
            Prng::Lcg(_) => RngKind::Lcg,
            Prng::Xoshiro(_) => RngKind::Xoshiro,
        }
    }
}

impl RandomSource for Prng {
    fn next_raw(&mut self) -> u64 {
        match self {
            Prng::Lcg(rng) => rng.next_raw(),
            Prng::Xoshiro(rng) => rng.next_raw(),
        }
    }

    fn raw_bits(&self) -> u32 {
        match self {
            Prng::Lcg(rng) => rng.raw_bits(),
            Prng::Xoshiro(rng) => rng.raw_bits(),
        }
    }

    fn float(&mut self) -> f64 {
        match self {
            Prng::Lcg(rng) => rng.float(),
            Prng::Xoshiro(rng) => rng.float(),
        }
    }

    fn reseed(&mut self, seed: u64) {
        match self {
            Prng::Lcg(rng) => rng.reseed(seed),
            Prng::Xoshiro(rng) => rng.reseed(seed),
        }
    }
}

impl RngCore for Prng {
    fn next_u32(&mut self) -> u32 {
        match self {
            Prng::Lcg(rng) => rng.next_u32(),
            Prng::Xoshiro(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            Prng::Lcg(rng) => rng.next_u64(),
            Prng::Xoshiro(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        match self {
            Prng::Lcg(rng) => rng.fill_bytes(dst),
            Prng::Xoshiro(rng) => rng.fill_bytes(dst),
        }
    }
}

/// Fills `dst` from successive `next_u64` words, little-endian.
pub(crate) fn fill_bytes_from_u64<R: RngCore + ?Sized>(rng: &mut R, dst: &mut [u8]) {
    for chunk in dst.chunks_mut(8) {
        let word = rng.next_u64().to_le_bytes();
        chunk.copy_from_slice(&word[..chunk.len()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn both_kinds() -> [RngKind; 2] {
        [RngKind::Lcg, RngKind::Xoshiro]
    }

    #[test]
    fn test_seed_hash_edge_cases() {
        assert_eq!(seed_hash(""), 0);
        // first character always sits at position 0 and contributes nothing
        assert_eq!(seed_hash("A"), 0);
        // "AB": (0 + 66 * 1)^2
        assert_eq!(seed_hash("AB"), 66 * 66);
        // non-ASCII is skipped but still advances the position
        assert_eq!(seed_hash("éB"), 66 * 66);
        assert_eq!(seed_hash("ééé"), 0);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        for kind in both_kinds() {
            let mut a = Prng::from_seed_str(kind, "reproducible");
            let mut b = Prng::from_seed_str(kind, "reproducible");
            for _ in 0..1_000 {
                assert_eq!(a.next_raw(), b.next_raw());
                assert_eq!(a.int_range(-5, 5), b.int_range(-5, 5));
                assert_eq!(a.float().to_bits(), b.float().to_bits());
                assert_eq!(a.maybe(0.3), b.maybe(0.3));
            }
            let items: Vec<u32> = (0..32).collect();
            assert_eq!(a.shuffle(items.clone()), b.shuffle(items));
        }
    }

    #[test]
    fn test_reseed_restarts_stream() {
        for kind in both_kinds() {
            let mut rng = Prng::from_seed_str(kind, "restart");
            let first: Vec<u64> = (0..16).map(|_| rng.next_raw()).collect();
            rng.seed("restart");
            let second: Vec<u64> = (0..16).map(|_| rng.next_raw()).collect();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_int_range_bounds() {
        for kind in both_kinds() {
            let mut rng = Prng::new(kind, 7);
            for _ in 0..10_000 {
                let v = rng.int_range(-3, 9);
                assert!((-3..=9).contains(&v), "{} out of range", v);
            }
            for _ in 0..100 {
                assert_eq!(rng.int_range(4, 4), 4);
            }
            // reversed bounds are treated as the same interval
            for _ in 0..1_000 {
                let v = rng.int_range(9, -3);
                assert!((-3..=9).contains(&v));
            }
            // full range must not overflow
            let _ = rng.int_range(i64::MIN, i64::MAX);
            assert!(rng.int() >= 0);
        }
    }

    #[test]
    fn test_wide_ranges_reach_the_upper_half() {
        for kind in both_kinds() {
            let mut rng = Prng::new(kind, 7);
            let mut upper = 0;
            for _ in 0..20_000 {
                let v = rng.int_range(0, 1_000_000);
                assert!((0..=1_000_000).contains(&v));
                if v > 500_000 {
                    upper += 1;
                }
            }
            // roughly half the draws, far from zero
            assert!(upper > 8_000, "{:?}: only {} draws above the midpoint", kind, upper);
        }
    }

    #[test]
    fn test_remove_random_reaches_the_tail_of_long_vectors() {
        let mut rng = Prng::new(RngKind::Lcg, 7);
        let mut items: Vec<u32> = (0..100_000).collect();
        let tail = (0..2_000)
            .filter_map(|_| rng.remove_random(&mut items))
            .filter(|&v| v >= 40_000)
            .count();
        assert!(tail > 1_000, "only {} picks from the tail", tail);
    }

    #[test]
    fn test_narrow_ranges_keep_single_draw_sequence() {
        let mut rng = Prng::new(RngKind::Lcg, 13);
        let mut replay = rng.clone();
        for _ in 0..100 {
            let expected = replay.next_raw() % 1_000;
            assert_eq!(rng.int_range(0, 999), expected as i64);
        }
    }

    #[test]
    fn test_float_in_unit_interval() {
        for kind in both_kinds() {
            let mut rng = Prng::new(kind, 99);
            for _ in 0..10_000 {
                let f = rng.float();
                assert!((0.0..1.0).contains(&f), "{} out of [0,1)", f);
                let g = rng.float_range(2.0, 4.0);
                assert!((2.0..4.0).contains(&g));
            }
        }
    }

    #[test]
    fn test_maybe_extremes() {
        for kind in both_kinds() {
            let mut rng = Prng::new(kind, 1234);
            let never = (0..100_000).filter(|_| rng.maybe(0.0)).count();
            let always = (0..100_000).filter(|_| rng.maybe(1.0)).count();
            assert_eq!(never, 0);
            assert_eq!(always, 100_000);
        }
    }

    #[test]
    fn test_empty_collections_yield_none() {
        for kind in both_kinds() {
            let mut rng = Prng::new(kind, 5);
            let empty: Vec<u8> = Vec::new();
            assert!(rng.choose(&empty).is_none());
            let mut empty_mut: Vec<u8> = Vec::new();
            assert!(rng.remove_random(&mut empty_mut).is_none());
            assert!(rng.index(0).is_none());
            assert!(rng.shuffle(empty).is_empty());
        }
    }

    #[test]
    fn test_choose_weighted() {
        let mut rng = Prng::new(RngKind::Xoshiro, 21);
        assert_eq!(rng.choose_weighted(&[]), None);
        assert_eq!(rng.choose_weighted(&[0.0, -1.0, f64::NAN]), None);
        for _ in 0..1_000 {
            assert_eq!(rng.choose_weighted(&[0.0, 2.0, 0.0]), Some(1));
        }
        let mut counts = [0usize; 2];
        for _ in 0..10_000 {
            counts[rng.choose_weighted(&[1.0, 3.0]).unwrap()] += 1;
        }
        assert!(counts[1] > counts[0] * 2);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut rng = Prng::new(RngKind::Xoshiro, 42);
        let items: Vec<u32> = (0..50).collect();
        let mut shuffled = rng.shuffle(items.clone());
        assert_eq!(shuffled.len(), items.len());
        shuffled.sort_unstable();
        assert_eq!(shuffled, items);
    }

    #[test]
    fn test_shuffle_uses_insertion_order() {
        // replays the insertion shuffle by hand on a cloned stream
        let mut rng = Prng::new(RngKind::Lcg, 77);
        let mut replay = rng.clone();
        let shuffled = rng.shuffle(vec!['a', 'b', 'c', 'd']);

        let mut expected: Vec<char> = Vec::new();
        for item in ['a', 'b', 'c', 'd'] {
            let at = replay.int_range(0, expected.len() as i64) as usize;
            expected.insert(at, item);
        }
        assert_eq!(shuffled, expected);
    }

    #[test]
    fn test_remove_random_keeps_the_rest() {
        let mut rng = Prng::new(RngKind::Lcg, 3);
        let mut items = vec![10, 20, 30, 40, 50];
        let removed = rng.remove_random(&mut items).unwrap();
        assert_eq!(items.len(), 4);
        assert!(!items.contains(&removed));
        assert!(items.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_worker_streams_differ() {
        let mut a = Prng::for_worker(RngKind::Xoshiro, 11, 0);
        let mut b = Prng::for_worker(RngKind::Xoshiro, 11, 1);
        let xs: Vec<u64> = (0..8).map(|_| a.next_raw()).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.next_raw()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn test_rand_interop() {
        let mut rng = Prng::new(RngKind::Xoshiro, 8);
        for _ in 0..1_000 {
            let v: u32 = rng.random_range(10..20);
            assert!((10..20).contains(&v));
        }
        let mut buf = [0u8; 13];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
