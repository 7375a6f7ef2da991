//! The single process-wide pseudo-random stream shared by site/process selection, time
//! propagation and the distributor shuffles (§5).
//!
//! Seeding is explicit (`use_time`, `seed`) and the stream kind is selectable; for reproducible
//! runs, identical seed and kind must produce identical sequences. The core does not reach for
//! the platform RNG except when `use_time` selects [`RngKind::Device`] or no seed is given.

use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_hc::Hc128Rng;
use rand_mt::Mt19937GenRand64;
use rand_pcg::Pcg32;
use std::time::{SystemTime, UNIX_EPOCH};

/// Selects which underlying generator backs a [`RandomStream`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RngKind {
    /// Mersenne Twister (MT19937-64). The default.
    #[default]
    MersenneTwister,
    /// A small, fast linear generator (stand-in for `std::minstd_rand`).
    MinStd,
    /// HC-128 (stand-in for `std::ranlux24`; both are "high quality, moderate cost" streams).
    Ranlux24,
    /// ChaCha20 (stand-in for `std::ranlux48`; both are "high quality, higher cost" streams).
    Ranlux48,
    /// The platform's own entropy source (`std::random_device`). Not reproducible.
    Device,
}

/// The shared pseudo-random stream. Every caller that needs randomness borrows this mutably;
/// the core never keeps more than one instance alive at a time (§5).
pub enum RandomStream {
    /// See [`RngKind::MersenneTwister`].
    MersenneTwister(Box<Mt19937GenRand64>),
    /// See [`RngKind::MinStd`].
    MinStd(Pcg32),
    /// See [`RngKind::Ranlux24`].
    Ranlux24(Box<Hc128Rng>),
    /// See [`RngKind::Ranlux48`].
    Ranlux48(Box<ChaCha20Rng>),
    /// See [`RngKind::Device`].
    Device(OsRng),
}

impl RandomStream {
    /// Constructs a new stream of the given `kind`.
    ///
    /// If `use_time` is `true`, `seed` is ignored and the stream is seeded from the current
    /// time (or, for [`RngKind::Device`], reads directly from platform entropy on every draw).
    /// Otherwise the stream is seeded deterministically from `seed`; given the same `kind` and
    /// `seed`, the resulting sequence is reproducible.
    #[must_use]
    pub fn new(kind: RngKind, use_time: bool, seed: u64) -> Self {
        let seed = if use_time { Self::time_seed() } else { seed };

        match kind {
            RngKind::MersenneTwister => {
                Self::MersenneTwister(Box::new(Mt19937GenRand64::new(seed)))
            }
            RngKind::MinStd => Self::MinStd(Pcg32::seed_from_u64(seed)),
            RngKind::Ranlux24 => Self::Ranlux24(Box::new(Hc128Rng::seed_from_u64(seed))),
            RngKind::Ranlux48 => Self::Ranlux48(Box::new(ChaCha20Rng::seed_from_u64(seed))),
            RngKind::Device => Self::Device(OsRng),
        }
    }

    fn time_seed() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64)
    }

    /// Draws a uniform sample in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        // top 53 bits of a 64-bit draw give a uniform f64 in [0, 1) without bias towards zero.
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draws a uniform integer in `0..bound`. `bound` must be non-zero.
    pub fn below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0);
        (self.uniform() * bound as f64) as usize
    }

    /// Fisher-Yates shuffle of `slice`, in place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.below(i + 1);
            slice.swap(i, j);
        }
    }
}

impl RngCore for RandomStream {
    fn next_u32(&mut self) -> u32 {
        match self {
            Self::MersenneTwister(rng) => rng.next_u32(),
            Self::MinStd(rng) => rng.next_u32(),
            Self::Ranlux24(rng) => rng.next_u32(),
            Self::Ranlux48(rng) => rng.next_u32(),
            Self::Device(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            Self::MersenneTwister(rng) => rng.next_u64(),
            Self::MinStd(rng) => rng.next_u64(),
            Self::Ranlux24(rng) => rng.next_u64(),
            Self::Ranlux48(rng) => rng.next_u64(),
            Self::Device(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match self {
            Self::MersenneTwister(rng) => rng.fill_bytes(dest),
            Self::MinStd(rng) => rng.fill_bytes(dest),
            Self::Ranlux24(rng) => rng.fill_bytes(dest),
            Self::Ranlux48(rng) => rng.fill_bytes(dest),
            Self::Device(rng) => rng.fill_bytes(dest),
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        match self {
            Self::MersenneTwister(rng) => rng.try_fill_bytes(dest),
            Self::MinStd(rng) => rng.try_fill_bytes(dest),
            Self::Ranlux24(rng) => rng.try_fill_bytes(dest),
            Self::Ranlux48(rng) => rng.try_fill_bytes(dest),
            Self::Device(rng) => rng.try_fill_bytes(dest),
        }
    }
}
