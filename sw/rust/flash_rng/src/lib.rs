//! Reproducible test-data generators.
//!
//! [`SplitMix64`] mixes an arbitrary seed; [`Xoshiro128PlusPlus`] draws its
//! 128-bit state from one and then produces the byte stream written to flash.

use rand_core::{impls, Error, RngCore, SeedableRng};

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Clone, Debug)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    /// Any seed is valid, including zero.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl RngCore for SplitMix64 {
    fn next_u32(&mut self) -> u32 {
        self.next() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for SplitMix64 {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::new(state)
    }
}

/// xoshiro128++, period 2^128 - 1. Seeded lazily from its scrambler on the
/// first draw; any [`RngCore`] can stand in for the default [`SplitMix64`].
#[derive(Clone, Debug)]
pub struct Xoshiro128PlusPlus<S = SplitMix64> {
    scrambler: S,
    state: Option<[u32; 4]>,
}

impl Xoshiro128PlusPlus {
    pub fn from_seed_u64(seed: u64) -> Self {
        Self::new(SplitMix64::new(seed))
    }

    /// Starts from an explicit state. The all-zero state is a fixed point and
    /// is refused.
    pub fn from_state(state: [u32; 4]) -> Option<Self> {
        if state.iter().all(|&w| w == 0) {
            return None;
        }
        Some(Self { scrambler: SplitMix64::new(0), state: Some(state) })
    }
}

impl<S: RngCore> Xoshiro128PlusPlus<S> {
    pub fn new(scrambler: S) -> Self {
        Self { scrambler, state: None }
    }

    pub fn state(&self) -> Option<[u32; 4]> {
        self.state
    }

    pub fn scrambler(&self) -> &S {
        &self.scrambler
    }

    fn seeded_state(&mut self) -> &mut [u32; 4] {
        let scrambler = &mut self.scrambler;
        self.state.get_or_insert_with(|| loop {
            let s = [
                scrambler.next_u64() as u32,
                scrambler.next_u64() as u32,
                scrambler.next_u64() as u32,
                scrambler.next_u64() as u32,
            ];
            if s[0] | s[1] | s[2] | s[3] != 0 {
                break s;
            }
        })
    }

    pub fn next(&mut self) -> u32 {
        let s = self.seeded_state();
        let result = s[0].wrapping_add(s[3]).rotate_left(7).wrapping_add(s[0]);

        let t = s[1] << 9;
        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(11);

        result
    }

    /// One draw per byte, truncated. This is how sector patterns are made.
    pub fn fill_pattern(&mut self, dest: &mut [u8]) {
        for b in dest {
            *b = self.next() as u8;
        }
    }
}

impl<S: RngCore> RngCore for Xoshiro128PlusPlus<S> {
    fn next_u32(&mut self) -> u32 {
        self.next()
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.fill_pattern(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_pattern(dest);
        Ok(())
    }
}
