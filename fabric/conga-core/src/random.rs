// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::id::LeafId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A source of randomness for breaking ties between equally good choices
pub trait Generator: 'static {
    /// Returns a uniformly distributed index in `0..len`
    ///
    /// `len` must be non-zero.
    fn gen_index(&mut self, len: usize) -> usize;
}

/// A reproducible generator
///
/// ChaCha is used over a platform-dependent small RNG so a seed reproduces the same
/// decisions on every target.
#[derive(Clone, Debug)]
pub struct Seeded(ChaCha8Rng);

impl Seeded {
    #[inline]
    pub fn new(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Derives a generator for a single leaf from the simulation-wide seed
    ///
    /// Each leaf gets a distinct stream so that leaves don't all resolve ties onto the
    /// same core at the same time.
    #[inline]
    pub fn for_leaf(seed: u64, leaf: LeafId) -> Self {
        Self::new(splitmix64(seed ^ u64::from(leaf.as_u32())))
    }
}

impl Generator for Seeded {
    #[inline]
    fn gen_index(&mut self, len: usize) -> usize {
        debug_assert_ne!(len, 0);
        self.0.gen_range(0..len)
    }
}

/// Finalizer from the SplitMix64 generator, used to spread adjacent seeds apart
#[inline]
pub fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use crate::random;

    /// Cycles through indices in order
    #[derive(Debug, Default)]
    pub struct Generator(pub usize);

    impl random::Generator for Generator {
        fn gen_index(&mut self, len: usize) -> usize {
            let index = self.0 % len;
            self.0 = self.0.wrapping_add(1);
            index
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_index_in_range_test() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|(seed, len): (u64, u16)| {
                let len = len as usize + 1;
                let mut generator = Seeded::new(seed);
                for _ in 0..8 {
                    assert!(generator.gen_index(len) < len);
                }
            });
    }

    #[test]
    fn same_seed_same_stream_test() {
        let mut a = Seeded::for_leaf(7, LeafId::new(3));
        let mut b = Seeded::for_leaf(7, LeafId::new(3));
        let a: Vec<_> = (0..64).map(|_| a.gen_index(12)).collect();
        let b: Vec<_> = (0..64).map(|_| b.gen_index(12)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn leaves_get_distinct_streams_test() {
        let mut a = Seeded::for_leaf(7, LeafId::new(0));
        let mut b = Seeded::for_leaf(7, LeafId::new(1));
        let a: Vec<_> = (0..64).map(|_| a.gen_index(1 << 16)).collect();
        let b: Vec<_> = (0..64).map(|_| b.gen_index(1 << 16)).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn testing_generator_cycles_test() {
        let mut generator = testing::Generator::default();
        let picks: Vec<_> = (0..6).map(|_| generator.gen_index(3)).collect();
        assert_eq!(picks, [0, 1, 2, 0, 1, 2]);
    }
}
