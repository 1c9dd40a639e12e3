// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Uplink selection from per-path scores

use crate::{id::UplinkId, random};

/// Relative weight of the two congestion tables in an uplink's score
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weights {
    pub to_leaf: f64,
    pub from_leaf: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            to_leaf: 1.0,
            from_leaf: 1.0,
        }
    }
}

impl Weights {
    #[inline]
    pub fn score(&self, to_leaf: f64, from_leaf: f64) -> f64 {
        self.to_leaf * to_leaf + self.from_leaf * from_leaf
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    pub uplink: UplinkId,
    pub score: f64,
    /// Number of uplinks that were within tolerance of the best score
    pub candidates: usize,
}

/// Picks uniformly among the uplinks scoring within `epsilon` of the best
///
/// The candidate buffer is kept between calls so selecting doesn't allocate.
#[derive(Debug, Default)]
pub struct Selector {
    candidates: Vec<(UplinkId, f64)>,
}

impl Selector {
    pub fn select<I, R>(&mut self, scores: I, epsilon: f64, random: &mut R) -> Option<Selection>
    where
        I: IntoIterator<Item = (UplinkId, f64)>,
        R: random::Generator + ?Sized,
    {
        self.candidates.clear();
        self.candidates.extend(scores);

        let best = self
            .candidates
            .iter()
            .map(|(_, score)| *score)
            .fold(f64::INFINITY, f64::min);
        if !best.is_finite() {
            return None;
        }

        let threshold = best + epsilon;
        self.candidates.retain(|(_, score)| *score <= threshold);

        let candidates = self.candidates.len();
        let (uplink, score) = self.candidates[random.gen_index(candidates)];

        Some(Selection {
            uplink,
            score,
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{id::LeafId, random::Seeded};

    fn uplinks(scores: &[f64]) -> impl Iterator<Item = (UplinkId, f64)> + '_ {
        scores
            .iter()
            .enumerate()
            .map(|(index, score)| (UplinkId::new(index as u32), *score))
    }

    #[test]
    fn empty_test() {
        let mut selector = Selector::default();
        let mut random = Seeded::new(1);
        assert!(selector.select(uplinks(&[]), 1.0, &mut random).is_none());
    }

    #[test]
    fn picks_best_outside_tolerance_test() {
        let mut selector = Selector::default();
        let mut random = Seeded::new(1);
        for _ in 0..100 {
            let selection = selector
                .select(uplinks(&[336.0, 0.0, 12.0]), 1.0, &mut random)
                .unwrap();
            assert_eq!(selection.uplink, UplinkId::new(1));
            assert_eq!(selection.candidates, 1);
        }
    }

    #[test]
    fn tolerance_groups_near_ties_test() {
        let mut selector = Selector::default();
        let mut random = random::testing::Generator::default();
        let scores = [5.0, 5.5, 6.0, 6.01];
        let picks: Vec<_> = (0..6)
            .map(|_| selector.select(uplinks(&scores), 1.0, &mut random).unwrap())
            .map(|selection| selection.uplink.as_u32())
            .collect();
        assert_eq!(picks, [0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn uniform_on_ties_test() {
        const TRIALS: usize = 40_000;

        for uplink_count in [2usize, 4, 12] {
            let scores = vec![0.0; uplink_count];
            let mut selector = Selector::default();
            let mut random = Seeded::for_leaf(42, LeafId::new(3));
            let mut counts = vec![0usize; uplink_count];

            for _ in 0..TRIALS {
                let selection = selector.select(uplinks(&scores), 1.0, &mut random).unwrap();
                counts[selection.uplink.as_usize()] += 1;
            }

            let expected = 1.0 / uplink_count as f64;
            for count in counts {
                let frequency = count as f64 / TRIALS as f64;
                assert!(
                    (frequency - expected).abs() < 0.02,
                    "{frequency} is not close to {expected}"
                );
            }
        }
    }

    #[test]
    fn in_range_test() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|(seed, scores): (u64, Vec<u16>)| {
                let scores: Vec<f64> = scores.into_iter().map(f64::from).collect();
                let mut selector = Selector::default();
                let mut random = Seeded::new(seed);
                match selector.select(uplinks(&scores), 1.0, &mut random) {
                    Some(selection) => {
                        assert!(selection.uplink.as_usize() < scores.len());
                        let best = scores.iter().copied().fold(f64::INFINITY, f64::min);
                        assert!(selection.score <= best + 1.0);
                    }
                    None => assert!(scores.is_empty()),
                }
            });
    }
}
