// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::config::{Distribution, Workload};
use conga_core::{id::ServerId, packet::Route, random::splitmix64, time::Duration};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Largest pareto draw, as a multiple of the mean flow size
const PARETO_CAP: f64 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flow {
    pub route: Route,
    pub size: u64,
}

/// Poisson flow arrivals between uniformly chosen server pairs
#[derive(Debug)]
pub struct Generator {
    rng: ChaCha8Rng,
    servers: u32,
    /// Flows per second
    rate: f64,
    workload: Workload,
}

impl Generator {
    /// Sizes the arrival rate so that the mean offered load is `utilization` of the
    /// aggregate server link capacity
    pub fn new(seed: u64, servers: u32, server_gbps: u64, workload: &Workload) -> Self {
        debug_assert!(servers >= 2);
        let capacity = f64::from(servers) * server_gbps as f64 * 1e9;
        let rate = workload.utilization * capacity / (workload.flow_size as f64 * 8.0);
        Self {
            // keep the workload stream apart from the leaves' tie-break streams
            rng: ChaCha8Rng::seed_from_u64(splitmix64(!seed)),
            servers,
            rate,
            workload: workload.clone(),
        }
    }

    /// Returns the gap until the next flow arrives
    pub fn next_gap(&mut self) -> Duration {
        // 1 - [0, 1) keeps the logarithm finite
        let uniform: f64 = 1.0 - self.rng.gen::<f64>();
        Duration::from_secs_f64(-uniform.ln() / self.rate)
    }

    pub fn next_flow(&mut self) -> Flow {
        let src = self.rng.gen_range(0..self.servers);
        let mut dst = self.rng.gen_range(0..self.servers - 1);
        if dst >= src {
            dst += 1;
        }

        Flow {
            route: Route::new(ServerId::new(src), ServerId::new(dst)),
            size: self.next_size(),
        }
    }

    fn next_size(&mut self) -> u64 {
        let mean = self.workload.flow_size;
        match self.workload.distribution {
            Distribution::Fixed => mean,
            Distribution::Uniform => self.rng.gen_range(1..=mean.saturating_mul(2)),
            Distribution::Pareto => {
                let shape = self.workload.pareto_shape;
                let scale = mean as f64 * (shape - 1.0) / shape;
                let uniform: f64 = 1.0 - self.rng.gen::<f64>();
                let size = scale / uniform.powf(1.0 / shape);
                size.clamp(1.0, mean as f64 * PARETO_CAP) as u64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(distribution: Distribution) -> Workload {
        Workload {
            distribution,
            ..Default::default()
        }
    }

    #[test]
    fn rate_test() {
        // 10 servers at 10 Gbps, half loaded with 100 kB flows
        let workload = workload(Distribution::Fixed);
        let mut generator = Generator::new(1, 10, 10, &workload);

        let count = 20_000;
        let total: Duration = (0..count).map(|_| generator.next_gap()).sum();
        let mean = total.as_secs_f64() / count as f64;
        let expected = 100_000.0 * 8.0 / (0.5 * 100e9);
        assert!(
            (mean - expected).abs() < expected * 0.05,
            "mean gap {mean} expected {expected}"
        );
    }

    #[test]
    fn pairs_test() {
        let mut generator = Generator::new(3, 4, 10, &workload(Distribution::Fixed));
        let mut seen = [[false; 4]; 4];
        for _ in 0..1000 {
            let flow = generator.next_flow();
            let Route { src, dst } = flow.route;
            assert_ne!(src, dst);
            assert_eq!(flow.size, 100_000);
            seen[src.as_usize()][dst.as_usize()] = true;
        }

        for src in 0..4 {
            for dst in 0..4 {
                assert_eq!(seen[src][dst], src != dst);
            }
        }
    }

    #[test]
    fn sizes_test() {
        let mut generator = Generator::new(5, 4, 10, &workload(Distribution::Uniform));
        for _ in 0..1000 {
            let size = generator.next_flow().size;
            assert!((1..=200_000).contains(&size));
        }

        let mut generator = Generator::new(5, 4, 10, &workload(Distribution::Pareto));
        let sizes: Vec<_> = (0..1000).map(|_| generator.next_flow().size).collect();
        let scale = 100_000 * 5 / 105;
        assert!(sizes.iter().all(|size| (scale..=100_000_000).contains(size)));
        // heavy tailed: most flows are well below the mean
        let small = sizes.iter().filter(|size| **size < 100_000).count();
        assert!(small > 500);
    }

    #[test]
    fn determinism_test() {
        let workload = workload(Distribution::Pareto);
        let mut a = Generator::new(9, 64, 10, &workload);
        let mut b = Generator::new(9, 64, 10, &workload);
        for _ in 0..100 {
            assert_eq!(a.next_gap(), b.next_gap());
            assert_eq!(a.next_flow(), b.next_flow());
        }
    }
}
