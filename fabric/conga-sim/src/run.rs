// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{Config, Distribution, Strategy},
    sim::Simulation,
    stats::Stats,
    Result,
};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};
use structopt::StructOpt;

/// Runs a single simulation
#[derive(Debug, Default, StructOpt)]
pub struct Run {
    /// TOML file with the experiment parameters
    #[structopt(short, long)]
    config: Option<PathBuf>,

    #[structopt(long)]
    seed: Option<u64>,

    /// Simulated time to run for
    #[structopt(long)]
    duration: Option<humantime::Duration>,

    #[structopt(long)]
    utilization: Option<f64>,

    /// local-only, feedback-only or blended
    #[structopt(long)]
    strategy: Option<Strategy>,

    #[structopt(long)]
    cores: Option<u32>,

    #[structopt(long)]
    leaves: Option<u32>,

    #[structopt(long)]
    servers_per_leaf: Option<u32>,

    /// Mean flow size in bytes
    #[structopt(long)]
    flow_size: Option<u64>,

    /// fixed, uniform or pareto
    #[structopt(long)]
    distribution: Option<Distribution>,

    #[structopt(long)]
    sample_period: Option<humantime::Duration>,

    #[structopt(long)]
    staleness: Option<humantime::Duration>,

    /// Writes the JSON lines here instead of stdout
    #[structopt(short, long)]
    output: Option<PathBuf>,
}

impl Run {
    /// Loads the config file and applies the command line overrides
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        macro_rules! set {
            ($($field:ident => $($target:ident).+),* $(,)?) => {
                $(
                    if let Some(value) = self.$field.clone() {
                        config.$($target).+ = value.into();
                    }
                )*
            };
        }

        set!(
            seed => seed,
            duration => duration,
            utilization => workload.utilization,
            strategy => balancer.strategy,
            cores => topology.cores,
            leaves => topology.leaves,
            servers_per_leaf => topology.servers_per_leaf,
            flow_size => workload.flow_size,
            distribution => workload.distribution,
            sample_period => balancer.sample_period,
            staleness => balancer.staleness,
        );

        config.validate()?;
        Ok(config)
    }

    pub fn run(&self) -> Result {
        let config = self.config()?;
        let stats = Simulation::new(&config)?.run()?;
        self.write(&stats)
    }

    pub fn write(&self, stats: &[Stats]) -> Result {
        let mut out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(io::stdout().lock()),
        };

        for line in stats {
            line.write(&mut out)?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conga_core::time::Duration;

    #[test]
    fn overrides_test() {
        let run = Run::from_iter_safe([
            "run",
            "--seed",
            "3",
            "--duration",
            "1ms",
            "--strategy",
            "local-only",
            "--cores",
            "4",
            "--sample-period",
            "20us",
        ])
        .unwrap();

        let config = run.config().unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.duration, Duration::from_millis(1));
        assert_eq!(config.balancer.strategy, Strategy::LocalOnly);
        assert_eq!(config.topology.cores, 4);
        assert_eq!(config.topology.leaves, 24);
        assert_eq!(config.balancer.sample_period, Duration::from_micros(20));
    }

    #[test]
    fn invalid_override_test() {
        let run = Run {
            utilization: Some(0.0),
            ..Default::default()
        };
        assert!(run.config().is_err());
    }
}
