// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::Result;
use anyhow::{anyhow, ensure, Context as _};
use conga_core::{leaf, path::Weights, time::Duration, topology::Shape};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, str::FromStr};

/// A complete experiment description
///
/// Every field has a default, so a TOML file only needs the values it changes.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub seed: u64,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub topology: Topology,
    pub links: Links,
    pub workload: Workload,
    pub transport: Transport,
    pub balancer: Balancer,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 0,
            duration: Duration::from_millis(10),
            topology: Topology::default(),
            links: Links::default(),
            workload: Workload::default(),
            transport: Transport::default(),
            balancer: Balancer::default(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn shape(&self) -> Shape {
        let Topology {
            cores,
            leaves,
            servers_per_leaf,
        } = self.topology;
        Shape::new(leaves, cores, servers_per_leaf)
    }

    pub fn validate(&self) -> Result {
        ensure!(!self.duration.is_zero(), "duration must be non-zero");

        let Topology {
            cores,
            leaves,
            servers_per_leaf,
        } = self.topology;
        ensure!(cores > 0, "the fabric needs at least one core");
        ensure!(leaves > 0, "the fabric needs at least one leaf");
        ensure!(servers_per_leaf > 0, "leaves need at least one server");
        ensure!(
            self.shape().servers() >= 2,
            "the workload needs at least two servers"
        );

        ensure!(
            self.links.leaf_gbps > 0 && self.links.core_gbps > 0,
            "link rates must be non-zero"
        );

        let utilization = self.workload.utilization;
        ensure!(
            utilization > 0.0 && utilization <= 1.0,
            "utilization must be in (0, 1], got {utilization}"
        );
        ensure!(self.workload.flow_size > 0, "flow size must be non-zero");
        ensure!(
            self.workload.pareto_shape > 1.0,
            "the pareto shape must exceed 1 for the mean to exist"
        );

        ensure!(self.transport.mss > 0, "mss must be non-zero");
        ensure!(self.transport.window > 0, "window must be non-zero");
        ensure!(!self.transport.rto.is_zero(), "rto must be non-zero");

        self.balancer.leaf_config()?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Topology {
    pub cores: u32,
    pub leaves: u32,
    pub servers_per_leaf: u32,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            cores: 12,
            leaves: 24,
            servers_per_leaf: 32,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Links {
    /// Rate of server and leaf-to-server links
    pub leaf_gbps: u64,
    /// Rate of leaf-to-core and core-to-leaf links
    pub core_gbps: u64,
    /// Buffer of every leaf egress queue, in bytes
    pub leaf_buffer: u64,
    pub core_buffer: u64,
    pub host_buffer: u64,
    /// Propagation delay of every link
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for Links {
    fn default() -> Self {
        Self {
            leaf_gbps: 10,
            core_gbps: 40,
            leaf_buffer: 512_000,
            core_buffer: 1_000_000,
            host_buffer: 8_000_000,
            delay: Duration::from_micros(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Distribution {
    #[default]
    Fixed,
    /// Uniform over `1..=2 * flow_size`
    Uniform,
    /// Heavy tailed with the configured mean
    Pareto,
}

impl FromStr for Distribution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "uniform" => Ok(Self::Uniform),
            "pareto" => Ok(Self::Pareto),
            _ => Err(anyhow!("unknown distribution {s:?}")),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Workload {
    /// Offered load as a fraction of aggregate server capacity
    pub utilization: f64,
    /// Mean flow size in bytes
    pub flow_size: u64,
    pub distribution: Distribution,
    pub pareto_shape: f64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            utilization: 0.5,
            flow_size: 100_000,
            distribution: Distribution::Fixed,
            pareto_shape: 1.05,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Transport {
    /// Largest data segment, in bytes
    pub mss: u32,
    /// Segments in flight per flow
    pub window: u32,
    #[serde(with = "humantime_serde")]
    pub rto: Duration,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            mss: 1500,
            window: 16,
            rto: Duration::from_millis(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    LocalOnly,
    FeedbackOnly,
    #[default]
    Blended,
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local-only" => Ok(Self::LocalOnly),
            "feedback-only" => Ok(Self::FeedbackOnly),
            "blended" => Ok(Self::Blended),
            _ => Err(anyhow!("unknown strategy {s:?}")),
        }
    }
}

impl From<Strategy> for leaf::Strategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::LocalOnly => Self::LocalOnly,
            Strategy::FeedbackOnly => Self::FeedbackOnly,
            Strategy::Blended => Self::Blended,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Balancer {
    pub strategy: Strategy,
    #[serde(with = "humantime_serde")]
    pub sample_period: Duration,
    #[serde(with = "humantime_serde")]
    pub staleness: Duration,
    pub alpha: f64,
    pub epsilon: f64,
    pub to_leaf_weight: f64,
    pub from_leaf_weight: f64,
}

impl Default for Balancer {
    fn default() -> Self {
        let config = leaf::Config::default();
        let weights = config.weights();
        Self {
            strategy: Strategy::Blended,
            sample_period: config.sample_period(),
            staleness: config.staleness(),
            alpha: config.alpha(),
            epsilon: config.tie_tolerance(),
            to_leaf_weight: weights.to_leaf,
            from_leaf_weight: weights.from_leaf,
        }
    }
}

impl Balancer {
    pub fn leaf_config(&self) -> Result<leaf::Config> {
        let config = leaf::Config::builder()
            .with_strategy(self.strategy.into())
            .with_sample_period(self.sample_period)
            .with_staleness(self.staleness)
            .with_alpha(self.alpha)
            .with_tie_tolerance(self.epsilon)
            .with_weights(Weights {
                to_leaf: self.to_leaf_weight,
                from_leaf: self.from_leaf_weight,
            })
            .build()?;
        Ok(config)
    }
}
