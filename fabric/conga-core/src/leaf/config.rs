// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{Kind, Result},
    path::Weights,
    time::Duration,
};

/// Which congestion signals feed the to-leaf table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Only the periodic occupancy samples
    LocalOnly,
    /// Only readings fed back by peer leaves
    FeedbackOnly,
    /// Samples and feedback together
    #[default]
    Blended,
}

impl Strategy {
    #[inline]
    pub fn samples(self) -> bool {
        matches!(self, Self::LocalOnly | Self::Blended)
    }

    #[inline]
    pub fn applies_feedback(self) -> bool {
        matches!(self, Self::FeedbackOnly | Self::Blended)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    sample_period: Duration,
    staleness: Duration,
    alpha: f64,
    tie_tolerance: f64,
    weights: Weights,
    strategy: Strategy,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(10),
            staleness: Duration::from_millis(100),
            alpha: 0.2,
            tie_tolerance: 1.0,
            weights: Weights::default(),
            strategy: Strategy::Blended,
        }
    }
}

impl Config {
    #[inline]
    pub fn builder() -> Builder {
        Builder::default()
    }

    #[inline]
    pub fn sample_period(&self) -> Duration {
        self.sample_period
    }

    /// Estimates not written for longer than this are cleared by the next sweep
    #[inline]
    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// EWMA weight of a new sample
    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Uplinks scoring within this much of the best are treated as equal
    #[inline]
    pub fn tie_tolerance(&self) -> f64 {
        self.tie_tolerance
    }

    #[inline]
    pub fn weights(&self) -> Weights {
        self.weights
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub(crate) fn validate(&self) -> Result {
        check_period(self.sample_period, "sample period must be non-zero")?;
        check_period(self.staleness, "staleness window must be non-zero")?;
        check_alpha(self.alpha)?;
        check_tolerance(self.tie_tolerance)?;
        check_weights(self.weights)?;
        Ok(())
    }
}

#[inline]
pub(crate) fn check_period(period: Duration, reason: &'static str) -> Result {
    if period.is_zero() {
        return Err(Kind::InvalidConfig { reason }.err());
    }
    Ok(())
}

#[inline]
pub(crate) fn check_alpha(alpha: f64) -> Result {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(Kind::InvalidConfig {
            reason: "alpha must be in (0, 1]",
        }
        .err());
    }
    Ok(())
}

#[inline]
pub(crate) fn check_tolerance(tolerance: f64) -> Result {
    if !(tolerance.is_finite() && tolerance >= 0.0) {
        return Err(Kind::InvalidConfig {
            reason: "tie tolerance must be finite and non-negative",
        }
        .err());
    }
    Ok(())
}

#[inline]
pub(crate) fn check_weights(weights: Weights) -> Result {
    let valid = |weight: f64| weight.is_finite() && weight >= 0.0;
    if !(valid(weights.to_leaf) && valid(weights.from_leaf)) {
        return Err(Kind::InvalidConfig {
            reason: "weights must be finite and non-negative",
        }
        .err());
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    #[inline]
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.config.sample_period = period;
        self
    }

    #[inline]
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.config.staleness = staleness;
        self
    }

    #[inline]
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = alpha;
        self
    }

    #[inline]
    pub fn with_tie_tolerance(mut self, tolerance: f64) -> Self {
        self.config.tie_tolerance = tolerance;
        self
    }

    #[inline]
    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.config.weights = weights;
        self
    }

    #[inline]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    #[inline]
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Config {
    #[inline]
    pub(crate) fn set_sample_period(&mut self, period: Duration) -> Result {
        check_period(period, "sample period must be non-zero")?;
        self.sample_period = period;
        Ok(())
    }

    #[inline]
    pub(crate) fn set_alpha(&mut self, alpha: f64) -> Result {
        check_alpha(alpha)?;
        self.alpha = alpha;
        Ok(())
    }

    #[inline]
    pub(crate) fn set_tie_tolerance(&mut self, tolerance: f64) -> Result {
        check_tolerance(tolerance)?;
        self.tie_tolerance = tolerance;
        Ok(())
    }

    #[inline]
    pub(crate) fn set_weights(&mut self, weights: Weights) -> Result {
        check_weights(weights)?;
        self.weights = weights;
        Ok(())
    }

    #[inline]
    pub(crate) fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }
}
