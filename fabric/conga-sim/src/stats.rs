// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{config::Config, Result};
use conga_core::packet::pool;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// A single line of simulation output
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Stats {
    Parameters(Box<Config>),
    Flow(FlowRecord),
    Summary(Summary),
}

impl Stats {
    pub fn write<W: Write>(&self, mut out: W) -> Result {
        serde_json::to_writer(&mut out, self)?;
        writeln!(out)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct FlowRecord {
    pub seed: u64,
    pub src: u32,
    pub dst: u32,
    pub size: u64,
    pub start_us: f64,
    pub end_us: f64,
    pub fct_us: f64,
    pub retransmits: u64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Summary {
    pub seed: u64,
    pub flows_started: u64,
    pub flows_completed: u64,
    pub mean_fct_us: f64,
    pub p99_fct_us: f64,
    pub drops: u64,
    pub retransmits: u64,
    /// Number of times each core was picked, indexed by core
    pub uplink_choices: Vec<u64>,
    pub packets_allocated: u64,
    pub packets_reused: u64,
    pub packets_live: usize,
}

impl Summary {
    pub fn new(seed: u64, flows: &[FlowRecord]) -> Self {
        let mut fcts: Vec<f64> = flows.iter().map(|flow| flow.fct_us).collect();
        fcts.sort_by(f64::total_cmp);

        let mean_fct_us = if fcts.is_empty() {
            0.0
        } else {
            fcts.iter().sum::<f64>() / fcts.len() as f64
        };

        Self {
            seed,
            flows_completed: flows.len() as u64,
            mean_fct_us,
            p99_fct_us: percentile(&fcts, 0.99),
            ..Default::default()
        }
    }

    pub fn with_pool(mut self, stats: pool::Stats) -> Self {
        self.packets_allocated = stats.allocated;
        self.packets_reused = stats.reused;
        self.packets_live = stats.live;
        self
    }
}

/// Nearest-rank percentile of sorted values
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fct_us: f64) -> FlowRecord {
        FlowRecord {
            seed: 0,
            src: 0,
            dst: 1,
            size: 1000,
            start_us: 0.0,
            end_us: fct_us,
            fct_us,
            retransmits: 0,
        }
    }

    #[test]
    fn percentile_test() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&values, 0.99), 99.0);
        assert_eq!(percentile(&values, 0.5), 50.0);
        assert_eq!(percentile(&values[..1], 0.99), 1.0);
        assert_eq!(percentile(&[], 0.99), 0.0);
    }

    #[test]
    fn summary_test() {
        let flows = [record(30.0), record(10.0), record(20.0)];
        let summary = Summary::new(4, &flows);
        assert_eq!(summary.flows_completed, 3);
        assert_eq!(summary.mean_fct_us, 20.0);
        assert_eq!(summary.p99_fct_us, 30.0);
    }

    #[test]
    fn json_lines_test() {
        let mut out = vec![];
        Stats::Flow(record(12.5)).write(&mut out).unwrap();
        Stats::Summary(Summary::new(1, &[])).write(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(r#"{"flow":{"#));
        assert!(lines[1].starts_with(r#"{"summary":{"#));

        let parsed: Stats = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, Stats::Flow(record(12.5)));
    }
}
