// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{run::Run, sim::Simulation, Result};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use structopt::StructOpt;

/// Runs consecutive seeds in parallel
#[derive(Debug, StructOpt)]
pub struct Batch {
    #[structopt(flatten)]
    run: Run,

    /// Number of seeds, starting at the configured one
    #[structopt(long, default_value = "8")]
    count: usize,

    /// Hides the progress bar
    #[structopt(short, long)]
    quiet: bool,
}

impl Batch {
    pub fn run(&self) -> Result {
        let config = self.run.config()?;

        let progress = if self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(self.count as u64)
        };
        progress.set_style(ProgressStyle::with_template(
            "{elapsed_precise} [{bar:40}] {pos}/{len} seeds ({eta})",
        )?);

        let results = (0..self.count)
            .into_par_iter()
            .progress_with(progress)
            .map(|offset| {
                let mut config = config.clone();
                config.seed = config.seed.wrapping_add(offset as u64);
                Simulation::new(&config)?.run()
            })
            .collect::<Result<Vec<_>>>()?;

        // seeds are written in order regardless of which finished first
        let stats: Vec<_> = results.into_iter().flatten().collect();
        self.run.write(&stats)
    }
}
