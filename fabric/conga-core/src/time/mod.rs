// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Virtual time for the simulated fabric.
//!
//! All timestamps are picoseconds since the start of the simulation. Periods and
//! windows are expressed with [`Duration`] and converted on use.

mod clock;
mod timer;
mod timestamp;

pub use clock::*;
pub use core::time::Duration;
pub use timer::*;
pub use timestamp::*;
