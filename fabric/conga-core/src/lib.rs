// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Congestion-aware load balancing for a simulated two-tier leaf/core fabric

pub mod congestion;
pub mod core_switch;
pub mod error;
pub mod event;
pub mod id;
pub mod leaf;
pub mod packet;
pub mod path;
pub mod queue;
pub mod random;
pub mod sampler;
pub mod scheduler;
pub mod time;
pub mod topology;

pub use core_switch::CoreSwitch;
pub use error::{Error, Result};
pub use leaf::LeafSwitch;
