// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::{fmt, ops, time::Duration};

const PICOS_PER_NANO: u64 = 1_000;

/// A point in simulated time with picosecond resolution
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The start of the simulation
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_picos(picos: u64) -> Self {
        Self(picos)
    }

    /// Creates a timestamp `duration` after the start of the simulation
    #[inline]
    pub fn from_duration(duration: Duration) -> Self {
        Self(to_picos(duration))
    }

    #[inline]
    pub const fn as_picos(self) -> u64 {
        self.0
    }

    /// Returns the time since the start of the simulation
    ///
    /// Sub-nanosecond precision is truncated.
    #[inline]
    pub const fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0 / PICOS_PER_NANO)
    }

    /// Returns true if the timestamp is at or before `now`
    #[inline]
    pub fn has_elapsed(self, now: Self) -> bool {
        self <= now
    }

    /// Returns the time elapsed from `earlier` to `self`, or zero if `earlier` is later
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0) / PICOS_PER_NANO)
    }

    #[inline]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        self.0.checked_add(to_picos(duration)).map(Self)
    }

    #[inline]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        self.0.checked_sub(to_picos(duration)).map(Self)
    }
}

/// Converts a duration into picoseconds, saturating at `u64::MAX`
#[inline]
pub(crate) fn to_picos(duration: Duration) -> u64 {
    let picos = duration.as_nanos().saturating_mul(PICOS_PER_NANO as u128);
    picos.min(u64::MAX as u128) as u64
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.as_duration())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.as_duration())
    }
}

impl ops::Add<Duration> for Timestamp {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(to_picos(rhs)))
    }
}

impl ops::AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl ops::Sub<Duration> for Timestamp {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Duration) -> Self {
        Self(self.0.saturating_sub(to_picos(rhs)))
    }
}

impl ops::Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        self.saturating_duration_since(rhs)
    }
}
