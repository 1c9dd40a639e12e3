// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::time::{Duration, Timer, Timestamp};
use core::task::Poll;

/// Self-rearming periodic timer driving a leaf's sampling and aging
#[derive(Debug)]
pub struct Sampler {
    timer: Timer,
    period: Duration,
}

impl Sampler {
    #[inline]
    pub fn new(period: Duration) -> Self {
        Self {
            timer: Timer::default(),
            period,
        }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Changes the period, starting with the next re-arm
    #[inline]
    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    #[inline]
    pub fn start(&mut self, now: Timestamp) {
        self.timer.set(now + self.period);
    }

    #[inline]
    pub fn stop(&mut self) {
        self.timer.cancel();
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.timer.is_armed()
    }

    #[inline]
    pub fn next_expiration(&self) -> Option<Timestamp> {
        self.timer.next_expiration()
    }

    /// Returns the scheduled tick time once it has passed, re-arming one period later
    ///
    /// If the caller fell more than a period behind, the missed ticks collapse into
    /// this one and the next tick is a full period after `now`.
    pub fn poll(&mut self, now: Timestamp) -> Poll<Timestamp> {
        let Some(expiration) = self.timer.next_expiration() else {
            return Poll::Pending;
        };

        if self.timer.poll_expiration(now).is_pending() {
            return Poll::Pending;
        }

        let mut next = expiration + self.period;
        if next <= now {
            next = now + self.period;
        }
        self.timer.set(next);

        Poll::Ready(expiration)
    }
}
