// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A fixed-window, go-back-N transport
//!
//! It has no congestion control. Its only job is to keep a flow's data and
//! acknowledgments moving through the fabric so leaves have traffic to balance and
//! acknowledgments to carry feedback on.

use crate::config;
use conga_core::{
    packet::{FlowId, Route, SeqNo},
    time::{Duration, Timestamp},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub seqno: SeqNo,
    pub len: u32,
}

#[derive(Debug)]
pub struct Sender {
    flow: FlowId,
    route: Route,
    size: u64,
    start: Timestamp,
    mss: u32,
    /// Bytes allowed in flight
    window: u64,
    rto: Duration,
    /// Next byte to send
    next: SeqNo,
    /// Everything below this offset has been acknowledged
    acked: SeqNo,
    /// Bumped whenever the retransmission timer is re-armed
    generation: u64,
    retransmits: u64,
}

impl Sender {
    pub fn new(
        flow: FlowId,
        route: Route,
        size: u64,
        start: Timestamp,
        transport: &config::Transport,
    ) -> Self {
        Self {
            flow,
            route,
            size,
            start,
            mss: transport.mss,
            window: u64::from(transport.window) * u64::from(transport.mss),
            rto: transport.rto,
            next: 0,
            acked: 0,
            generation: 0,
            retransmits: 0,
        }
    }

    #[inline]
    pub fn flow(&self) -> FlowId {
        self.flow
    }

    #[inline]
    pub fn route(&self) -> Route {
        self.route
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    #[inline]
    pub fn retransmits(&self) -> u64 {
        self.retransmits
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.acked >= self.size
    }

    /// Returns the next segment the window allows, if any
    pub fn poll_transmit(&mut self) -> Option<Segment> {
        if self.next >= self.size || self.next >= self.acked + self.window {
            return None;
        }

        let len = (self.size - self.next).min(u64::from(self.mss)) as u32;
        let segment = Segment {
            seqno: self.next,
            len,
        };
        self.next += u64::from(len);
        Some(segment)
    }

    /// Returns the deadline and generation of a fresh retransmission timer
    #[inline]
    pub fn arm(&mut self, now: Timestamp) -> (Timestamp, u64) {
        self.generation += 1;
        (now + self.rto, self.generation)
    }

    /// Processes a cumulative acknowledgment, returning true if it made progress
    pub fn on_ack(&mut self, ackno: SeqNo) -> bool {
        if ackno <= self.acked {
            return false;
        }
        self.acked = ackno.min(self.size);
        self.next = self.next.max(self.acked);
        true
    }

    /// Rewinds to the first unacknowledged byte if the timer is still current
    pub fn on_timeout(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.is_complete() {
            return false;
        }
        self.next = self.acked;
        self.retransmits += 1;
        true
    }
}

#[derive(Debug, Default)]
pub struct Receiver {
    expected: SeqNo,
}

impl Receiver {
    /// Accepts in-order data and returns the cumulative acknowledgment
    pub fn on_data(&mut self, segment: Segment) -> SeqNo {
        if segment.seqno == self.expected {
            self.expected += u64::from(segment.len);
        }
        self.expected
    }
}
