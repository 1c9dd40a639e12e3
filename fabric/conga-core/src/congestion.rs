// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-(peer leaf, uplink) congestion estimates
//!
//! A leaf keeps three of these tables. The to-leaf table is keyed by destination
//! leaf and holds what the leaf knows about sending through each core. The
//! from-leaf table is keyed by the leaf that fed a reading back and holds the
//! forward-path congestion that leaf measured on our traffic. The returns table is
//! keyed by source leaf and holds readings carried in by arriving packets, waiting
//! to be fed back.

use crate::{
    id::{LeafId, UplinkId},
    time::{Duration, Timestamp},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
    estimate: f64,
    last_update: Timestamp,
    /// Set on every write, cleared once the reading has been fed back
    pending: bool,
}

impl Entry {
    #[inline]
    fn new(estimate: f64, now: Timestamp) -> Self {
        Self {
            estimate,
            last_update: now,
            pending: true,
        }
    }

    #[inline]
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    #[inline]
    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    #[inline]
    fn is_stale(&self, now: Timestamp, staleness: Duration) -> bool {
        now > self.last_update + staleness
    }
}

/// Whether a cell has ever been observed
///
/// A tracked cell never goes back to unknown; aging only clears its estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Unknown,
    Tracked,
}

/// A congestion reading chosen to ride back to a peer on an acknowledgment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Feedback {
    pub uplink: UplinkId,
    pub metric: u64,
    /// When the reading was taken at this leaf
    pub measured_at: Timestamp,
}

#[derive(Clone, Debug)]
pub struct Table {
    uplinks: usize,
    /// Row-major: one row of `uplinks` cells per peer
    entries: Vec<Option<Entry>>,
    /// Per-peer round-robin position for [`Table::take_feedback`]
    cursors: Vec<usize>,
}

impl Table {
    pub fn new(peers: u32, uplinks: u32) -> Self {
        let peers = peers as usize;
        let uplinks = uplinks as usize;
        Self {
            uplinks,
            entries: vec![None; peers * uplinks],
            cursors: vec![0; peers],
        }
    }

    #[inline]
    pub fn peers(&self) -> usize {
        self.cursors.len()
    }

    #[inline]
    pub fn uplinks(&self) -> usize {
        self.uplinks
    }

    #[inline]
    fn index(&self, peer: LeafId, uplink: UplinkId) -> Option<usize> {
        let peer = peer.as_usize();
        let uplink = uplink.as_usize();
        (peer < self.peers() && uplink < self.uplinks).then_some(peer * self.uplinks + uplink)
    }

    /// # Panics
    ///
    /// Panics if the cell is outside of the table
    #[inline]
    fn slot_mut(&mut self, peer: LeafId, uplink: UplinkId) -> &mut Option<Entry> {
        match self.index(peer, uplink) {
            Some(index) => &mut self.entries[index],
            None => panic!("cell ({peer:?}, {uplink:?}) is out of range"),
        }
    }

    #[inline]
    pub fn entry(&self, peer: LeafId, uplink: UplinkId) -> Option<&Entry> {
        self.entries.get(self.index(peer, uplink)?)?.as_ref()
    }

    /// Returns the current estimate, or zero for a cell that was never observed
    #[inline]
    pub fn read(&self, peer: LeafId, uplink: UplinkId) -> f64 {
        self.entry(peer, uplink).map_or(0.0, Entry::estimate)
    }

    #[inline]
    pub fn state(&self, peer: LeafId, uplink: UplinkId) -> State {
        if self.entry(peer, uplink).is_some() {
            State::Tracked
        } else {
            State::Unknown
        }
    }

    /// Replaces the cell with a point-in-time reading
    pub fn update(&mut self, peer: LeafId, uplink: UplinkId, value: u64, now: Timestamp) {
        *self.slot_mut(peer, uplink) = Some(Entry::new(value as f64, now));
    }

    /// Folds a sample into the cell with weight `alpha`, returning the new estimate
    ///
    /// A cell that was never observed starts from zero.
    pub fn blend(
        &mut self,
        peer: LeafId,
        uplink: UplinkId,
        sample: f64,
        alpha: f64,
        now: Timestamp,
    ) -> f64 {
        debug_assert!(
            sample.is_finite() && sample >= 0.0,
            "congestion samples must be finite and non-negative: {sample}"
        );
        let sample = if sample.is_finite() {
            sample.max(0.0)
        } else {
            0.0
        };

        let slot = self.slot_mut(peer, uplink);
        let previous = slot.as_ref().map_or(0.0, Entry::estimate);
        let estimate = (alpha * sample + (1.0 - alpha) * previous).max(0.0);
        *slot = Some(Entry::new(estimate, now));
        estimate
    }

    /// Clears the estimate of every cell not written within `staleness`
    ///
    /// Cells keep their timestamp and stay tracked. `on_aged` is called with the
    /// estimate each cleared cell held. Returns the number of cleared cells.
    pub fn age<F>(&mut self, now: Timestamp, staleness: Duration, mut on_aged: F) -> usize
    where
        F: FnMut(LeafId, UplinkId, f64),
    {
        let uplinks = self.uplinks;
        let mut aged = 0;

        for (index, slot) in self.entries.iter_mut().enumerate() {
            let Some(entry) = slot else {
                continue;
            };

            if entry.estimate > 0.0 && entry.is_stale(now, staleness) {
                let peer = LeafId::new((index / uplinks) as u32);
                let uplink = UplinkId::new((index % uplinks) as u32);
                on_aged(peer, uplink, entry.estimate);
                entry.estimate = 0.0;
                aged += 1;
            }
        }

        aged
    }

    /// Picks the next reading to feed back to `peer`
    ///
    /// Cells are visited round-robin starting after the last one picked for that
    /// peer. Cells with an unsent reading are preferred; otherwise the next tracked
    /// cell is repeated so the peer keeps getting refreshed. Cells on uplinks
    /// rejected by `is_usable` are skipped and keep their pending reading.
    pub fn take_feedback<F>(&mut self, peer: LeafId, mut is_usable: F) -> Option<Feedback>
    where
        F: FnMut(UplinkId) -> bool,
    {
        let uplinks = self.uplinks;
        let row = peer.as_usize();
        if row >= self.peers() || uplinks == 0 {
            return None;
        }

        let start = self.cursors[row] % uplinks;
        let cells = &mut self.entries[row * uplinks..(row + 1) * uplinks];
        let usable: Vec<usize> = (0..uplinks)
            .map(|offset| (start + offset) % uplinks)
            .filter(|&uplink| cells[uplink].is_some() && is_usable(UplinkId::new(uplink as u32)))
            .collect();

        let chosen = usable
            .iter()
            .copied()
            .find(|&uplink| cells[uplink].as_ref().is_some_and(Entry::is_pending))
            .or_else(|| usable.first().copied())?;

        let entry = cells[chosen].as_mut()?;
        entry.pending = false;
        self.cursors[row] = chosen + 1;

        Some(Feedback {
            uplink: UplinkId::new(chosen as u32),
            metric: entry.estimate.round() as u64,
            measured_at: entry.last_update,
        })
    }
}
