// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The leaf (top-of-rack) switch
//!
//! A leaf spreads traffic leaving its rack across one uplink per core. For every
//! destination leaf it keeps an estimate of how congested each core's path is,
//! learned two ways:
//!
//! * Sampling: every `sample_period` the leaf blends the occupancy of its own uplink
//!   queue and of the core's downlink toward the destination into the to-leaf table.
//! * Feedback: cores add their egress occupancy to passing packets. The receiving
//!   leaf keeps that reading in its returns table and sends it back on the next
//!   acknowledgment heading to the sender. There it replaces the sender's to-leaf
//!   estimate and is kept in the sender's from-leaf table until it goes stale.
//!
//! Only the to-leaf and from-leaf tables describe paths this leaf sends on, so only
//! they are scored. The returns table describes the reverse direction.

use crate::{
    congestion::{self, Table},
    error::{Kind, Result},
    event::{self, Publisher},
    id::{CoreId, LeafId, ServerId, UplinkId},
    packet::{self, Pool},
    path::{Selector, Weights},
    queue::{self, Network},
    random,
    sampler::Sampler,
    time::{Duration, Timestamp},
    topology::Shape,
};
use core::task::Poll;
use tracing::trace;

mod config;


pub use config::{Builder, Config, Strategy};

#[derive(Debug)]
pub struct LeafSwitch<Sub = (), Rand = random::Seeded> {
    id: LeafId,
    shape: Shape,
    config: Config,
    /// Indexed by core
    uplinks: Vec<Option<queue::Id>>,
    /// Indexed by the server's port on this leaf
    downlinks: Vec<Option<queue::Id>>,
    /// Core-to-leaf queues this leaf is allowed to observe, indexed by
    /// `core * leaves + leaf`
    remote_downlinks: Vec<Option<queue::Id>>,
    to_leaf: Table,
    /// Readings fed back by each destination leaf
    from_leaf: Table,
    /// Readings taken from packets each source leaf sent us
    returns: Table,
    sampler: Sampler,
    selector: Selector,
    random: Rand,
    subscriber: Sub,
}

impl<Sub, Rand> LeafSwitch<Sub, Rand>
where
    Sub: event::Subscriber,
    Rand: random::Generator,
{
    pub fn new(
        id: LeafId,
        shape: Shape,
        config: Config,
        random: Rand,
        subscriber: Sub,
    ) -> Result<Self> {
        shape.check_leaf(id)?;
        config.validate()?;

        let cores = shape.cores as usize;
        Ok(Self {
            id,
            shape,
            config,
            uplinks: vec![None; cores],
            downlinks: vec![None; shape.servers_per_leaf as usize],
            remote_downlinks: vec![None; cores * shape.leaves as usize],
            to_leaf: Table::new(shape.leaves, shape.cores),
            from_leaf: Table::new(shape.leaves, shape.cores),
            returns: Table::new(shape.leaves, shape.cores),
            sampler: Sampler::new(config.sample_period()),
            selector: Selector::default(),
            random,
            subscriber,
        })
    }

    #[inline]
    pub fn id(&self) -> LeafId {
        self.id
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn subscriber(&self) -> &Sub {
        &self.subscriber
    }

    #[inline]
    pub fn subscriber_mut(&mut self) -> &mut Sub {
        &mut self.subscriber
    }

    #[inline]
    pub fn to_leaf(&self) -> &Table {
        &self.to_leaf
    }

    #[inline]
    pub fn from_leaf(&self) -> &Table {
        &self.from_leaf
    }

    #[inline]
    pub fn returns(&self) -> &Table {
        &self.returns
    }

    // Topology wiring

    pub fn add_uplink(&mut self, core: CoreId, queue: queue::Id) -> Result {
        let index = self.shape.check_core(core)?.as_usize();
        let slot = &mut self.uplinks[index];
        if slot.is_some() {
            return Err(Kind::DuplicateUplink { core }.err());
        }
        *slot = Some(queue);
        Ok(())
    }

    pub fn add_downlink(&mut self, server: ServerId, queue: queue::Id) -> Result {
        if self.shape.leaf_of(server)? != self.id {
            return Err(Kind::UnknownServer { server }.err());
        }
        let port = self.shape.port_of(server);
        self.downlinks[port] = Some(queue);
        Ok(())
    }

    /// Lets sampling observe the queue `core` uses to reach `leaf`
    pub fn register_remote_downlink(
        &mut self,
        core: CoreId,
        leaf: LeafId,
        queue: queue::Id,
    ) -> Result {
        let index = self.remote_index(self.shape.check_core(core)?, self.shape.check_leaf(leaf)?);
        self.remote_downlinks[index] = Some(queue);
        Ok(())
    }

    /// Returns the registered uplinks in core order
    pub fn uplinks(&self) -> impl Iterator<Item = (UplinkId, queue::Id)> + '_ {
        self.uplinks
            .iter()
            .enumerate()
            .filter_map(|(core, queue)| Some((UplinkId::new(core as u32), (*queue)?)))
    }

    #[inline]
    fn remote_index(&self, core: CoreId, leaf: LeafId) -> usize {
        core.as_usize() * self.shape.leaves as usize + leaf.as_usize()
    }

    #[inline]
    fn uplink_queue(&self, uplink: UplinkId) -> Result<queue::Id> {
        let index = self.shape.check_core(uplink)?.as_usize();
        Ok(self.uplinks[index].ok_or(Kind::UplinkNotRegistered { core: uplink })?)
    }

    #[inline]
    fn downlink_queue(&self, server: ServerId) -> Result<queue::Id> {
        if self.shape.leaf_of(server)? != self.id {
            return Err(Kind::UnknownServer { server }.err());
        }
        let port = self.shape.port_of(server);
        Ok(self.downlinks[port].ok_or(Kind::UnknownServer { server })?)
    }

    // Congestion state

    /// Returns the to-leaf estimate for the path, or zero if it was never observed
    #[inline]
    pub fn read(&self, dst_leaf: LeafId, uplink: UplinkId) -> f64 {
        self.to_leaf.read(dst_leaf, uplink)
    }

    /// Returns the last reading `dst_leaf` fed back for the path, or zero
    #[inline]
    pub fn read_from_leaf(&self, dst_leaf: LeafId, uplink: UplinkId) -> f64 {
        self.from_leaf.read(dst_leaf, uplink)
    }

    /// Returns the reading waiting to be fed back to `src_leaf`, or zero
    #[inline]
    pub fn read_returns(&self, src_leaf: LeafId, uplink: UplinkId) -> f64 {
        self.returns.read(src_leaf, uplink)
    }

    /// Replaces the to-leaf estimate with a point-in-time reading
    pub fn update_to_leaf(
        &mut self,
        dst_leaf: LeafId,
        uplink: UplinkId,
        value: u64,
        now: Timestamp,
    ) -> Result {
        self.shape.check_leaf(dst_leaf)?;
        self.shape.check_core(uplink)?;
        self.to_leaf.update(dst_leaf, uplink, value, now);
        Ok(())
    }

    /// Folds a sample into the to-leaf estimate, returning the new estimate
    pub fn blend_to_leaf(
        &mut self,
        dst_leaf: LeafId,
        uplink: UplinkId,
        sample: f64,
        now: Timestamp,
    ) -> Result<f64> {
        self.shape.check_leaf(dst_leaf)?;
        self.shape.check_core(uplink)?;
        let alpha = self.config.alpha();
        Ok(self.to_leaf.blend(dst_leaf, uplink, sample, alpha, now))
    }

    /// Clears every estimate that went stale, returning how many
    pub fn age(&mut self, now: Timestamp) -> usize {
        let staleness = self.config.staleness();
        let mut publisher = Publisher::new(&mut self.subscriber, self.id, now);

        let mut aged = self.to_leaf.age(now, staleness, |peer, uplink, previous| {
            publisher.on_entry_aged(event::EntryAged {
                table: event::Table::ToLeaf,
                peer,
                uplink,
                previous,
            })
        });
        aged += self.from_leaf.age(now, staleness, |peer, uplink, previous| {
            publisher.on_entry_aged(event::EntryAged {
                table: event::Table::FromLeaf,
                peer,
                uplink,
                previous,
            })
        });
        aged += self.returns.age(now, staleness, |peer, uplink, previous| {
            publisher.on_entry_aged(event::EntryAged {
                table: event::Table::Returns,
                peer,
                uplink,
                previous,
            })
        });

        aged
    }

    // Path selection

    /// Picks the uplink for traffic toward `dst_leaf`
    ///
    /// Every registered uplink is scored from the to-leaf table and, when the
    /// strategy applies feedback, the from-leaf table. The choice is drawn uniformly
    /// from those within the tie tolerance of the best. Without any data all scores
    /// are zero and the draw covers every uplink.
    pub fn choose_uplink(&mut self, dst_leaf: LeafId, now: Timestamp) -> Result<UplinkId> {
        self.shape.check_leaf(dst_leaf)?;

        let weights = self.config.weights();
        let to_leaf = &self.to_leaf;
        let from_leaf = self
            .config
            .strategy()
            .applies_feedback()
            .then_some(&self.from_leaf);
        let scores = self.uplinks.iter().enumerate().filter_map(|(core, queue)| {
            queue.as_ref()?;
            let uplink = UplinkId::new(core as u32);
            let score = weights.score(
                to_leaf.read(dst_leaf, uplink),
                from_leaf.map_or(0.0, |table| table.read(dst_leaf, uplink)),
            );
            Some((uplink, score))
        });

        let selection = self
            .selector
            .select(scores, self.config.tie_tolerance(), &mut self.random)
            .ok_or(Kind::NoUplinks)?;

        Publisher::new(&mut self.subscriber, self.id, now).on_uplink_selected(
            event::UplinkSelected {
                dst_leaf,
                uplink: selection.uplink,
                score: selection.score,
                candidates: selection.candidates,
            },
        );

        Ok(selection.uplink)
    }

    // Forwarding

    /// Forwards a packet sent by one of this leaf's servers
    ///
    /// Traffic for a server on the same leaf goes straight down. Acknowledgments
    /// toward another leaf carry a reading from the returns table back to that leaf over
    /// the core it describes. Everything else goes up the uplink picked by
    /// [`Self::choose_uplink`].
    pub fn on_packet_from_server<N: Network>(
        &mut self,
        now: Timestamp,
        id: packet::Id,
        pool: &mut Pool,
        network: &mut N,
    ) -> Result {
        let packet = pool.get(id)?;
        let route = packet.route();
        let size = packet.size();
        let is_ack = packet.is_ack();

        if self.shape.leaf_of(route.src)? != self.id {
            return Err(Kind::UnknownServer { server: route.src }.err());
        }

        let dst_leaf = self.shape.leaf_of(route.dst)?;
        if dst_leaf == self.id {
            let queue = self.downlink_queue(route.dst)?;
            network.enqueue(queue, id, size);
            return Ok(());
        }

        if is_ack {
            if let Some((feedback, queue)) = self.take_feedback(dst_leaf) {
                let metadata = pool.get_mut(id)?.metadata_mut();
                metadata.stamp(self.id, dst_leaf, feedback.uplink);
                metadata.accumulate(feedback.metric);
                metadata.measured_at = feedback.measured_at;
                pool.mark_feedback(id)?;
                trace!(
                    leaf = ?self.id,
                    ?dst_leaf,
                    uplink = ?feedback.uplink,
                    metric = feedback.metric,
                    "feedback attached"
                );
                network.enqueue(queue, id, size);
                return Ok(());
            }
        }

        let uplink = self.choose_uplink(dst_leaf, now)?;
        let queue = self.uplink_queue(uplink)?;
        pool.get_mut(id)?
            .metadata_mut()
            .stamp(self.id, dst_leaf, uplink);
        network.enqueue(queue, id, size);
        Ok(())
    }

    #[inline]
    fn take_feedback(&mut self, peer: LeafId) -> Option<(congestion::Feedback, queue::Id)> {
        let uplinks = &self.uplinks;
        let feedback = self.returns.take_feedback(peer, |uplink| {
            uplinks.get(uplink.as_usize()).is_some_and(Option::is_some)
        })?;
        let queue = uplinks[feedback.uplink.as_usize()]?;
        Some((feedback, queue))
    }

    /// Delivers a packet arriving from a core to the destination server
    ///
    /// Feedback carriers update the to-leaf and from-leaf tables unless their
    /// reading is older than the staleness window. Any other packet's accumulated
    /// congestion is kept in the returns table for feedback to its source leaf.
    pub fn on_packet_from_core<N: Network>(
        &mut self,
        now: Timestamp,
        id: packet::Id,
        pool: &mut Pool,
        network: &mut N,
    ) -> Result {
        let packet = pool.get(id)?;
        let route = packet.route();
        let size = packet.size();
        let metadata = *packet.metadata();

        let queue = self.downlink_queue(route.dst)?;
        let peer = self.shape.check_leaf(metadata.src_leaf)?;
        let uplink = self.shape.check_core(metadata.selected_uplink)?;
        debug_assert_eq!(metadata.dst_leaf, self.id, "packet was delivered to the wrong leaf");

        let mut publisher = Publisher::new(&mut self.subscriber, self.id, now);
        if metadata.is_feedback {
            // readings never claim to come from the future
            let measured_at = metadata.measured_at.min(now);
            if now > measured_at + self.config.staleness() {
                trace!(
                    leaf = ?self.id,
                    ?peer,
                    ?uplink,
                    %measured_at,
                    "stale feedback discarded"
                );
            } else if self.config.strategy().applies_feedback() {
                self.to_leaf.update(peer, uplink, metadata.congestion, measured_at);
                self.from_leaf.update(peer, uplink, metadata.congestion, measured_at);
                publisher.on_feedback_applied(event::FeedbackApplied {
                    peer,
                    uplink,
                    metric: metadata.congestion,
                });
            }
        } else {
            self.returns.update(peer, uplink, metadata.congestion, now);
            publisher.on_feedback_recorded(event::FeedbackRecorded {
                peer,
                uplink,
                metric: metadata.congestion,
            });
        }

        network.enqueue(queue, id, size);
        Ok(())
    }

    // Sampling

    /// Arms the sampler one period from `now`
    #[inline]
    pub fn start_sampling(&mut self, now: Timestamp) {
        self.sampler.start(now);
    }

    #[inline]
    pub fn stop_sampling(&mut self) {
        self.sampler.stop();
    }

    #[inline]
    pub fn is_sampling(&self) -> bool {
        self.sampler.is_running()
    }

    /// Returns when [`Self::on_timeout`] should next be called
    #[inline]
    pub fn next_expiration(&self) -> Option<Timestamp> {
        self.sampler.next_expiration()
    }

    /// Runs a sampling tick if one is due, re-arming the sampler
    pub fn on_timeout<N: Network + ?Sized>(&mut self, now: Timestamp, network: &N) {
        if let Poll::Ready(scheduled) = self.sampler.poll(now) {
            trace!(leaf = ?self.id, %scheduled, %now, "sampling");
            self.sample(now, network);
        }
    }

    fn sample<N: Network + ?Sized>(&mut self, now: Timestamp, network: &N) {
        self.age(now);

        if !self.config.strategy().samples() {
            return;
        }

        let alpha = self.config.alpha();
        let leaves = self.shape.leaves as usize;
        let mut publisher = Publisher::new(&mut self.subscriber, self.id, now);

        for (core, uplink_queue) in self.uplinks.iter().enumerate() {
            let Some(uplink_queue) = uplink_queue else {
                continue;
            };
            let uplink = UplinkId::new(core as u32);
            let local = network.occupancy(*uplink_queue);

            let remotes = &self.remote_downlinks[core * leaves..(core + 1) * leaves];
            for (leaf, remote) in remotes.iter().enumerate() {
                let dst_leaf = LeafId::new(leaf as u32);
                let Some(remote) = remote else {
                    continue;
                };
                if dst_leaf == self.id {
                    continue;
                }

                let sample = local.saturating_add(network.occupancy(*remote));
                let estimate = self
                    .to_leaf
                    .blend(dst_leaf, uplink, sample as f64, alpha, now);
                publisher.on_sample_taken(event::SampleTaken {
                    dst_leaf,
                    uplink,
                    sample,
                    estimate,
                });
            }
        }
    }

    // Runtime configuration

    #[inline]
    pub fn set_alpha(&mut self, alpha: f64) -> Result {
        self.config.set_alpha(alpha)
    }

    /// Changes the sampling period, starting with the next re-arm
    #[inline]
    pub fn set_sample_period(&mut self, period: Duration) -> Result {
        self.config.set_sample_period(period)?;
        self.sampler.set_period(period);
        Ok(())
    }

    #[inline]
    pub fn set_tie_tolerance(&mut self, tolerance: f64) -> Result {
        self.config.set_tie_tolerance(tolerance)
    }

    #[inline]
    pub fn set_weights(&mut self, weights: Weights) -> Result {
        self.config.set_weights(weights)
    }

    #[inline]
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.config.set_strategy(strategy);
    }
}
