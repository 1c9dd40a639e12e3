// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::Config,
    fabric::{Fabric, Hop},
    stats::{FlowRecord, Stats, Summary},
    transport::{Receiver, Segment, Sender},
    workload, Result,
};
use conga_core::{
    event,
    id::{LeafId, ServerId},
    packet::{self, metadata, FlowId, Pool},
    queue::{self, Network},
    random,
    scheduler::{self, Scheduler},
    time::Timestamp,
    topology::Shape,
    CoreSwitch, LeafSwitch,
};
use std::{
    cell::Cell,
    collections::{HashMap, HashSet},
};
use tracing::{debug, info};

/// Bytes every data packet spends on load balancing state, on top of its segment
const HEADER_LEN: u32 = metadata::Header::LEN as u32;

thread_local! {
    static NOW: Cell<Timestamp> = const { Cell::new(Timestamp::ZERO) };
}

/// Returns the simulated time of the task running on this thread
pub fn now() -> Timestamp {
    NOW.with(|now| now.get())
}

fn set_now(timestamp: Timestamp) {
    NOW.with(|now| now.set(timestamp))
}

/// Counts how often each uplink was picked
#[derive(Debug, Default)]
pub struct Choices {
    counts: Vec<u64>,
}

impl event::Subscriber for Choices {
    fn on_uplink_selected(&mut self, _meta: &event::Meta, event: &event::UplinkSelected) {
        let index = event.uplink.as_usize();
        if self.counts.len() <= index {
            self.counts.resize(index + 1, 0);
        }
        self.counts[index] += 1;
    }
}

type Leaf = LeafSwitch<(Choices, event::tracing::Subscriber), random::Seeded>;

#[derive(Clone, Copy, Debug)]
enum Task {
    NextFlow,
    Sample(LeafId),
    Dequeue(queue::Id),
    Arrive { hop: Hop, packet: packet::Id },
    Retransmit { flow: FlowId, generation: u64 },
}

#[derive(Debug)]
pub struct Simulation {
    config: Config,
    shape: Shape,
    pool: Pool,
    fabric: Fabric,
    leaves: Vec<Leaf>,
    cores: Vec<CoreSwitch>,
    workload: workload::Generator,
    senders: HashMap<FlowId, Sender>,
    receivers: HashMap<FlowId, Receiver>,
    /// Completed flows with packets still in the fabric
    draining: HashSet<FlowId>,
    records: Vec<FlowRecord>,
    flows_started: u64,
    retransmits: u64,
}

impl Simulation {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let shape = config.shape();
        let leaf_config = config.balancer.leaf_config()?;
        let mut leaves = shape
            .leaf_ids()
            .map(|id| {
                LeafSwitch::new(
                    id,
                    shape,
                    leaf_config,
                    random::Seeded::for_leaf(config.seed, id),
                    (Choices::default(), event::tracing::Subscriber),
                )
            })
            .collect::<conga_core::Result<Vec<_>>>()?;
        let mut cores = shape
            .core_ids()
            .map(|id| CoreSwitch::new(id, shape))
            .collect::<conga_core::Result<Vec<_>>>()?;

        let fabric = Fabric::new(shape, &config.links)?;
        fabric.wire(&mut leaves, &mut cores)?;

        let workload = workload::Generator::new(
            config.seed,
            shape.servers(),
            config.links.leaf_gbps,
            &config.workload,
        );

        Ok(Self {
            config: config.clone(),
            shape,
            pool: Pool::with_capacity(1024),
            fabric,
            leaves,
            cores,
            workload,
            senders: HashMap::new(),
            receivers: HashMap::new(),
            draining: HashSet::new(),
            records: vec![],
            flows_started: 0,
            retransmits: 0,
        })
    }

    /// Runs the configured duration and returns the output lines
    pub fn run(mut self) -> Result<Vec<Stats>> {
        let mut scheduler = Scheduler::new();
        let start = scheduler.now();

        for leaf in &mut self.leaves {
            leaf.start_sampling(start);
            if let Some(at) = leaf.next_expiration() {
                scheduler.schedule_at(at, Task::Sample(leaf.id()));
            }
        }
        scheduler.schedule_in(self.workload.next_gap(), Task::NextFlow);

        let end = start + self.config.duration;
        info!(seed = self.config.seed, shape = ?self.shape, %end, "starting");
        scheduler.run_until(end, |scheduler, task| self.on_task(scheduler, task))?;

        let summary = self.summary();
        info!(
            flows = summary.flows_completed,
            mean_fct_us = summary.mean_fct_us,
            drops = summary.drops,
            "finished"
        );

        let mut stats = Vec::with_capacity(self.records.len() + 2);
        stats.push(Stats::Parameters(Box::new(self.config)));
        stats.extend(self.records.into_iter().map(Stats::Flow));
        stats.push(Stats::Summary(summary));
        Ok(stats)
    }

    fn summary(&self) -> Summary {
        let mut uplink_choices = vec![0; self.shape.cores as usize];
        for leaf in &self.leaves {
            let (choices, _) = leaf.subscriber();
            for (total, count) in uplink_choices.iter_mut().zip(&choices.counts) {
                *total += count;
            }
        }

        let in_progress: u64 = self.senders.values().map(Sender::retransmits).sum();

        Summary {
            flows_started: self.flows_started,
            drops: self.fabric.drops(),
            retransmits: self.retransmits + in_progress,
            uplink_choices,
            ..Summary::new(self.config.seed, &self.records)
        }
        .with_pool(self.pool.stats())
    }

    fn on_task(&mut self, scheduler: &mut Scheduler<Task>, task: scheduler::Task<Task>) -> Result {
        let now = task.fire_at;
        set_now(now);

        match task.payload {
            Task::NextFlow => self.on_next_flow(scheduler)?,
            Task::Sample(id) => {
                let leaf = &mut self.leaves[id.as_usize()];
                leaf.on_timeout(now, &self.fabric);
                if let Some(at) = leaf.next_expiration() {
                    scheduler.schedule_at(at, Task::Sample(id));
                }
            }
            Task::Dequeue(queue) => {
                if let Some(departure) = self.fabric.dequeue(queue) {
                    scheduler.schedule_in(
                        departure.delay,
                        Task::Arrive {
                            hop: departure.next,
                            packet: departure.packet,
                        },
                    );
                    if let Some(following) = departure.following {
                        scheduler.schedule_in(following, Task::Dequeue(queue));
                    }
                }
            }
            Task::Arrive { hop, packet } => self.on_arrive(scheduler, hop, packet)?,
            Task::Retransmit { flow, generation } => {
                self.on_retransmit(scheduler, flow, generation)?
            }
        }

        self.flush(scheduler)
    }

    fn on_next_flow(&mut self, scheduler: &mut Scheduler<Task>) -> Result {
        let now = scheduler.now();
        let workload::Flow { route, size } = self.workload.next_flow();
        let flow = self.pool.open_flow();
        self.flows_started += 1;
        debug!(?flow, src = ?route.src, dst = ?route.dst, size, "flow start");

        let mut sender = Sender::new(flow, route, size, now, &self.config.transport);
        transmit(&mut self.pool, &mut self.fabric, &mut sender)?;
        let (at, generation) = sender.arm(now);
        scheduler.schedule_at(at, Task::Retransmit { flow, generation });

        self.senders.insert(flow, sender);
        self.receivers.insert(flow, Receiver::default());

        scheduler.schedule_in(self.workload.next_gap(), Task::NextFlow);
        Ok(())
    }

    fn on_arrive(
        &mut self,
        scheduler: &mut Scheduler<Task>,
        hop: Hop,
        packet: packet::Id,
    ) -> Result {
        let now = scheduler.now();
        match hop {
            Hop::LeafUp(leaf) => self.leaves[leaf.as_usize()].on_packet_from_server(
                now,
                packet,
                &mut self.pool,
                &mut self.fabric,
            )?,
            Hop::Core(core) => {
                self.cores[core.as_usize()].on_packet(packet, &mut self.pool, &mut self.fabric)?
            }
            Hop::LeafDown(leaf) => self.leaves[leaf.as_usize()].on_packet_from_core(
                now,
                packet,
                &mut self.pool,
                &mut self.fabric,
            )?,
            Hop::Server(server) => self.on_delivery(scheduler, server, packet)?,
        }
        Ok(())
    }

    fn on_delivery(
        &mut self,
        scheduler: &mut Scheduler<Task>,
        server: ServerId,
        id: packet::Id,
    ) -> Result {
        let now = scheduler.now();
        let packet = self.pool.get(id)?;
        let flow = packet.flow();
        let route = packet.route();
        let segment = Segment {
            seqno: packet.seqno(),
            len: packet.size().saturating_sub(HEADER_LEN),
        };
        let ackno = packet.ackno();
        debug_assert_eq!(route.dst, server);
        self.pool.release(id)?;

        let Some(flow) = flow else {
            return Ok(());
        };

        match ackno {
            None => {
                if let Some(receiver) = self.receivers.get_mut(&flow) {
                    let ackno = receiver.on_data(segment);
                    let ack = self
                        .pool
                        .alloc_ack(flow, route.reverse(), segment.seqno, ackno)?;
                    let queue = self.fabric.host_uplink(server);
                    self.fabric.enqueue(queue, ack, packet::ACK_SIZE);
                }
            }
            Some(ackno) => {
                if let Some(sender) = self.senders.get_mut(&flow) {
                    if sender.on_ack(ackno) {
                        if sender.is_complete() {
                            self.complete(now, flow);
                        } else {
                            transmit(&mut self.pool, &mut self.fabric, sender)?;
                            let (at, generation) = sender.arm(now);
                            scheduler.schedule_at(at, Task::Retransmit { flow, generation });
                        }
                    }
                }
            }
        }

        self.try_close(flow)
    }

    fn on_retransmit(
        &mut self,
        scheduler: &mut Scheduler<Task>,
        flow: FlowId,
        generation: u64,
    ) -> Result {
        let now = scheduler.now();
        let Some(sender) = self.senders.get_mut(&flow) else {
            return Ok(());
        };
        if !sender.on_timeout(generation) {
            return Ok(());
        }

        debug!(?flow, retransmits = sender.retransmits(), "retransmission timeout");
        transmit(&mut self.pool, &mut self.fabric, sender)?;
        let (at, generation) = sender.arm(now);
        scheduler.schedule_at(at, Task::Retransmit { flow, generation });
        Ok(())
    }

    fn complete(&mut self, now: Timestamp, flow: FlowId) {
        let Some(sender) = self.senders.remove(&flow) else {
            return;
        };
        self.receivers.remove(&flow);
        self.retransmits += sender.retransmits();

        let route = sender.route();
        let start_us = micros(sender.start());
        let end_us = micros(now);
        let record = FlowRecord {
            seed: self.config.seed,
            src: route.src.as_u32(),
            dst: route.dst.as_u32(),
            size: sender.size(),
            start_us,
            end_us,
            fct_us: end_us - start_us,
            retransmits: sender.retransmits(),
        };
        debug!(?flow, fct_us = record.fct_us, "flow complete");
        self.records.push(record);
        self.draining.insert(flow);
    }

    /// Returns a drained flow's slot to the pool
    fn try_close(&mut self, flow: FlowId) -> Result {
        if self.draining.contains(&flow) && self.pool.outstanding(flow) == Some(0) {
            self.pool.close_flow(flow)?;
            self.draining.remove(&flow);
        }
        Ok(())
    }

    /// Starts idle queues that were just given a packet and releases tail drops
    fn flush(&mut self, scheduler: &mut Scheduler<Task>) -> Result {
        for (queue, delay) in self.fabric.take_kicks() {
            scheduler.schedule_in(delay, Task::Dequeue(queue));
        }

        for id in self.fabric.take_dropped() {
            let flow = self.pool.get(id)?.flow();
            self.pool.release(id)?;
            if let Some(flow) = flow {
                self.try_close(flow)?;
            }
        }

        Ok(())
    }
}

fn transmit(pool: &mut Pool, fabric: &mut Fabric, sender: &mut Sender) -> Result {
    let route = sender.route();
    let queue = fabric.host_uplink(route.src);
    while let Some(Segment { seqno, len }) = sender.poll_transmit() {
        let size = len + HEADER_LEN;
        let id = pool.alloc_data(sender.flow(), route, size, seqno)?;
        fabric.enqueue(queue, id, size);
    }
    Ok(())
}

#[inline]
fn micros(timestamp: Timestamp) -> f64 {
    timestamp.as_picos() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Strategy, Topology};
    use conga_core::time::Duration;

    fn config() -> Config {
        let mut config = Config {
            seed: 42,
            duration: Duration::from_millis(2),
            topology: Topology {
                cores: 2,
                leaves: 2,
                servers_per_leaf: 4,
            },
            ..Default::default()
        };
        config.workload.flow_size = 10_000;
        config.workload.utilization = 0.3;
        config.balancer.sample_period = Duration::from_micros(10);
        config.balancer.staleness = Duration::from_micros(100);
        config
    }

    fn summary(stats: &[Stats]) -> &Summary {
        match stats.last() {
            Some(Stats::Summary(summary)) => summary,
            other => panic!("expected a summary, got {other:?}"),
        }
    }

    #[test]
    fn completes_flows_test() {
        let stats = Simulation::new(&config()).unwrap().run().unwrap();
        assert!(matches!(stats.first(), Some(Stats::Parameters(_))));

        let summary = summary(&stats);
        assert!(summary.flows_started > 100, "{summary:?}");
        assert!(
            summary.flows_completed * 10 >= summary.flows_started * 8,
            "{summary:?}"
        );
        assert!(summary.mean_fct_us > 0.0);
        assert!(summary.p99_fct_us >= summary.mean_fct_us);

        // both cores carry cross-leaf traffic
        assert_eq!(summary.uplink_choices.len(), 2);
        assert!(summary.uplink_choices.iter().all(|count| *count > 0));

        let flows = stats
            .iter()
            .filter(|line| matches!(line, Stats::Flow(_)))
            .count();
        assert_eq!(flows as u64, summary.flows_completed);
    }

    #[test]
    fn determinism_test() {
        let a = Simulation::new(&config()).unwrap().run().unwrap();
        let b = Simulation::new(&config()).unwrap().run().unwrap();
        assert_eq!(a, b);

        let mut other = config();
        other.seed += 1;
        let c = Simulation::new(&other).unwrap().run().unwrap();
        assert_ne!(summary(&a), summary(&c));
    }

    #[test]
    fn strategies_test() {
        for strategy in [Strategy::LocalOnly, Strategy::FeedbackOnly, Strategy::Blended] {
            let mut config = config();
            config.balancer.strategy = strategy;
            let stats = Simulation::new(&config).unwrap().run().unwrap();
            assert!(summary(&stats).flows_completed > 0, "{strategy:?}");
        }
    }

    #[test]
    fn drops_are_recovered_test() {
        let mut config = config();
        config.links.leaf_buffer = 3000;
        config.links.core_buffer = 3000;
        config.transport.rto = Duration::from_micros(100);

        let stats = Simulation::new(&config).unwrap().run().unwrap();
        let summary = summary(&stats);
        assert!(summary.drops > 0, "{summary:?}");
        assert!(summary.retransmits > 0, "{summary:?}");
        assert!(summary.flows_completed > 0, "{summary:?}");
    }

    #[test]
    fn data_packets_carry_header_test() {
        let config = config();
        let mut pool = Pool::new();
        let mut fabric = Fabric::new(config.shape(), &config.links).unwrap();
        let flow = pool.open_flow();
        let route = packet::Route::new(ServerId::new(0), ServerId::new(4));
        let mut sender = Sender::new(flow, route, 2_000, Timestamp::ZERO, &config.transport);

        transmit(&mut pool, &mut fabric, &mut sender).unwrap();

        // a full segment and the remainder, each with its own header
        assert_eq!(pool.outstanding(flow), Some(2));
        let queued = fabric.occupancy(fabric.host_uplink(route.src));
        assert_eq!(queued, 2_000 + 2 * u64::from(HEADER_LEN));
    }

    #[test]
    fn invalid_config_test() {
        let mut config = config();
        config.balancer.alpha = 2.0;
        assert!(Simulation::new(&config).is_err());
    }
}
