// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Links and drop-tail queues of a two-tier leaf/core fabric

use crate::{config::Links, Result};
use conga_core::{
    event,
    id::{CoreId, LeafId, ServerId},
    packet,
    queue::{self, Network},
    random,
    time::Duration,
    topology::Shape,
    CoreSwitch, LeafSwitch,
};
use std::collections::VecDeque;
use tracing::trace;

/// Where a packet goes once it leaves a queue and crosses the link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hop {
    /// Into a leaf from one of its servers
    LeafUp(LeafId),
    Core(CoreId),
    /// Into a leaf from a core
    LeafDown(LeafId),
    Server(ServerId),
}

#[derive(Debug)]
struct Queue {
    gbps: u64,
    capacity: u64,
    delay: Duration,
    next: Hop,
    bytes: u64,
    packets: VecDeque<(packet::Id, u32)>,
    busy: bool,
    drops: u64,
}

impl Queue {
    fn new(gbps: u64, capacity: u64, delay: Duration, next: Hop) -> Self {
        Self {
            gbps,
            capacity,
            delay,
            next,
            bytes: 0,
            packets: VecDeque::new(),
            busy: false,
            drops: 0,
        }
    }

    #[inline]
    fn serialization(&self, size: u32) -> Duration {
        // 1 Gbps moves one bit per nanosecond
        Duration::from_nanos((u64::from(size) * 8).div_ceil(self.gbps))
    }
}

/// A packet finishing serialization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Departure {
    pub packet: packet::Id,
    pub next: Hop,
    /// Propagation delay until the packet reaches `next`
    pub delay: Duration,
    /// Serialization time of the packet behind it, if any
    pub following: Option<Duration>,
}

#[derive(Debug)]
pub struct Fabric {
    shape: Shape,
    queues: Vec<Queue>,
    /// Server to leaf, indexed by server
    host_uplinks: Vec<queue::Id>,
    /// Leaf to core, indexed by `leaf * cores + core`
    leaf_uplinks: Vec<queue::Id>,
    /// Core to leaf, indexed by `core * leaves + leaf`
    core_downlinks: Vec<queue::Id>,
    /// Leaf to server, indexed by server
    leaf_downlinks: Vec<queue::Id>,
    /// Queues that went from idle to busy, with the head's serialization time
    kicks: Vec<(queue::Id, Duration)>,
    dropped: Vec<packet::Id>,
}

impl Fabric {
    pub fn new(shape: Shape, links: &Links) -> Result<Self> {
        let mut fabric = Self {
            shape,
            queues: vec![],
            host_uplinks: vec![],
            leaf_uplinks: vec![],
            core_downlinks: vec![],
            leaf_downlinks: vec![],
            kicks: vec![],
            dropped: vec![],
        };

        for server in (0..shape.servers()).map(ServerId::new) {
            let leaf = shape.leaf_of(server)?;
            let id = fabric.push(Queue::new(
                links.leaf_gbps,
                links.host_buffer,
                links.delay,
                Hop::LeafUp(leaf),
            ));
            fabric.host_uplinks.push(id);

            let id = fabric.push(Queue::new(
                links.leaf_gbps,
                links.leaf_buffer,
                links.delay,
                Hop::Server(server),
            ));
            fabric.leaf_downlinks.push(id);
        }

        for _leaf in shape.leaf_ids() {
            for core in shape.core_ids() {
                let id = fabric.push(Queue::new(
                    links.core_gbps,
                    links.leaf_buffer,
                    links.delay,
                    Hop::Core(core),
                ));
                fabric.leaf_uplinks.push(id);
            }
        }

        for _core in shape.core_ids() {
            for leaf in shape.leaf_ids() {
                let id = fabric.push(Queue::new(
                    links.core_gbps,
                    links.core_buffer,
                    links.delay,
                    Hop::LeafDown(leaf),
                ));
                fabric.core_downlinks.push(id);
            }
        }

        Ok(fabric)
    }

    fn push(&mut self, queue: Queue) -> queue::Id {
        let id = queue::Id::new(self.queues.len() as u32);
        self.queues.push(queue);
        id
    }

    #[inline]
    pub fn host_uplink(&self, server: ServerId) -> queue::Id {
        self.host_uplinks[server.as_usize()]
    }

    #[inline]
    pub fn leaf_uplink(&self, leaf: LeafId, core: CoreId) -> queue::Id {
        self.leaf_uplinks[leaf.as_usize() * self.shape.cores as usize + core.as_usize()]
    }

    #[inline]
    pub fn core_downlink(&self, core: CoreId, leaf: LeafId) -> queue::Id {
        self.core_downlinks[core.as_usize() * self.shape.leaves as usize + leaf.as_usize()]
    }

    #[inline]
    pub fn leaf_downlink(&self, server: ServerId) -> queue::Id {
        self.leaf_downlinks[server.as_usize()]
    }

    /// Registers every queue with the switches that forward onto or observe it
    pub fn wire<Sub, Rand>(
        &self,
        leaves: &mut [LeafSwitch<Sub, Rand>],
        cores: &mut [CoreSwitch],
    ) -> Result
    where
        Sub: event::Subscriber,
        Rand: random::Generator,
    {
        for leaf in leaves.iter_mut() {
            let id = leaf.id();
            for server in self.shape.servers_of(id) {
                leaf.add_downlink(server, self.leaf_downlink(server))?;
            }
            for core in self.shape.core_ids() {
                leaf.add_uplink(core, self.leaf_uplink(id, core))?;
                for remote in self.shape.leaf_ids() {
                    leaf.register_remote_downlink(core, remote, self.core_downlink(core, remote))?;
                }
            }
        }

        for core in cores.iter_mut() {
            for leaf in self.shape.leaf_ids() {
                core.add_downlink(leaf, self.core_downlink(core.id(), leaf))?;
            }
        }

        Ok(())
    }

    /// Removes the packet at the head of the queue once it has been serialized
    pub fn dequeue(&mut self, queue: queue::Id) -> Option<Departure> {
        let queue = &mut self.queues[queue.as_usize()];
        let (packet, size) = queue.packets.pop_front()?;
        queue.bytes -= u64::from(size);

        let following = queue
            .packets
            .front()
            .map(|(_, size)| queue.serialization(*size));
        queue.busy = following.is_some();

        Some(Departure {
            packet,
            next: queue.next,
            delay: queue.delay,
            following,
        })
    }

    pub fn take_kicks(&mut self) -> Vec<(queue::Id, Duration)> {
        core::mem::take(&mut self.kicks)
    }

    /// Returns the packets tail-dropped since the last call
    pub fn take_dropped(&mut self) -> Vec<packet::Id> {
        core::mem::take(&mut self.dropped)
    }

    pub fn drops(&self) -> u64 {
        self.queues.iter().map(|queue| queue.drops).sum()
    }
}

impl Network for Fabric {
    #[inline]
    fn occupancy(&self, queue: queue::Id) -> u64 {
        self.queues[queue.as_usize()].bytes
    }

    fn enqueue(&mut self, id: queue::Id, packet: packet::Id, size: u32) {
        let queue = &mut self.queues[id.as_usize()];

        if queue.bytes + u64::from(size) > queue.capacity {
            queue.drops += 1;
            trace!(queue = ?id, ?packet, bytes = queue.bytes, "drop");
            self.dropped.push(packet);
            return;
        }

        queue.bytes += u64::from(size);
        queue.packets.push_back((packet, size));

        if !queue.busy {
            queue.busy = true;
            self.kicks.push((id, queue.serialization(size)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conga_core::{
        leaf,
        packet::{Pool, Route},
    };

    fn links() -> Links {
        Links {
            leaf_gbps: 10,
            core_gbps: 40,
            leaf_buffer: 3000,
            core_buffer: 3000,
            host_buffer: 3000,
            delay: Duration::from_micros(1),
        }
    }

    #[test]
    fn drop_tail_test() {
        let shape = Shape::new(2, 2, 1);
        let mut fabric = Fabric::new(shape, &links()).unwrap();
        let mut pool = Pool::new();
        let flow = pool.open_flow();
        let route = Route::new(ServerId::new(0), ServerId::new(1));
        let queue = fabric.host_uplink(ServerId::new(0));

        let ids: Vec<_> = (0..3)
            .map(|seqno| pool.alloc_data(flow, route, 1500, seqno).unwrap())
            .collect();
        for id in &ids {
            fabric.enqueue(queue, *id, 1500);
        }

        assert_eq!(fabric.occupancy(queue), 3000);
        assert_eq!(fabric.take_dropped(), [ids[2]]);
        assert_eq!(fabric.drops(), 1);

        // only the idle-to-busy transition kicks the queue
        assert_eq!(
            fabric.take_kicks(),
            [(queue, Duration::from_nanos(1200))]
        );

        let departure = fabric.dequeue(queue).unwrap();
        assert_eq!(departure.packet, ids[0]);
        assert_eq!(departure.next, Hop::LeafUp(LeafId::new(0)));
        assert_eq!(departure.delay, Duration::from_micros(1));
        assert_eq!(departure.following, Some(Duration::from_nanos(1200)));
        assert_eq!(fabric.occupancy(queue), 1500);

        let departure = fabric.dequeue(queue).unwrap();
        assert_eq!(departure.following, None);
        assert!(fabric.dequeue(queue).is_none());

        // idle again, so the next packet kicks it
        fabric.enqueue(queue, ids[0], 40);
        assert_eq!(fabric.take_kicks(), [(queue, Duration::from_nanos(32))]);
    }

    #[test]
    fn wiring_test() {
        let shape = Shape::new(3, 2, 2);
        let fabric = Fabric::new(shape, &links()).unwrap();

        let mut leaves: Vec<LeafSwitch> = shape
            .leaf_ids()
            .map(|id| {
                LeafSwitch::new(id, shape, leaf::Config::default(), random::Seeded::new(0), ())
                    .unwrap()
            })
            .collect();
        let mut cores: Vec<CoreSwitch> = shape
            .core_ids()
            .map(|id| CoreSwitch::new(id, shape).unwrap())
            .collect();
        fabric.wire(&mut leaves, &mut cores).unwrap();

        let leaf = LeafId::new(1);
        let uplinks: Vec<_> = leaves[1].uplinks().collect();
        assert_eq!(
            uplinks,
            [
                (CoreId::new(0), fabric.leaf_uplink(leaf, CoreId::new(0))),
                (CoreId::new(1), fabric.leaf_uplink(leaf, CoreId::new(1))),
            ]
        );
        assert_eq!(
            cores[1].downlink(LeafId::new(2)),
            Some(fabric.core_downlink(CoreId::new(1), LeafId::new(2)))
        );

        // wiring twice is a bug in the caller
        assert!(fabric.wire(&mut leaves, &mut cores).is_err());
    }
}
