// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{Kind, Result},
    id::{CoreId, LeafId},
    packet::{self, Pool},
    queue::{self, Network},
    topology::Shape,
};
use tracing::trace;

/// A core switch connecting every leaf
///
/// Cores keep no congestion state of their own. They only add the occupancy of the
/// egress queue a packet is about to join to the packet's carried metric.
#[derive(Debug)]
pub struct CoreSwitch {
    id: CoreId,
    shape: Shape,
    /// Indexed by leaf
    downlinks: Vec<Option<queue::Id>>,
}

impl CoreSwitch {
    pub fn new(id: CoreId, shape: Shape) -> Result<Self> {
        shape.check_core(id)?;
        Ok(Self {
            id,
            shape,
            downlinks: vec![None; shape.leaves as usize],
        })
    }

    #[inline]
    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn add_downlink(&mut self, leaf: LeafId, queue: queue::Id) -> Result {
        let index = self.shape.check_leaf(leaf)?.as_usize();
        self.downlinks[index] = Some(queue);
        Ok(())
    }

    #[inline]
    pub fn downlink(&self, leaf: LeafId) -> Option<queue::Id> {
        *self.downlinks.get(leaf.as_usize())?
    }

    /// Forwards a packet from a leaf toward its destination leaf
    ///
    /// Feedback carriers already hold the reading they return, so they pass through
    /// unchanged.
    pub fn on_packet<N: Network>(
        &mut self,
        id: packet::Id,
        pool: &mut Pool,
        network: &mut N,
    ) -> Result {
        let packet = pool.get(id)?;
        let size = packet.size();
        let is_feedback = packet.is_feedback();
        let dst_leaf = self.shape.leaf_of(packet.route().dst)?;
        debug_assert_eq!(packet.metadata().dst_leaf, dst_leaf);
        debug_assert_eq!(packet.metadata().selected_uplink, self.id);

        let queue = self
            .downlink(dst_leaf)
            .ok_or(Kind::NoDownlink { leaf: dst_leaf })?;

        if !is_feedback {
            let occupancy = network.occupancy(queue);
            pool.accumulate(id, occupancy)?;
            trace!(core = ?self.id, ?dst_leaf, occupancy, "accumulate");
        }

        network.enqueue(queue, id, size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        id::{ServerId, UplinkId},
        packet::Route,
        queue::testing,
    };

    #[test]
    fn accumulates_on_data_only_test() {
        let shape = Shape::new(2, 2, 1);
        let mut core = CoreSwitch::new(CoreId::new(1), shape).unwrap();
        let downlink = queue::Id::new(7);
        core.add_downlink(LeafId::new(1), downlink).unwrap();

        let mut network = testing::Network::default();
        network.set_occupancy(downlink, 3000);

        let mut pool = Pool::new();
        let flow = pool.open_flow();
        let route = Route::new(ServerId::new(0), ServerId::new(1));

        let data = pool.alloc_data(flow, route, 1500, 0).unwrap();
        pool.get_mut(data)
            .unwrap()
            .metadata_mut()
            .stamp(LeafId::new(0), LeafId::new(1), UplinkId::new(1));
        core.on_packet(data, &mut pool, &mut network).unwrap();
        assert_eq!(pool.get(data).unwrap().metadata().congestion, 3000);

        let ack = pool.alloc_ack(flow, route, 0, 1500).unwrap();
        let metadata = pool.get_mut(ack).unwrap().metadata_mut();
        metadata.stamp(LeafId::new(0), LeafId::new(1), UplinkId::new(1));
        metadata.accumulate(12);
        pool.mark_feedback(ack).unwrap();
        core.on_packet(ack, &mut pool, &mut network).unwrap();
        assert_eq!(pool.get(ack).unwrap().metadata().congestion, 12);

        assert_eq!(network.drain(downlink), [data, ack]);
    }

    #[test]
    fn missing_downlink_test() {
        let shape = Shape::new(2, 1, 1);
        let mut core = CoreSwitch::new(CoreId::new(0), shape).unwrap();
        let mut network = testing::Network::default();
        let mut pool = Pool::new();
        let flow = pool.open_flow();
        let data = pool
            .alloc_data(flow, Route::new(ServerId::new(0), ServerId::new(1)), 100, 0)
            .unwrap();
        pool.get_mut(data)
            .unwrap()
            .metadata_mut()
            .stamp(LeafId::new(0), LeafId::new(1), UplinkId::new(0));

        let error = core.on_packet(data, &mut pool, &mut network).unwrap_err();
        assert_eq!(
            error.kind(),
            &Kind::NoDownlink {
                leaf: LeafId::new(1)
            }
        );
    }

    #[test]
    fn out_of_range_core_test() {
        assert!(CoreSwitch::new(CoreId::new(2), Shape::new(2, 2, 1)).is_err());
    }
}
