// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{Kind as PacketKind, Packet, Route, SeqNo, ACK_SIZE};
use crate::error::{Kind, Result};
use slotmap::SlotMap;
use tracing::{trace, warn};

slotmap::new_key_type! {
    /// Generation-checked handle to a live packet
    ///
    /// A handle stops resolving once its packet is released, even if the slot is
    /// later reused for another packet.
    pub struct Id;

    /// Handle to a flow owning packets in the pool
    pub struct FlowId;
}

#[derive(Clone, Copy, Debug, Default)]
struct Flow {
    outstanding: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Total number of allocations
    pub allocated: u64,
    /// Allocations served from the free list
    pub reused: u64,
    pub released: u64,
    /// Packets currently held by the fabric
    pub live: usize,
}

/// Arena of data and acknowledgment packets
///
/// Each packet has exactly one owner at a time: whoever holds its [`Id`]. Released
/// packet bodies are kept on a free list and handed back out in a clean state.
#[derive(Debug, Default)]
pub struct Pool {
    packets: SlotMap<Id, Packet>,
    free: Vec<Packet>,
    flows: SlotMap<FlowId, Flow>,
    stats: Stats,
}

impl Pool {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(packets: usize) -> Self {
        Self {
            packets: SlotMap::with_capacity_and_key(packets),
            free: Vec::with_capacity(packets),
            ..Default::default()
        }
    }

    #[inline]
    pub fn open_flow(&mut self) -> FlowId {
        self.flows.insert(Flow::default())
    }

    /// Removes the flow, returning the number of its packets still in flight
    ///
    /// Releasing any of those packets afterwards fails with [`Kind::UnknownFlow`].
    pub fn close_flow(&mut self, flow: FlowId) -> Result<u64> {
        let state = self.flows.remove(flow).ok_or(Kind::UnknownFlow)?;
        if state.outstanding > 0 {
            warn!(?flow, outstanding = state.outstanding, "closing flow with packets in flight");
        }
        Ok(state.outstanding)
    }

    /// Returns the number of packets the flow has allocated and not yet released
    #[inline]
    pub fn outstanding(&self, flow: FlowId) -> Option<u64> {
        self.flows.get(flow).map(|state| state.outstanding)
    }

    #[inline]
    pub fn alloc_data(
        &mut self,
        flow: FlowId,
        route: Route,
        size: u32,
        seqno: SeqNo,
    ) -> Result<Id> {
        self.alloc(flow, route, size, seqno, PacketKind::Data)
    }

    #[inline]
    pub fn alloc_ack(
        &mut self,
        flow: FlowId,
        route: Route,
        seqno: SeqNo,
        ackno: SeqNo,
    ) -> Result<Id> {
        self.alloc(flow, route, ACK_SIZE, seqno, PacketKind::Ack { ackno })
    }

    fn alloc(
        &mut self,
        flow: FlowId,
        route: Route,
        size: u32,
        seqno: SeqNo,
        kind: PacketKind,
    ) -> Result<Id> {
        let state = self.flows.get_mut(flow).ok_or(Kind::UnknownFlow)?;
        state.outstanding += 1;

        let mut packet = match self.free.pop() {
            Some(packet) => {
                self.stats.reused += 1;
                packet
            }
            None => Packet::default(),
        };
        debug_assert_eq!(packet, Packet::default(), "free packets must be clean");

        packet.flow = Some(flow);
        packet.route = route;
        packet.size = size;
        packet.seqno = seqno;
        packet.kind = kind;

        self.stats.allocated += 1;
        let id = self.packets.insert(packet);
        trace!(?id, ?flow, seqno, size, "alloc");
        Ok(id)
    }

    /// Returns the packet to the free list
    ///
    /// Releasing a handle twice, or a packet whose flow was closed, is a lifecycle bug
    /// in the caller and is reported rather than ignored.
    pub fn release(&mut self, id: Id) -> Result {
        let packet = self.packets.get(id).ok_or(Kind::StalePacket)?;
        let flow = packet.flow.ok_or(Kind::UnknownFlow)?;
        let state = self.flows.get_mut(flow).ok_or(Kind::UnknownFlow)?;
        state.outstanding = state
            .outstanding
            .checked_sub(1)
            .ok_or(Kind::CounterUnderflow)?;

        let mut packet = self.packets.remove(id).ok_or(Kind::StalePacket)?;
        packet.reset();
        self.free.push(packet);
        self.stats.released += 1;
        trace!(?id, ?flow, "release");
        Ok(())
    }

    #[inline]
    pub fn get(&self, id: Id) -> Result<&Packet> {
        Ok(self.packets.get(id).ok_or(Kind::StalePacket)?)
    }

    #[inline]
    pub fn get_mut(&mut self, id: Id) -> Result<&mut Packet> {
        Ok(self.packets.get_mut(id).ok_or(Kind::StalePacket)?)
    }

    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        self.packets.contains_key(id)
    }

    /// Adds a congestion reading to the packet's carried metric
    #[inline]
    pub fn accumulate(&mut self, id: Id, delta: u64) -> Result {
        self.get_mut(id)?.metadata.accumulate(delta);
        Ok(())
    }

    /// Flags the packet as carrying a feedback reading back to its origin leaf
    #[inline]
    pub fn mark_feedback(&mut self, id: Id) -> Result {
        self.get_mut(id)?.metadata.is_feedback = true;
        Ok(())
    }

    #[inline]
    pub fn stats(&self) -> Stats {
        Stats {
            live: self.packets.len(),
            ..self.stats
        }
    }
}
