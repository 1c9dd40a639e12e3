// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pooled data and acknowledgment packets carrying congestion metadata

use crate::{id::ServerId, time::Timestamp};

pub mod metadata;
pub mod pool;

pub use metadata::Metadata;
pub use pool::{FlowId, Id, Pool};

pub type SeqNo = u64;

/// Size of an acknowledgment on the wire, in bytes
pub const ACK_SIZE: u32 = 40;

/// The end hosts a packet travels between
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Route {
    pub src: ServerId,
    pub dst: ServerId,
}

impl Route {
    #[inline]
    pub fn new(src: ServerId, dst: ServerId) -> Self {
        Self { src, dst }
    }

    /// The route an acknowledgment takes back to the sender
    #[inline]
    pub fn reverse(self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Kind {
    #[default]
    Data,
    /// Acknowledges everything up to `ackno`
    Ack { ackno: SeqNo },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Packet {
    pub(crate) flow: Option<FlowId>,
    pub(crate) route: Route,
    pub(crate) size: u32,
    pub(crate) seqno: SeqNo,
    pub(crate) kind: Kind,
    pub(crate) ts: Option<Timestamp>,
    pub(crate) metadata: Metadata,
}

impl Packet {
    #[inline]
    pub fn flow(&self) -> Option<FlowId> {
        self.flow
    }

    #[inline]
    pub fn route(&self) -> Route {
        self.route
    }

    /// Size on the wire, in bytes
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn seqno(&self) -> SeqNo {
        self.seqno
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    pub fn is_ack(&self) -> bool {
        matches!(self.kind, Kind::Ack { .. })
    }

    #[inline]
    pub fn ackno(&self) -> Option<SeqNo> {
        match self.kind {
            Kind::Ack { ackno } => Some(ackno),
            Kind::Data => None,
        }
    }

    /// The time the packet was sent, if the transport recorded it
    #[inline]
    pub fn ts(&self) -> Option<Timestamp> {
        self.ts
    }

    #[inline]
    pub fn set_ts(&mut self, ts: Timestamp) {
        self.ts = Some(ts);
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[inline]
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    #[inline]
    pub fn is_feedback(&self) -> bool {
        self.metadata.is_feedback
    }

    /// Returns the packet to the state of a freshly constructed one
    #[inline]
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
