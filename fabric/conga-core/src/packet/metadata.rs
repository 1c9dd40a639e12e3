// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    id::{LeafId, UplinkId},
    time::Timestamp,
};
use zerocopy::{
    byteorder::network_endian::{U32, U64},
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

/// Load balancing state carried by every packet crossing the fabric
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    pub src_leaf: LeafId,
    pub dst_leaf: LeafId,
    /// The core the packet crosses. For feedback carriers this is also the path the
    /// carried metric describes.
    pub selected_uplink: UplinkId,
    /// Congestion accumulated along the path, or the fed back metric
    pub congestion: u64,
    /// When the fed back metric was measured. Only meaningful on feedback carriers.
    pub measured_at: Timestamp,
    pub is_feedback: bool,
}

impl Metadata {
    /// Stamps the path identity, clearing any previously carried reading
    #[inline]
    pub fn stamp(&mut self, src_leaf: LeafId, dst_leaf: LeafId, uplink: UplinkId) {
        *self = Self {
            src_leaf,
            dst_leaf,
            selected_uplink: uplink,
            congestion: 0,
            measured_at: Timestamp::ZERO,
            is_feedback: false,
        };
    }

    #[inline]
    pub fn accumulate(&mut self, delta: u64) {
        self.congestion = self.congestion.saturating_add(delta);
    }

    #[cfg(any(test, feature = "testing"))]
    #[inline]
    pub fn encode(&self) -> Header {
        Header {
            src_leaf: U32::new(self.src_leaf.as_u32()),
            dst_leaf: U32::new(self.dst_leaf.as_u32()),
            selected_uplink: U32::new(self.selected_uplink.as_u32()),
            congestion: U64::new(self.congestion),
            measured_at: U64::new(self.measured_at.as_picos()),
            flags: if self.is_feedback { Header::FEEDBACK } else { 0 },
        }
    }
}

/// Fixed-layout, network byte order encoding of [`Metadata`]
///
/// The simulated fabric only moves [`Metadata`] around in memory but charges
/// [`Header::LEN`] bytes for it on every data packet.
#[cfg_attr(not(any(test, feature = "testing")), allow(dead_code))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct Header {
    src_leaf: U32,
    dst_leaf: U32,
    selected_uplink: U32,
    congestion: U64,
    measured_at: U64,
    flags: u8,
}

impl Header {
    pub const LEN: usize = core::mem::size_of::<Self>();

    #[cfg(any(test, feature = "testing"))]
    const FEEDBACK: u8 = 0b1;

    /// Reads a header from the front of `bytes`, returning the remaining bytes
    #[cfg(any(test, feature = "testing"))]
    #[inline]
    pub fn decode(bytes: &[u8]) -> Option<(Metadata, &[u8])> {
        let (header, remaining) = Self::read_from_prefix(bytes).ok()?;
        Some((header.into(), remaining))
    }
}

#[cfg(any(test, feature = "testing"))]
impl From<Header> for Metadata {
    #[inline]
    fn from(header: Header) -> Self {
        Self {
            src_leaf: header.src_leaf.get().into(),
            dst_leaf: header.dst_leaf.get().into(),
            selected_uplink: header.selected_uplink.get().into(),
            congestion: header.congestion.get(),
            measured_at: Timestamp::from_picos(header.measured_at.get()),
            is_feedback: header.flags & Header::FEEDBACK != 0,
        }
    }
}
