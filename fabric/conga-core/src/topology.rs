// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{Kind, Result},
    id::{CoreId, LeafId, ServerId},
};

/// Dimensions of a two-tier leaf/core fabric
///
/// Servers are numbered contiguously by leaf: leaf `l` hosts servers
/// `l * servers_per_leaf .. (l + 1) * servers_per_leaf`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shape {
    pub leaves: u32,
    pub cores: u32,
    pub servers_per_leaf: u32,
}

impl Shape {
    #[inline]
    pub fn new(leaves: u32, cores: u32, servers_per_leaf: u32) -> Self {
        Self {
            leaves,
            cores,
            servers_per_leaf,
        }
    }

    #[inline]
    pub fn servers(&self) -> u32 {
        self.leaves.saturating_mul(self.servers_per_leaf)
    }

    #[inline]
    pub fn check_leaf(&self, leaf: LeafId) -> Result<LeafId> {
        if leaf.as_u32() < self.leaves {
            Ok(leaf)
        } else {
            Err(Kind::LeafOutOfRange {
                leaf,
                leaves: self.leaves,
            }
            .err())
        }
    }

    #[inline]
    pub fn check_core(&self, core: CoreId) -> Result<CoreId> {
        if core.as_u32() < self.cores {
            Ok(core)
        } else {
            Err(Kind::UplinkOutOfRange {
                core,
                cores: self.cores,
            }
            .err())
        }
    }

    /// Returns the leaf the server is attached to
    #[inline]
    pub fn leaf_of(&self, server: ServerId) -> Result<LeafId> {
        if self.servers_per_leaf == 0 || server.as_u32() >= self.servers() {
            return Err(Kind::UnknownServer { server }.err());
        }
        Ok(LeafId::new(server.as_u32() / self.servers_per_leaf))
    }

    /// Returns the position of the server among its leaf's downlinks
    #[inline]
    pub(crate) fn port_of(&self, server: ServerId) -> usize {
        debug_assert_ne!(self.servers_per_leaf, 0);
        (server.as_u32() % self.servers_per_leaf) as usize
    }

    pub fn servers_of(&self, leaf: LeafId) -> impl Iterator<Item = ServerId> {
        let start = leaf.as_u32() * self.servers_per_leaf;
        (start..start + self.servers_per_leaf).map(ServerId::new)
    }

    pub fn leaf_ids(&self) -> impl Iterator<Item = LeafId> {
        (0..self.leaves).map(LeafId::new)
    }

    pub fn core_ids(&self) -> impl Iterator<Item = CoreId> {
        (0..self.cores).map(CoreId::new)
    }
}
