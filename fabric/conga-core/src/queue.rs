// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The narrow view switches have of the queues and links owned by the network

use crate::packet;
use core::fmt;

/// Handle of a transmit queue owned by the surrounding network
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// Queues a switch can observe and hand packets to
pub trait Network {
    /// Returns the number of bytes currently waiting in the queue
    fn occupancy(&self, queue: Id) -> u64;

    /// Hands the packet off for transmission
    ///
    /// Ownership of the packet moves to the queue, which may drop it according to
    /// its own policy.
    fn enqueue(&mut self, queue: Id, packet: packet::Id, size: u32);
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::Id;
    use crate::packet;
    use std::collections::HashMap;

    /// A network with fixed occupancies that records every hand-off
    #[derive(Debug, Default)]
    pub struct Network {
        occupancy: HashMap<Id, u64>,
        pub enqueued: Vec<(Id, packet::Id)>,
    }

    impl Network {
        pub fn set_occupancy(&mut self, queue: Id, bytes: u64) {
            self.occupancy.insert(queue, bytes);
        }

        /// Removes and returns the packets handed to `queue`, oldest first
        pub fn drain(&mut self, queue: Id) -> Vec<packet::Id> {
            let mut drained = vec![];
            self.enqueued.retain(|(q, packet)| {
                if *q == queue {
                    drained.push(*packet);
                    false
                } else {
                    true
                }
            });
            drained
        }
    }

    impl super::Network for Network {
        fn occupancy(&self, queue: Id) -> u64 {
            self.occupancy.get(&queue).copied().unwrap_or(0)
        }

        fn enqueue(&mut self, queue: Id, packet: packet::Id, _size: u32) {
            self.enqueued.push((queue, packet));
        }
    }
}
