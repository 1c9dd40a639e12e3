// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::time::timestamp::Timestamp;

/// A `Clock` is a source of [`Timestamp`]s.
pub trait Clock {
    /// Returns the current [`Timestamp`]
    fn get_time(&self) -> Timestamp;
}

impl Clock for Timestamp {
    #[inline]
    fn get_time(&self) -> Timestamp {
        *self
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use crate::time::{Duration, Timestamp};

    /// A manually advanced clock
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Clock(Timestamp);

    impl super::Clock for Clock {
        fn get_time(&self) -> Timestamp {
            self.0
        }
    }

    impl Clock {
        pub fn inc_by(&mut self, duration: Duration) {
            self.0 += duration;
        }
    }
}
