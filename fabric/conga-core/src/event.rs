// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Observable decisions made by a leaf switch

use crate::{
    id::{LeafId, UplinkId},
    time::Timestamp,
};
use core::fmt;

/// All events types which can be emitted from this library.
pub trait Event: fmt::Debug {
    const NAME: &'static str;
}

/// Fields common to all events
#[derive(Clone, Copy, Debug)]
pub struct Meta {
    /// The leaf emitting the event
    pub leaf: LeafId,
    pub timestamp: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    ToLeaf,
    FromLeaf,
    /// Readings waiting to be fed back to their source leaf
    Returns,
}

/// An uplink was chosen for a packet heading to another leaf
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct UplinkSelected {
    pub dst_leaf: LeafId,
    pub uplink: UplinkId,
    pub score: f64,
    /// Number of uplinks the choice was drawn from
    pub candidates: usize,
}

impl Event for UplinkSelected {
    const NAME: &'static str = "leaf:uplink_selected";
}

/// A feedback reading from a peer replaced a to-leaf estimate
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct FeedbackApplied {
    pub peer: LeafId,
    pub uplink: UplinkId,
    pub metric: u64,
}

impl Event for FeedbackApplied {
    const NAME: &'static str = "leaf:feedback_applied";
}

/// The congestion carried by an arriving packet was stored for feedback
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct FeedbackRecorded {
    pub peer: LeafId,
    pub uplink: UplinkId,
    pub metric: u64,
}

impl Event for FeedbackRecorded {
    const NAME: &'static str = "leaf:feedback_recorded";
}

/// A local occupancy sample was blended into a to-leaf estimate
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct SampleTaken {
    pub dst_leaf: LeafId,
    pub uplink: UplinkId,
    pub sample: u64,
    pub estimate: f64,
}

impl Event for SampleTaken {
    const NAME: &'static str = "leaf:sample_taken";
}

/// An estimate went stale and was cleared
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct EntryAged {
    pub table: Table,
    pub peer: LeafId,
    pub uplink: UplinkId,
    pub previous: f64,
}

impl Event for EntryAged {
    const NAME: &'static str = "leaf:entry_aged";
}

pub trait Subscriber: 'static {
    #[inline]
    fn on_uplink_selected(&mut self, meta: &Meta, event: &UplinkSelected) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_feedback_applied(&mut self, meta: &Meta, event: &FeedbackApplied) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_feedback_recorded(&mut self, meta: &Meta, event: &FeedbackRecorded) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_sample_taken(&mut self, meta: &Meta, event: &SampleTaken) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_entry_aged(&mut self, meta: &Meta, event: &EntryAged) {
        let _ = meta;
        let _ = event;
    }

    /// Called for each event, after its specific handler
    #[inline]
    fn on_event<E: Event>(&mut self, meta: &Meta, event: &E) {
        let _ = meta;
        let _ = event;
    }
}

impl Subscriber for () {}

impl<A, B> Subscriber for (A, B)
where
    A: Subscriber,
    B: Subscriber,
{
    #[inline]
    fn on_uplink_selected(&mut self, meta: &Meta, event: &UplinkSelected) {
        self.0.on_uplink_selected(meta, event);
        self.1.on_uplink_selected(meta, event);
    }

    #[inline]
    fn on_feedback_applied(&mut self, meta: &Meta, event: &FeedbackApplied) {
        self.0.on_feedback_applied(meta, event);
        self.1.on_feedback_applied(meta, event);
    }

    #[inline]
    fn on_feedback_recorded(&mut self, meta: &Meta, event: &FeedbackRecorded) {
        self.0.on_feedback_recorded(meta, event);
        self.1.on_feedback_recorded(meta, event);
    }

    #[inline]
    fn on_sample_taken(&mut self, meta: &Meta, event: &SampleTaken) {
        self.0.on_sample_taken(meta, event);
        self.1.on_sample_taken(meta, event);
    }

    #[inline]
    fn on_entry_aged(&mut self, meta: &Meta, event: &EntryAged) {
        self.0.on_entry_aged(meta, event);
        self.1.on_entry_aged(meta, event);
    }

    #[inline]
    fn on_event<E: Event>(&mut self, meta: &Meta, event: &E) {
        self.0.on_event(meta, event);
        self.1.on_event(meta, event);
    }
}

/// Dispatches events to a subscriber on behalf of a single leaf
pub(crate) struct Publisher<'a, S: Subscriber> {
    meta: Meta,
    subscriber: &'a mut S,
}

impl<'a, S: Subscriber> Publisher<'a, S> {
    #[inline]
    pub(crate) fn new(subscriber: &'a mut S, leaf: LeafId, timestamp: Timestamp) -> Self {
        Self {
            meta: Meta { leaf, timestamp },
            subscriber,
        }
    }

    #[inline]
    pub(crate) fn on_uplink_selected(&mut self, event: UplinkSelected) {
        self.subscriber.on_uplink_selected(&self.meta, &event);
        self.subscriber.on_event(&self.meta, &event);
    }

    #[inline]
    pub(crate) fn on_feedback_applied(&mut self, event: FeedbackApplied) {
        self.subscriber.on_feedback_applied(&self.meta, &event);
        self.subscriber.on_event(&self.meta, &event);
    }

    #[inline]
    pub(crate) fn on_feedback_recorded(&mut self, event: FeedbackRecorded) {
        self.subscriber.on_feedback_recorded(&self.meta, &event);
        self.subscriber.on_event(&self.meta, &event);
    }

    #[inline]
    pub(crate) fn on_sample_taken(&mut self, event: SampleTaken) {
        self.subscriber.on_sample_taken(&self.meta, &event);
        self.subscriber.on_event(&self.meta, &event);
    }

    #[inline]
    pub(crate) fn on_entry_aged(&mut self, event: EntryAged) {
        self.subscriber.on_entry_aged(&self.meta, &event);
        self.subscriber.on_event(&self.meta, &event);
    }
}

pub mod tracing {
    //! Forwards every event to [`tracing`] at debug level

    use super::*;

    #[derive(Clone, Copy, Debug, Default)]
    pub struct Subscriber;

    impl super::Subscriber for Subscriber {
        #[inline]
        fn on_uplink_selected(&mut self, meta: &Meta, event: &UplinkSelected) {
            let UplinkSelected {
                dst_leaf,
                uplink,
                score,
                candidates,
            } = event;
            ::tracing::debug!(
                target: "uplink_selected",
                leaf = ?meta.leaf,
                now = %meta.timestamp,
                ?dst_leaf,
                ?uplink,
                score,
                candidates
            );
        }

        #[inline]
        fn on_feedback_applied(&mut self, meta: &Meta, event: &FeedbackApplied) {
            let FeedbackApplied {
                peer,
                uplink,
                metric,
            } = event;
            ::tracing::debug!(
                target: "feedback_applied",
                leaf = ?meta.leaf,
                now = %meta.timestamp,
                ?peer,
                ?uplink,
                metric
            );
        }

        #[inline]
        fn on_feedback_recorded(&mut self, meta: &Meta, event: &FeedbackRecorded) {
            let FeedbackRecorded {
                peer,
                uplink,
                metric,
            } = event;
            ::tracing::debug!(
                target: "feedback_recorded",
                leaf = ?meta.leaf,
                now = %meta.timestamp,
                ?peer,
                ?uplink,
                metric
            );
        }

        #[inline]
        fn on_sample_taken(&mut self, meta: &Meta, event: &SampleTaken) {
            let SampleTaken {
                dst_leaf,
                uplink,
                sample,
                estimate,
            } = event;
            ::tracing::debug!(
                target: "sample_taken",
                leaf = ?meta.leaf,
                now = %meta.timestamp,
                ?dst_leaf,
                ?uplink,
                sample,
                estimate
            );
        }

        #[inline]
        fn on_entry_aged(&mut self, meta: &Meta, event: &EntryAged) {
            let EntryAged {
                table,
                peer,
                uplink,
                previous,
            } = event;
            ::tracing::debug!(
                target: "entry_aged",
                leaf = ?meta.leaf,
                now = %meta.timestamp,
                ?table,
                ?peer,
                ?uplink,
                previous
            );
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// Records the name and rendering of every event it sees
    #[derive(Debug, Default)]
    pub struct Recorder {
        pub names: Vec<&'static str>,
        pub output: Vec<String>,
    }

    impl Recorder {
        pub fn count(&self, name: &str) -> usize {
            self.names.iter().filter(|n| **n == name).count()
        }

        pub fn clear(&mut self) {
            self.names.clear();
            self.output.clear();
        }
    }

    impl super::Subscriber for Recorder {
        fn on_event<E: Event>(&mut self, meta: &Meta, event: &E) {
            self.names.push(E::NAME);
            self.output.push(format!("{meta:?} {event:?}"));
        }
    }
}
