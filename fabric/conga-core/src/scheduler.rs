// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A single-threaded discrete-event loop
//!
//! Components don't own callbacks. They schedule plain task records carrying a
//! payload, and the loop's handler dispatches on the payload. Tasks with the same
//! fire time run in the order they were scheduled.

use crate::time::{Clock, Duration, Timestamp};
use core::cmp::Ordering;
use std::collections::BinaryHeap;

pub type TaskId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task<T> {
    pub id: TaskId,
    pub fire_at: Timestamp,
    pub payload: T,
}

#[derive(Debug)]
struct Queued<T>(Task<T>);

impl<T> Queued<T> {
    #[inline]
    fn key(&self) -> (Timestamp, TaskId) {
        (self.0.fire_at, self.0.id)
    }
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for Queued<T> {}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Queued<T> {
    // reversed so the heap pops the earliest task first
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

#[derive(Debug)]
pub struct Scheduler<T> {
    now: Timestamp,
    next_id: TaskId,
    queue: BinaryHeap<Queued<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            now: Timestamp::ZERO,
            next_id: 0,
            queue: BinaryHeap::new(),
        }
    }
}

impl<T> Scheduler<T> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Schedules `payload` to fire at `fire_at`
    ///
    /// Times in the past are moved up to the current time.
    pub fn schedule_at(&mut self, fire_at: Timestamp, payload: T) -> TaskId {
        debug_assert!(
            fire_at >= self.now,
            "task scheduled in the past: {fire_at} < {}",
            self.now
        );
        let fire_at = fire_at.max(self.now);

        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Queued(Task {
            id,
            fire_at,
            payload,
        }));
        id
    }

    #[inline]
    pub fn schedule_in(&mut self, delay: Duration, payload: T) -> TaskId {
        self.schedule_at(self.now + delay, payload)
    }

    /// Returns the fire time of the earliest pending task
    #[inline]
    pub fn peek_time(&self) -> Option<Timestamp> {
        self.queue.peek().map(|queued| queued.0.fire_at)
    }

    /// Removes the earliest task, advancing the clock to its fire time
    pub fn pop(&mut self) -> Option<Task<T>> {
        let Queued(task) = self.queue.pop()?;
        debug_assert!(task.fire_at >= self.now);
        self.now = task.fire_at;
        Some(task)
    }

    /// Runs every task firing at or before `end`, then advances the clock to `end`
    ///
    /// The handler may schedule further tasks. The first error stops the loop and is
    /// returned with the clock left at the failing task.
    pub fn run_until<F, E>(&mut self, end: Timestamp, mut handler: F) -> Result<(), E>
    where
        F: FnMut(&mut Self, Task<T>) -> Result<(), E>,
    {
        while self.peek_time().is_some_and(|fire_at| fire_at <= end) {
            let Some(task) = self.pop() else {
                break;
            };
            handler(self, task)?;
        }

        self.now = self.now.max(end);
        Ok(())
    }
}

impl<T> Clock for Scheduler<T> {
    #[inline]
    fn get_time(&self) -> Timestamp {
        self.now
    }
}
