// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The request queue shared by producers and workers.
//!
//! Requests are moved in by [`RequestQueue::push`] and moved out by
//! [`RequestQueue::pop_blocking`]; no reference into the storage ever leaves
//! the lock, so internal growth is invisible to callers. Workers sleep on a
//! condition variable while the queue is empty and are woken for good by
//! [`RequestQueue::close`].

use ferry_core::{LoadRequest, Priority};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Dispatch order of a [`RequestQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOrdering {
    /// Strict insertion order.
    #[default]
    Fifo,
    /// Highest [`Priority`] first, insertion order among equals.
    Priority,
}

/// What a worker gets back from [`RequestQueue::pop_blocking`].
#[derive(Debug)]
pub enum Popped {
    /// The next request to process.
    Request(LoadRequest),
    /// The queue was closed; the worker should exit.
    Closed,
}

/// A request that could not be queued. The request is handed back.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The queue has been closed.
    #[error("the request queue is closed")]
    Closed(LoadRequest),
    /// A non-blocking push found the bounded queue at capacity.
    #[error("the request queue is full")]
    Full(LoadRequest),
}

impl PushError {
    /// Recovers the rejected request.
    pub fn into_request(self) -> LoadRequest {
        match self {
            PushError::Closed(request) | PushError::Full(request) => request,
        }
    }
}

struct Ranked {
    priority: Priority,
    sequence: u64,
    request: LoadRequest,
}

impl Ord for Ranked {
    // Max-heap: higher priority wins, then the older sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

enum Storage {
    Fifo(VecDeque<LoadRequest>),
    Priority(BinaryHeap<Ranked>),
}

impl Storage {
    fn new(ordering: QueueOrdering) -> Self {
        match ordering {
            QueueOrdering::Fifo => Storage::Fifo(VecDeque::new()),
            QueueOrdering::Priority => Storage::Priority(BinaryHeap::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            Storage::Fifo(queue) => queue.len(),
            Storage::Priority(heap) => heap.len(),
        }
    }

    fn push(&mut self, request: LoadRequest, sequence: u64) {
        match self {
            Storage::Fifo(queue) => queue.push_back(request),
            Storage::Priority(heap) => heap.push(Ranked {
                priority: request.priority(),
                sequence,
                request,
            }),
        }
    }

    fn pop(&mut self) -> Option<LoadRequest> {
        match self {
            Storage::Fifo(queue) => queue.pop_front(),
            Storage::Priority(heap) => heap.pop().map(|ranked| ranked.request),
        }
    }

    /// Empties the storage, returning the requests in dispatch order.
    fn drain(&mut self) -> Vec<LoadRequest> {
        match self {
            Storage::Fifo(queue) => queue.drain(..).collect(),
            Storage::Priority(heap) => {
                let mut sorted = std::mem::take(heap).into_sorted_vec();
                sorted.reverse();
                sorted.into_iter().map(|ranked| ranked.request).collect()
            }
        }
    }
}

struct QueueState {
    storage: Storage,
    closed: bool,
    next_sequence: u64,
}

/// Thread-safe queue of [`LoadRequest`]s with an optional capacity bound.
pub struct RequestQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
    ordering: QueueOrdering,
}

impl RequestQueue {
    /// Creates an unbounded queue.
    pub fn new(ordering: QueueOrdering) -> Self {
        Self::with_capacity(ordering, None)
    }

    /// Creates a queue whose `push` blocks while `capacity` requests are queued.
    /// A capacity of zero is raised to one.
    pub fn bounded(ordering: QueueOrdering, capacity: usize) -> Self {
        Self::with_capacity(ordering, Some(capacity))
    }

    /// Creates a bounded queue for `Some(capacity)`, an unbounded one for `None`.
    pub fn with_capacity(ordering: QueueOrdering, capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                storage: Storage::new(ordering),
                closed: false,
                next_sequence: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.map(|c| c.max(1)),
            ordering,
        }
    }

    /// Queues `request`, blocking while a bounded queue is full.
    ///
    /// Fails with [`PushError::Closed`] once the queue is closed, including
    /// when the close happens while this call is blocked.
    pub fn push(&self, request: LoadRequest) -> Result<(), PushError> {
        let mut state = self.lock();
        while !state.closed && self.is_full(&state) {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return Err(PushError::Closed(request));
        }
        Self::insert(&mut state, request);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Queues `request` without blocking.
    pub fn try_push(&self, request: LoadRequest) -> Result<(), PushError> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed(request));
        }
        if self.is_full(&state) {
            return Err(PushError::Full(request));
        }
        Self::insert(&mut state, request);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Takes the next request, sleeping until one is available.
    ///
    /// Returns [`Popped::Closed`] as soon as the queue is closed, even if it
    /// still held requests at that moment: those are returned by
    /// [`RequestQueue::close`] instead.
    pub fn pop_blocking(&self) -> Popped {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Popped::Closed;
            }
            if let Some(request) = state.storage.pop() {
                drop(state);
                self.not_full.notify_one();
                return Popped::Request(request);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the queue and wakes every blocked producer and consumer.
    ///
    /// Returns the requests that were never dispatched, in dispatch order.
    /// Closing an already closed queue returns nothing.
    pub fn close(&self) -> Vec<LoadRequest> {
        let mut state = self.lock();
        let abandoned = if state.closed {
            Vec::new()
        } else {
            state.closed = true;
            state.storage.drain()
        };
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        abandoned
    }

    /// Whether [`RequestQueue::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.lock().storage.len()
    }

    /// Whether no request is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The capacity bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// The dispatch order.
    pub fn ordering(&self) -> QueueOrdering {
        self.ordering
    }

    fn is_full(&self, state: &QueueState) -> bool {
        self.capacity
            .is_some_and(|capacity| state.storage.len() >= capacity)
    }

    fn insert(state: &mut QueueState, request: LoadRequest) {
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.storage.push(request, sequence);
    }

    // Every critical section leaves the state consistent, so a poisoned lock
    // is still safe to use.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RequestQueue")
            .field("len", &state.storage.len())
            .field("closed", &state.closed)
            .field("capacity", &self.capacity)
            .field("ordering", &self.ordering)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::RequestId;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn request(id: u64) -> LoadRequest {
        LoadRequest::new(RequestId::from_raw(id), format!("asset-{id}"))
    }

    fn pop_id(queue: &RequestQueue) -> Option<u64> {
        match queue.pop_blocking() {
            Popped::Request(request) => Some(request.id().raw()),
            Popped::Closed => None,
        }
    }

    #[test]
    fn fifo_is_insertion_order() {
        let queue = RequestQueue::new(QueueOrdering::Fifo);
        for id in 1..=3 {
            queue
                .push(request(id).with_priority(Priority::Low))
                .unwrap();
        }
        queue.push(request(4).with_priority(Priority::Critical)).unwrap();

        assert_eq!(queue.len(), 4);
        let order: Vec<_> = (0..4).filter_map(|_| pop_id(&queue)).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn priority_ordering_is_stable_among_equals() {
        let queue = RequestQueue::new(QueueOrdering::Priority);
        queue.push(request(1).with_priority(Priority::Low)).unwrap();
        queue.push(request(2)).unwrap();
        queue.push(request(3).with_priority(Priority::High)).unwrap();
        queue.push(request(4)).unwrap();
        queue.push(request(5).with_priority(Priority::High)).unwrap();

        let order: Vec<_> = (0..5).filter_map(|_| pop_id(&queue)).collect();
        assert_eq!(order, vec![3, 5, 2, 4, 1]);
    }

    #[test]
    fn close_returns_undispatched_requests_in_order() {
        let queue = RequestQueue::new(QueueOrdering::Priority);
        queue.push(request(1)).unwrap();
        queue.push(request(2).with_priority(Priority::Critical)).unwrap();

        let abandoned: Vec<_> = queue.close().iter().map(|r| r.id().raw()).collect();
        assert_eq!(abandoned, vec![2, 1]);
        assert!(queue.is_closed());
        assert!(queue.close().is_empty());
        assert!(matches!(queue.pop_blocking(), Popped::Closed));
    }

    #[test]
    fn push_after_close_hands_the_request_back() {
        let queue = RequestQueue::new(QueueOrdering::Fifo);
        queue.close();
        let err = queue.push(request(9)).unwrap_err();
        assert!(matches!(err, PushError::Closed(_)));
        assert_eq!(err.into_request().id().raw(), 9);
    }

    #[test]
    fn close_wakes_every_blocked_popper() {
        let queue = Arc::new(RequestQueue::new(QueueOrdering::Fifo));
        let poppers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || pop_id(&queue))
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.close();

        for popper in poppers {
            assert_eq!(popper.join().unwrap(), None);
        }
    }

    #[test]
    fn bounded_push_blocks_until_a_pop_frees_capacity() {
        let queue = Arc::new(RequestQueue::bounded(QueueOrdering::Fifo, 1));
        queue.push(request(1)).unwrap();

        let pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = Arc::clone(&queue);
            let pushed = Arc::clone(&pushed);
            thread::spawn(move || {
                let outcome = queue.push(request(2));
                pushed.store(true, AtomicOrdering::SeqCst);
                outcome
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pushed.load(AtomicOrdering::SeqCst), "push must wait for capacity");

        assert_eq!(pop_id(&queue), Some(1));
        producer.join().unwrap().unwrap();
        assert!(pushed.load(AtomicOrdering::SeqCst));
        assert_eq!(pop_id(&queue), Some(2));
    }

    #[test]
    fn try_push_reports_full() {
        let queue = RequestQueue::bounded(QueueOrdering::Fifo, 2);
        queue.try_push(request(1)).unwrap();
        queue.try_push(request(2)).unwrap();
        let err = queue.try_push(request(3)).unwrap_err();
        assert!(matches!(err, PushError::Full(_)));
        assert_eq!(queue.capacity(), Some(2));
    }

    #[test]
    fn close_releases_a_blocked_producer() {
        let queue = Arc::new(RequestQueue::bounded(QueueOrdering::Fifo, 1));
        queue.push(request(1)).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(request(2)))
        };

        thread::sleep(Duration::from_millis(50));
        let abandoned = queue.close();
        assert_eq!(abandoned.len(), 1);
        assert!(matches!(producer.join().unwrap(), Err(PushError::Closed(_))));
    }

    #[test]
    fn many_producers_many_consumers_lose_nothing() {
        let queue = Arc::new(RequestQueue::bounded(QueueOrdering::Fifo, 8));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(id) = pop_id(&queue) {
                        seen.push(id);
                        if seen.len() > 1000 {
                            break;
                        }
                    }
                    seen
                })
            })
            .collect();

        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(request(p * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(5));
        }
        queue.close();

        let mut all = HashSet::new();
        for consumer in consumers {
            for id in consumer.join().unwrap() {
                assert!(all.insert(id), "request {id} dispatched twice");
            }
        }
        assert_eq!(all.len(), 1000);
    }
}
