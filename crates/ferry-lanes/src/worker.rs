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

//! Generic worker threads.
//!
//! A worker is nothing more than a closure fed from a [`RequestQueue`]. The
//! runner knows neither the payload type nor where results go; that is left
//! to the handler.

use crate::queue::{Popped, RequestQueue};
use ferry_core::LoadRequest;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Feeds `handler` from `queue` until the queue is closed.
///
/// Returns the number of requests handled.
pub fn run_worker<F>(queue: &RequestQueue, mut handler: F) -> usize
where
    F: FnMut(LoadRequest),
{
    let mut served = 0;
    loop {
        match queue.pop_blocking() {
            Popped::Request(request) => {
                handler(request);
                served += 1;
            }
            Popped::Closed => return served,
        }
    }
}

/// Owns one running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    index: usize,
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns a named thread running [`run_worker`] over `queue`.
    pub fn spawn<F>(
        index: usize,
        name: impl Into<String>,
        queue: Arc<RequestQueue>,
        handler: F,
    ) -> io::Result<Self>
    where
        F: FnMut(LoadRequest) + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            log::debug!("Worker {} started.", index);
            let served = run_worker(&queue, handler);
            log::debug!("Worker {} exiting after {} request(s).", index, served);
        })?;

        Ok(Self {
            index,
            name,
            handle: Some(handle),
        })
    }

    /// Position of this worker in its pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the thread to exit. `Err` carries the panic payload if the
    /// thread panicked.
    pub fn join(mut self) -> thread::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueOrdering;
    use ferry_core::RequestId;
    use std::collections::HashSet;

    #[test]
    fn run_worker_returns_once_closed() {
        let queue = RequestQueue::new(QueueOrdering::Fifo);
        for id in 1..=3 {
            queue
                .push(LoadRequest::new(RequestId::from_raw(id), "x"))
                .unwrap();
        }

        let mut seen = Vec::new();
        let served = run_worker(&queue, |request| {
            seen.push(request.id().raw());
            if seen.len() == 3 {
                queue.close();
            }
        });

        assert_eq!(served, 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn pool_serves_every_request_once() {
        let queue = Arc::new(RequestQueue::new(QueueOrdering::Fifo));
        let (tx, rx) = crossbeam_channel::unbounded();

        let workers: Vec<_> = (0..3)
            .map(|index| {
                let tx = tx.clone();
                WorkerHandle::spawn(
                    index,
                    format!("test-worker-{index}"),
                    Arc::clone(&queue),
                    move |request: LoadRequest| {
                        let thread_name = thread::current().name().map(str::to_owned);
                        tx.send((request.id().raw(), thread_name)).unwrap();
                    },
                )
                .unwrap()
            })
            .collect();
        drop(tx);

        for id in 0..60 {
            queue
                .push(LoadRequest::new(RequestId::from_raw(id), "x"))
                .unwrap();
        }

        let mut ids = HashSet::new();
        for _ in 0..60 {
            let (id, thread_name) = rx
                .recv_timeout(std::time::Duration::from_secs(10))
                .unwrap();
            assert!(ids.insert(id));
            assert!(thread_name.unwrap().starts_with("test-worker-"));
        }

        queue.close();
        for worker in workers {
            assert!(worker.name().starts_with("test-worker-"));
            worker.join().unwrap();
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn panicking_handler_surfaces_on_join() {
        let queue = Arc::new(RequestQueue::new(QueueOrdering::Fifo));
        let worker = WorkerHandle::spawn(0, "doomed", Arc::clone(&queue), |_request| {
            panic!("handler failure");
        })
        .unwrap();

        queue
            .push(LoadRequest::new(RequestId::from_raw(1), "x"))
            .unwrap();
        assert!(worker.join().is_err());
    }
}
