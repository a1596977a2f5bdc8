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

//! The handoff path from producers and workers back to the owning thread.

use crossbeam_channel::{Receiver, Sender};
use ferry_core::{LoadResult, Locator, RequestId};

/// Everything the owner learns about a request travels as one of these.
///
/// A request's `Submitted` is sent before it is queued and its `Started`
/// after it is popped, so the owner always receives a request's events in
/// lifecycle order.
#[derive(Debug)]
pub enum LoaderEvent<P> {
    /// A request is about to be queued.
    Submitted {
        /// The new request.
        id: RequestId,
        /// What it loads.
        locator: Locator,
    },
    /// A request announced by `Submitted` was rejected by the queue.
    Withdrawn {
        /// The rejected request.
        id: RequestId,
    },
    /// A worker took the request off the queue.
    Started {
        /// The request.
        id: RequestId,
        /// Index of the worker running it.
        worker: usize,
    },
    /// The load finished, successfully or not.
    Finished(LoadResult<P>),
}

impl<P> LoaderEvent<P> {
    /// The request this event is about.
    pub fn id(&self) -> RequestId {
        match self {
            LoaderEvent::Submitted { id, .. }
            | LoaderEvent::Withdrawn { id }
            | LoaderEvent::Started { id, .. } => *id,
            LoaderEvent::Finished(result) => result.id(),
        }
    }
}

/// Creates a connected sender / channel pair.
pub fn event_channel<P>() -> (EventSender<P>, ResultChannel<P>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventSender { tx }, ResultChannel { rx })
}

/// Producer side of the channel. Cheap to clone, one per thread.
#[derive(Debug)]
pub struct EventSender<P> {
    tx: Sender<LoaderEvent<P>>,
}

impl<P> Clone for EventSender<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P> EventSender<P> {
    /// Sends an event. Returns `false` if the owner side is gone, in which
    /// case the event is dropped.
    pub fn send(&self, event: LoaderEvent<P>) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(err) => {
                log::trace!("Event for request {} dropped: receiver gone", err.0.id());
                false
            }
        }
    }

    /// Announces a request that is about to be queued.
    pub fn submitted(&self, id: RequestId, locator: Locator) -> bool {
        self.send(LoaderEvent::Submitted { id, locator })
    }

    /// Retracts a request the queue refused.
    pub fn withdrawn(&self, id: RequestId) -> bool {
        self.send(LoaderEvent::Withdrawn { id })
    }

    /// Reports that `worker` began loading `id`.
    pub fn started(&self, id: RequestId, worker: usize) -> bool {
        self.send(LoaderEvent::Started { id, worker })
    }

    /// Publishes a finished load.
    pub fn finished(&self, result: LoadResult<P>) -> bool {
        self.send(LoaderEvent::Finished(result))
    }
}

/// Owner side of the channel. Never blocks.
#[derive(Debug)]
pub struct ResultChannel<P> {
    rx: Receiver<LoaderEvent<P>>,
}

impl<P> ResultChannel<P> {
    /// Takes every event that was available when the call began.
    ///
    /// Events sent while draining are left for the next call, so a busy
    /// worker pool cannot keep the owner inside this method.
    pub fn try_drain(&self) -> Vec<LoaderEvent<P>> {
        let available = self.rx.len();
        self.rx.try_iter().take(available).collect()
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no event is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
