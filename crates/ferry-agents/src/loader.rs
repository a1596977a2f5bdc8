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

//! The asynchronous loader: worker lifecycle, submission and draining.
//!
//! An [`AsyncLoader`] is created on the owning thread and never leaves it.
//! It spawns the workers, accepts requests, and turns the events coming back
//! from the workers into [`LoadResult`]s while keeping the
//! [`RequestTracker`] up to date. Other threads submit work through a
//! [`Submitter`].

use crate::config::LoaderConfig;
use crate::metrics::LoaderMetrics;
use crate::tracker::RequestTracker;
use ferry_core::{
    IdAllocator, LoadError, LoadRequest, LoadResult, Loader, LoaderError, Locator, Priority,
    RequestId, RequestState,
};
use ferry_lanes::{
    event_channel, EventSender, LoaderEvent, PushError, RequestQueue, ResultChannel, WorkerHandle,
};
use ferry_telemetry::{MetricsRegistry, ScopedMetricTimer};
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Lifecycle phase of an [`AsyncLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderPhase {
    /// Created; requests are queued but nothing runs them yet.
    Idle,
    /// Workers are running.
    Running,
    /// Workers have been joined. Terminal.
    Stopped,
}

impl LoaderPhase {
    /// Whether the loader may move from `self` to `next`.
    pub fn can_transition_to(self, next: LoaderPhase) -> bool {
        use LoaderPhase::*;
        matches!(
            (self, next),
            (Idle, Running) | (Idle, Stopped) | (Running, Stopped)
        )
    }
}

/// What a shutdown threw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Requests still queued that no worker ever picked up.
    pub abandoned: usize,
    /// Results that finished but were never finalized.
    pub discarded: usize,
    /// Worker threads joined.
    pub workers_joined: usize,
}

/// Submits requests to a loader from any thread.
pub struct Submitter<P> {
    queue: Arc<RequestQueue>,
    events: EventSender<P>,
    ids: Arc<IdAllocator>,
    metrics: LoaderMetrics,
}

impl<P> Clone for Submitter<P> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            events: self.events.clone(),
            ids: Arc::clone(&self.ids),
            metrics: self.metrics.clone(),
        }
    }
}

impl<P> Submitter<P> {
    /// Queues a load of `locator` with normal priority.
    ///
    /// Blocks while a bounded queue is full.
    pub fn submit(&self, locator: impl Into<Locator>) -> Result<RequestId, LoaderError> {
        self.enqueue(locator.into(), Priority::Normal, true)
    }

    /// Queues a load of `locator` with the given priority.
    pub fn submit_with_priority(
        &self,
        locator: impl Into<Locator>,
        priority: Priority,
    ) -> Result<RequestId, LoaderError> {
        self.enqueue(locator.into(), priority, true)
    }

    /// Queues a load without blocking; fails with
    /// [`LoaderError::QueueFull`] when a bounded queue is at capacity.
    pub fn try_submit(&self, locator: impl Into<Locator>) -> Result<RequestId, LoaderError> {
        self.enqueue(locator.into(), Priority::Normal, false)
    }

    fn enqueue(
        &self,
        locator: Locator,
        priority: Priority,
        blocking: bool,
    ) -> Result<RequestId, LoaderError> {
        if self.queue.is_closed() {
            return Err(LoaderError::Stopped);
        }

        let id = self.ids.next_id();
        let request = LoadRequest::new(id, locator.clone()).with_priority(priority);

        // Announce before queueing so the owner sees Pending before Loading.
        self.events.submitted(id, locator);
        let pushed = if blocking {
            self.queue.push(request)
        } else {
            self.queue.try_push(request)
        };

        match pushed {
            Ok(()) => {
                LoaderMetrics::count(&self.metrics.submitted_total, 1);
                log::trace!("Request {} queued.", id);
                Ok(id)
            }
            Err(err) => {
                self.events.withdrawn(id);
                match err {
                    PushError::Closed(request) => {
                        log::warn!("Rejected {}: loader stopped.", request.locator());
                        Err(LoaderError::Stopped)
                    }
                    PushError::Full(request) => {
                        log::warn!("Rejected {}: queue full.", request.locator());
                        Err(LoaderError::QueueFull)
                    }
                }
            }
        }
    }
}

impl<P> std::fmt::Debug for Submitter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Moves blocking loads onto worker threads and hands the results back to
/// the owning thread.
///
/// `AsyncLoader` is `!Send`: it stays on the thread that created it, which is
/// the only thread allowed to drain results.
pub struct AsyncLoader<P, L> {
    config: LoaderConfig,
    loader: Arc<L>,
    queue: Arc<RequestQueue>,
    events: ResultChannel<P>,
    submitter: Submitter<P>,
    workers: Vec<WorkerHandle>,
    tracker: RequestTracker,
    metrics: LoaderMetrics,
    phase: LoaderPhase,
    _owner_thread: PhantomData<*const ()>,
}

impl<P, L> AsyncLoader<P, L>
where
    P: Send + 'static,
    L: Loader<P>,
{
    /// Creates an idle loader with its own metrics registry.
    pub fn new(loader: L, config: LoaderConfig) -> Result<Self, LoaderError> {
        Self::with_metrics_registry(loader, config, &MetricsRegistry::new())
    }

    /// Creates an idle loader reporting into `registry`.
    ///
    /// Metrics are labelled with `config.thread_name`, so loaders sharing a
    /// registry need distinct names.
    pub fn with_metrics_registry(
        loader: L,
        config: LoaderConfig,
        registry: &MetricsRegistry,
    ) -> Result<Self, LoaderError> {
        config.validate()?;
        let metrics = LoaderMetrics::register(registry, &config.thread_name)
            .map_err(|e| LoaderError::Metrics(e.to_string()))?;

        let queue = Arc::new(RequestQueue::with_capacity(
            config.ordering,
            config.queue_capacity,
        ));
        let (sender, events) = event_channel();
        let submitter = Submitter {
            queue: Arc::clone(&queue),
            events: sender,
            ids: Arc::new(IdAllocator::new()),
            metrics: metrics.clone(),
        };

        Ok(Self {
            tracker: RequestTracker::new(config.record_history),
            config,
            loader: Arc::new(loader),
            queue,
            events,
            submitter,
            workers: Vec::new(),
            metrics,
            phase: LoaderPhase::Idle,
            _owner_thread: PhantomData,
        })
    }

    /// Spawns `worker_count` workers on the shared queue.
    ///
    /// Can succeed once. If a thread cannot be spawned, the workers already
    /// running are shut down and joined, the loader ends up stopped, and the
    /// spawn error is returned.
    pub fn start(&mut self, worker_count: usize) -> Result<(), LoaderError> {
        match self.phase {
            LoaderPhase::Idle => {}
            LoaderPhase::Running => return Err(LoaderError::AlreadyStarted),
            LoaderPhase::Stopped => return Err(LoaderError::Stopped),
        }
        if worker_count == 0 {
            return Err(LoaderError::NoWorkers);
        }

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let name = self.config.worker_thread_name(index);
            let job = load_job(
                index,
                Arc::clone(&self.loader),
                self.submitter.events.clone(),
                self.metrics.clone(),
            );
            match WorkerHandle::spawn(index, name.clone(), Arc::clone(&self.queue), job) {
                Ok(worker) => workers.push(worker),
                Err(source) => {
                    log::error!("Failed to spawn worker '{}': {}", name, source);
                    self.workers = workers;
                    // The spawn failure takes precedence over a worker panic.
                    if let Err(e) = self.shutdown() {
                        log::error!("Cleanup after failed spawn also failed: {}", e);
                    }
                    return Err(LoaderError::Spawn { name, source });
                }
            }
        }

        self.workers = workers;
        self.phase = LoaderPhase::Running;
        log::info!(
            "Loader started with {} worker(s), {:?} ordering, capacity {:?}.",
            worker_count,
            self.config.ordering,
            self.queue.capacity()
        );
        Ok(())
    }

    /// Queues a load of `locator` with normal priority.
    ///
    /// Blocks on a full bounded queue only while workers are running. Before
    /// [`AsyncLoader::start`] nothing could drain the queue, so a full queue
    /// fails with [`LoaderError::QueueFull`] instead.
    pub fn submit(&self, locator: impl Into<Locator>) -> Result<RequestId, LoaderError> {
        self.submit_with_priority(locator, Priority::Normal)
    }

    /// Queues a load of `locator` with the given priority. Blocks like
    /// [`AsyncLoader::submit`].
    pub fn submit_with_priority(
        &self,
        locator: impl Into<Locator>,
        priority: Priority,
    ) -> Result<RequestId, LoaderError> {
        let blocking = self.phase == LoaderPhase::Running;
        self.submitter.enqueue(locator.into(), priority, blocking)
    }

    /// Queues a load without blocking.
    pub fn try_submit(&self, locator: impl Into<Locator>) -> Result<RequestId, LoaderError> {
        self.submitter.try_submit(locator)
    }

    /// A handle other threads can submit through.
    pub fn submitter(&self) -> Submitter<P> {
        self.submitter.clone()
    }

    /// Returns every result that finished since the last call, possibly none.
    ///
    /// Never blocks. Each result is returned exactly once; its request is
    /// then `Completed` or `Failed` until [`AsyncLoader::mark_finalized`].
    /// After [`AsyncLoader::stop`] this always returns an empty vector.
    pub fn try_drain(&mut self) -> Vec<LoadResult<P>> {
        let events = self.events.try_drain();
        if events.is_empty() {
            return Vec::new();
        }
        if self.phase == LoaderPhase::Stopped {
            log::trace!("Ignoring {} event(s) received after stop.", events.len());
            return Vec::new();
        }

        let mut results = Vec::new();
        for event in events {
            if let Some(result) = self.apply(event) {
                results.push(result);
            }
        }
        self.metrics.sample_queue_depth(self.queue.len());
        results
    }

    fn apply(&mut self, event: LoaderEvent<P>) -> Option<LoadResult<P>> {
        let outcome = match event {
            LoaderEvent::Submitted { id, locator } => self.tracker.begin(id, locator),
            LoaderEvent::Withdrawn { id } => self.tracker.withdraw(id),
            LoaderEvent::Started { id, worker } => {
                log::trace!("Request {} started on worker {}.", id, worker);
                self.tracker.advance(id, RequestState::Loading)
            }
            LoaderEvent::Finished(result) => {
                let next = if result.is_success() {
                    LoaderMetrics::count(&self.metrics.completed_total, 1);
                    RequestState::Completed
                } else {
                    LoaderMetrics::count(&self.metrics.failed_total, 1);
                    RequestState::Failed
                };
                if let Err(e) = self.tracker.advance(result.id(), next) {
                    log::error!("Request tracker out of sync: {}", e);
                }
                return Some(result);
            }
        };
        if let Err(e) = outcome {
            log::error!("Request tracker out of sync: {}", e);
        }
        None
    }

    /// Records that the owner consumed the result of `id`.
    pub fn mark_finalized(&mut self, id: RequestId) -> Result<(), LoaderError> {
        self.tracker.finalize(id)?;
        LoaderMetrics::count(&self.metrics.finalized_total, 1);
        Ok(())
    }
}

impl<P, L> AsyncLoader<P, L> {
    /// Shuts the loader down and joins every worker.
    ///
    /// Requests still queued are abandoned. Requests being loaded run to
    /// completion and their results are discarded. After this returns no
    /// worker thread is alive. Calling it again does nothing.
    pub fn stop(&mut self) -> Result<ShutdownReport, LoaderError> {
        if self.phase == LoaderPhase::Stopped {
            return Ok(ShutdownReport::default());
        }
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<ShutdownReport, LoaderError> {
        debug_assert!(self.phase.can_transition_to(LoaderPhase::Stopped));
        self.phase = LoaderPhase::Stopped;

        let abandoned = self.queue.close().len();

        let mut report = ShutdownReport {
            abandoned,
            ..ShutdownReport::default()
        };
        let mut panicked = None;
        for worker in self.workers.drain(..) {
            let name = worker.name().to_owned();
            if worker.join().is_err() {
                log::error!("Worker thread '{}' panicked.", name);
                panicked.get_or_insert(name);
            }
            report.workers_joined += 1;
        }

        // Workers are gone, so nothing can be added to the channel any more
        // except rejected submissions from other threads.
        report.discarded = self
            .events
            .try_drain()
            .into_iter()
            .filter(|event| matches!(event, LoaderEvent::Finished(_)))
            .count();
        let forgotten = self.tracker.clear();

        LoaderMetrics::count(&self.metrics.discarded_total, abandoned + report.discarded);
        self.metrics.sample_queue_depth(0);
        if abandoned + report.discarded > 0 {
            log::warn!(
                "Loader stopped: {} request(s) abandoned, {} result(s) discarded.",
                abandoned,
                report.discarded
            );
        }
        log::info!(
            "Loader stopped: {} worker(s) joined, {} tracked request(s) dropped.",
            report.workers_joined,
            forgotten
        );

        match panicked {
            Some(name) => Err(LoaderError::WorkerPanicked(name)),
            None => Ok(report),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LoaderPhase {
        self.phase
    }

    /// The configuration the loader was built with.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Last observed state of `id`, `None` if unknown or already forgotten.
    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.tracker.state(id)
    }

    /// States `id` went through. Empty unless history recording is enabled.
    pub fn history(&self, id: RequestId) -> Vec<RequestState> {
        self.tracker.history(id)
    }

    /// Requests submitted and not yet finalized, as far as the owner knows.
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }

    /// Number of live worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Requests waiting for a worker.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The loader's metric handles.
    pub fn metrics(&self) -> &LoaderMetrics {
        &self.metrics
    }
}

impl<P, L> Drop for AsyncLoader<P, L> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Loader shutdown on drop failed: {}", e);
        }
    }
}

/// Builds the closure a worker runs for every request it pops.
fn load_job<P, L>(
    worker: usize,
    loader: Arc<L>,
    events: EventSender<P>,
    metrics: LoaderMetrics,
) -> impl FnMut(LoadRequest) + Send + 'static
where
    P: Send + 'static,
    L: Loader<P>,
{
    move |request: LoadRequest| {
        let (id, locator) = request.into_parts();
        events.started(id, worker);

        let status = {
            let _timer = ScopedMetricTimer::new(&metrics.load_time);
            match panic::catch_unwind(AssertUnwindSafe(|| loader.load(&locator))) {
                Ok(status) => status,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("Loader panicked on '{}': {}", locator, message);
                    Err(LoadError::decode(&locator, format!("loader panicked: {message}")))
                }
            }
        };

        if let Err(e) = &status {
            log::error!("Failed to load request {}: {}", id, e);
        }
        events.finished(LoadResult::new(id, locator, status));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
