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

//! The thread that owns the exclusive context and finalizes results.

use crate::loader::{AsyncLoader, ShutdownReport, Submitter};
use crate::metrics::LoaderMetrics;
use ferry_core::{
    ContextToken, ExclusiveContext, Finalize, LoadError, LoadResult, Loader, LoaderError, Locator,
    RequestId,
};
use std::collections::VecDeque;

/// A result after it went through the owner.
#[derive(Debug)]
pub struct Finalized<R> {
    /// The request this answers.
    pub id: RequestId,
    /// What was loaded.
    pub locator: Locator,
    /// The context-bound resource, or the load error surfaced as-is.
    pub outcome: Result<R, LoadError>,
}

/// Drives an [`AsyncLoader`] from the thread that owns the exclusive context.
///
/// Call [`ContextOwner::cycle`] once per frame (or whatever the owner's unit
/// of work is). Each cycle drains the loader and finalizes results against
/// the context, at most `finalize_budget` of them; the rest wait for the next
/// cycle.
pub struct ContextOwner<C, P, L, F> {
    loader: AsyncLoader<P, L>,
    context: ExclusiveContext<C>,
    finalizer: F,
    backlog: VecDeque<LoadResult<P>>,
    budget: Option<usize>,
}

impl<C, P, L, F> ContextOwner<C, P, L, F>
where
    P: Send + 'static,
    L: Loader<P>,
    F: Finalize<P, Context = C>,
{
    /// Binds `context` to the calling thread. The per-cycle budget comes from
    /// the loader's configuration.
    pub fn new(context: C, loader: AsyncLoader<P, L>, finalizer: F) -> Self {
        let budget = loader.config().finalize_budget;
        Self {
            loader,
            context: ExclusiveContext::new(context),
            finalizer,
            backlog: VecDeque::new(),
            budget,
        }
    }

    /// Starts the loader with the configured number of workers.
    pub fn start(&mut self) -> Result<(), LoaderError> {
        let workers = self.loader.config().worker_count;
        self.loader.start(workers)
    }

    /// Queues a load of `locator`.
    pub fn submit(&self, locator: impl Into<Locator>) -> Result<RequestId, LoaderError> {
        self.loader.submit(locator)
    }

    /// A handle other threads can submit through.
    pub fn submitter(&self) -> Submitter<P> {
        self.loader.submitter()
    }

    /// Runs one owner cycle: drain, then finalize up to the budget.
    ///
    /// Successful payloads are turned into resources on this thread; failures
    /// are passed through without touching the context. Never blocks on
    /// workers.
    pub fn cycle(&mut self) -> Vec<Finalized<F::Resource>> {
        self.backlog.extend(self.loader.try_drain());

        let take = self
            .budget
            .map_or(self.backlog.len(), |budget| budget.min(self.backlog.len()));
        let mut finalized = Vec::with_capacity(take);

        for result in self.backlog.drain(..take) {
            let (id, locator, status) = result.into_parts();
            let outcome = match status {
                Ok(payload) => Ok(self.context.finalize(&mut self.finalizer, payload)),
                Err(e) => {
                    log::warn!("Surfacing failed load {} ({}): {}", id, locator, e);
                    Err(e)
                }
            };
            if let Err(e) = self.loader.mark_finalized(id) {
                log::error!("Request tracker out of sync: {}", e);
            }
            finalized.push(Finalized {
                id,
                locator,
                outcome,
            });
        }

        if !finalized.is_empty() {
            log::debug!(
                "Cycle finalized {} result(s), {} waiting, {} in flight.",
                finalized.len(),
                self.backlog.len(),
                self.loader.in_flight()
            );
        }
        finalized
    }
}

impl<C, P, L, F> ContextOwner<C, P, L, F> {
    /// Stops the loader and drops the backlog.
    ///
    /// Results already drained but not finalized count as discarded, even
    /// when a worker panicked and the loader reports an error.
    pub fn stop(&mut self) -> Result<ShutdownReport, LoaderError> {
        let dropped = self.backlog.len();
        self.backlog.clear();
        LoaderMetrics::count(&self.loader.metrics().discarded_total, dropped);

        let mut report = self.loader.stop()?;
        report.discarded += dropped;
        Ok(report)
    }

    /// Results drained but waiting for a later cycle.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// The loader being driven.
    pub fn loader(&self) -> &AsyncLoader<P, L> {
        &self.loader
    }

    /// Shared access to the context.
    pub fn context(&self) -> &C {
        self.context.get()
    }

    /// Runs `f` against the context on this thread.
    pub fn with_context<R>(&mut self, f: impl FnOnce(&ContextToken, &mut C) -> R) -> R {
        self.context.with(f)
    }

    /// Stops the loader and returns the context.
    pub fn into_context(mut self) -> Result<C, LoaderError> {
        self.stop()?;
        let ContextOwner { context, .. } = self;
        Ok(context.into_inner())
    }
}
