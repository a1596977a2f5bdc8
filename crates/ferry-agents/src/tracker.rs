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

//! Owner-side bookkeeping of request states.
//!
//! The tracker lives on the owning thread and is fed from the event channel,
//! so it needs no lock. Every transition is checked against
//! [`RequestState::can_transition_to`].

use ferry_core::{LoaderError, Locator, RequestId, RequestState};
use std::collections::HashMap;

#[derive(Debug)]
struct Entry {
    locator: Locator,
    state: RequestState,
    history: Vec<RequestState>,
}

/// State table of every request the owner knows about.
#[derive(Debug, Default)]
pub struct RequestTracker {
    entries: HashMap<RequestId, Entry>,
    record_history: bool,
    // Histories of finalized requests, kept only when recording.
    retired: HashMap<RequestId, Vec<RequestState>>,
}

impl RequestTracker {
    /// Creates an empty tracker. With `record_history` every transition is
    /// kept and stays queryable after the request is finalized.
    pub fn new(record_history: bool) -> Self {
        Self {
            entries: HashMap::new(),
            record_history,
            retired: HashMap::new(),
        }
    }

    /// Registers a new request in [`RequestState::Pending`].
    pub fn begin(&mut self, id: RequestId, locator: Locator) -> Result<(), LoaderError> {
        if let Some(entry) = self.entries.get(&id) {
            return Err(LoaderError::InvalidTransition {
                id,
                from: Some(entry.state),
                to: RequestState::Pending,
            });
        }
        let history = if self.record_history {
            vec![RequestState::Pending]
        } else {
            Vec::new()
        };
        self.entries.insert(
            id,
            Entry {
                locator,
                state: RequestState::Pending,
                history,
            },
        );
        Ok(())
    }

    /// Moves `id` to `next`. Finalization goes through
    /// [`RequestTracker::finalize`] instead.
    pub fn advance(&mut self, id: RequestId, next: RequestState) -> Result<(), LoaderError> {
        if next == RequestState::Finalized {
            return self.finalize(id);
        }
        let entry = self.entries.get_mut(&id).ok_or(LoaderError::InvalidTransition {
            id,
            from: None,
            to: next,
        })?;
        if !entry.state.can_transition_to(next) {
            return Err(LoaderError::InvalidTransition {
                id,
                from: Some(entry.state),
                to: next,
            });
        }
        entry.state = next;
        if self.record_history {
            entry.history.push(next);
        }
        Ok(())
    }

    /// Marks `id` as finalized and forgets it.
    pub fn finalize(&mut self, id: RequestId) -> Result<(), LoaderError> {
        let to = RequestState::Finalized;
        let from = self.entries.get(&id).map(|entry| entry.state);
        if !from.is_some_and(|state| state.can_transition_to(to)) {
            return Err(LoaderError::InvalidTransition { id, from, to });
        }
        if let Some(mut entry) = self.entries.remove(&id) {
            if self.record_history {
                entry.history.push(to);
                self.retired.insert(id, entry.history);
            }
        }
        Ok(())
    }

    /// Drops a `Pending` request that never reached the queue.
    pub fn withdraw(&mut self, id: RequestId) -> Result<(), LoaderError> {
        match self.entries.get(&id).map(|entry| entry.state) {
            Some(RequestState::Pending) => {
                self.entries.remove(&id);
                Ok(())
            }
            from => Err(LoaderError::InvalidTransition {
                id,
                from,
                to: RequestState::Pending,
            }),
        }
    }

    /// Current state of `id`. Finalized requests report
    /// [`RequestState::Finalized`] only while history is recorded.
    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        match self.entries.get(&id) {
            Some(entry) => Some(entry.state),
            None => self
                .retired
                .contains_key(&id)
                .then_some(RequestState::Finalized),
        }
    }

    /// Every state `id` went through, oldest first. Empty unless history is
    /// recorded.
    pub fn history(&self, id: RequestId) -> Vec<RequestState> {
        self.entries
            .get(&id)
            .map(|entry| entry.history.clone())
            .or_else(|| self.retired.get(&id).cloned())
            .unwrap_or_default()
    }

    /// The locator of an in-flight request.
    pub fn locator(&self, id: RequestId) -> Option<&Locator> {
        self.entries.get(&id).map(|entry| &entry.locator)
    }

    /// Number of requests not yet finalized.
    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }

    /// Number of in-flight requests currently in `state`.
    pub fn count_in(&self, state: RequestState) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.state == state)
            .count()
    }

    /// Forgets every in-flight request and returns how many there were.
    /// Retired histories are kept.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}
