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

//! The per-request lifecycle.

use serde::{Deserialize, Serialize};

/// Where a request currently is in the pipeline.
///
/// ```text
/// Pending -> Loading -> Completed -> Finalized
///                    \-> Failed   -/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Submitted and waiting in the queue.
    Pending,
    /// Picked up by a worker; the load function is running.
    Loading,
    /// The load succeeded and the payload is waiting for the owner.
    Completed,
    /// The load failed and the error is waiting for the owner.
    Failed,
    /// The owner consumed the result.
    Finalized,
}

impl RequestState {
    /// Whether `next` directly follows `self` in the lifecycle.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Pending, Loading)
                | (Loading, Completed)
                | (Loading, Failed)
                | (Completed, Finalized)
                | (Failed, Finalized)
        )
    }

    /// Whether a worker has produced an outcome the owner has not consumed yet.
    pub fn is_ready(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }

    /// Whether the request has left the pipeline.
    pub fn is_terminal(self) -> bool {
        self == RequestState::Finalized
    }
}
