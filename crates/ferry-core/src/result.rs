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

use crate::error::{ErrorKind, LoadError};
use crate::request::{Locator, RequestId};

/// The outcome of one load, produced on a worker and consumed by the owner.
///
/// The payload is plain data: it must never contain anything bound to the
/// exclusive context. Context objects are created later, by
/// [`Finalize`](crate::Finalize), on the owning thread.
#[derive(Debug)]
pub struct LoadResult<P> {
    id: RequestId,
    locator: Locator,
    status: Result<P, LoadError>,
}

impl<P> LoadResult<P> {
    /// Creates a result for the request `id`.
    pub fn new(id: RequestId, locator: Locator, status: Result<P, LoadError>) -> Self {
        Self {
            id,
            locator,
            status,
        }
    }

    /// The identifier of the request this result answers.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The locator that was loaded.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Whether the load succeeded.
    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }

    /// The payload or the error.
    pub fn status(&self) -> &Result<P, LoadError> {
        &self.status
    }

    /// The error kind, if the load failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.status.as_ref().err().map(LoadError::kind)
    }

    /// Consumes the result, returning the payload or the error.
    pub fn into_status(self) -> Result<P, LoadError> {
        self.status
    }

    /// Consumes the result, returning all of its parts.
    pub fn into_parts(self) -> (RequestId, Locator, Result<P, LoadError>) {
        (self.id, self.locator, self.status)
    }
}
