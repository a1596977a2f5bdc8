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

//! Identifiers, locators and the immutable request submitted to the loader.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique identifier for a request while it is in flight.
///
/// Identifiers are handed out by an [`IdAllocator`] owned by the loader, never
/// chosen by the caller, so two in-flight requests can never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw value. Mostly useful in tests and logs.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Thread-safe source of [`RequestId`]s.
///
/// Ids start at 1 and are never reused by the same allocator.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Creates an allocator whose first id is `#1`.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Reserves the next identifier.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// The key of a resource to load: a relative path, an asset name, anything
/// the supplied [`Loader`](crate::Loader) understands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    /// Creates a locator from anything string-like.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The locator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The locator interpreted as a (usually relative) filesystem path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Path> for Locator {
    fn from(value: &Path) -> Self {
        Self(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Locator {
    fn from(value: PathBuf) -> Self {
        Self::from(value.as_path())
    }
}

/// Dispatch priority of a request.
///
/// Only honoured when the queue is configured for priority ordering; the
/// default queue is strict FIFO.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Background work, e.g. speculative prefetch.
    Low,
    /// Regular loads.
    #[default]
    Normal,
    /// Loads the current frame is waiting on.
    High,
    /// Loads that block progress entirely (boot screens, fallbacks).
    Critical,
}

/// A request to load one resource.
///
/// Immutable once built; it is moved into the queue on submission and consumed
/// by the worker that processes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    id: RequestId,
    locator: Locator,
    priority: Priority,
}

impl LoadRequest {
    /// Creates a request with [`Priority::Normal`].
    pub fn new(id: RequestId, locator: impl Into<Locator>) -> Self {
        Self {
            id,
            locator: locator.into(),
            priority: Priority::default(),
        }
    }

    /// Returns the same request with another priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The request identifier.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The resource locator.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// The dispatch priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Splits the request into its identifier and locator.
    pub fn into_parts(self) -> (RequestId, Locator) {
        (self.id, self.locator)
    }
}
