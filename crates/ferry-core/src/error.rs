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

//! Error types of the loading pipeline.
//!
//! Two families live here:
//! - [`LoadError`]: why a single request failed. It travels through the result
//!   channel like any payload and is never raised across the worker boundary.
//! - [`LoaderError`]: misuse or failure of the loader itself (lifecycle,
//!   configuration, thread spawning).
//!
//! Touching the exclusive context from the wrong thread belongs to neither
//! family: it is a contract violation, prevented at compile time by
//! [`ContextToken`](crate::ContextToken).

use crate::request::{Locator, RequestId};
use crate::state::RequestState;
use std::io;

/// Coarse classification of a [`LoadError`], convenient for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The resource does not exist.
    NotFound,
    /// Reading the resource failed.
    Io,
    /// The bytes were read but could not be turned into a payload.
    Decode,
    /// Reserved for per-request cancellation; never produced by the default policy.
    Cancelled,
}

/// The reason a single load request failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The resource does not exist.
    #[error("resource '{locator}' was not found")]
    NotFound {
        /// The locator that could not be resolved.
        locator: String,
    },
    /// Reading the resource failed for another reason.
    #[error("I/O error while reading '{locator}': {message}")]
    Io {
        /// The locator being read.
        locator: String,
        /// The underlying I/O error, rendered.
        message: String,
    },
    /// The resource could not be decoded.
    #[error("failed to decode '{locator}': {message}")]
    Decode {
        /// The locator being decoded.
        locator: String,
        /// Details from the decoder.
        message: String,
    },
    /// The request was cancelled before it completed.
    #[error("the load was cancelled")]
    Cancelled,
}

impl LoadError {
    /// Builds a [`LoadError::NotFound`].
    pub fn not_found(locator: &Locator) -> Self {
        Self::NotFound {
            locator: locator.to_string(),
        }
    }

    /// Builds an error from an I/O failure.
    ///
    /// `io::ErrorKind::NotFound` is classified as [`LoadError::NotFound`],
    /// everything else as [`LoadError::Io`].
    pub fn io(locator: &Locator, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::not_found(locator),
            _ => Self::Io {
                locator: locator.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Builds a [`LoadError::Decode`].
    pub fn decode(locator: &Locator, message: impl ToString) -> Self {
        Self::Decode {
            locator: locator.to_string(),
            message: message.to_string(),
        }
    }

    /// Returns the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io { .. } => ErrorKind::Io,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Errors raised by the loader itself rather than by a request.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// `start` was called on a loader that is already running.
    #[error("the loader has already been started")]
    AlreadyStarted,
    /// The loader has been stopped and no longer accepts work.
    #[error("the loader has been stopped")]
    Stopped,
    /// `start` was asked for zero workers.
    #[error("a loader needs at least one worker thread")]
    NoWorkers,
    /// A non-blocking submission hit a full bounded queue.
    #[error("the request queue is full")]
    QueueFull,
    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread '{name}'")]
    Spawn {
        /// Name of the thread that could not be spawned.
        name: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// A worker thread panicked outside of the guarded load call.
    #[error("worker thread '{0}' panicked")]
    WorkerPanicked(String),
    /// A request moved between two states that are not adjacent.
    #[error("invalid state transition for request {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// The request concerned.
        id: RequestId,
        /// The state it was in, `None` if it was unknown.
        from: Option<RequestState>,
        /// The state it was asked to enter.
        to: RequestState,
    },
    /// The configuration is not usable.
    #[error("invalid loader configuration: {0}")]
    Config(String),
    /// The loader's metrics could not be registered.
    #[error("failed to register loader metrics: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let locator = Locator::from("missing.png");
        let err = LoadError::io(&locator, &io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "resource 'missing.png' was not found");
    }

    #[test]
    fn other_io_errors_stay_io() {
        let locator = Locator::from("locked.bin");
        let err = LoadError::io(
            &locator,
            &io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "I/O error while reading 'locked.bin': denied");
    }

    #[test]
    fn decode_error_display() {
        let err = LoadError::decode(&Locator::from("a.obj"), "bad header");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.to_string(), "failed to decode 'a.obj': bad header");
        assert_eq!(LoadError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn spawn_error_keeps_its_source() {
        let err = LoaderError::Spawn {
            name: "ferry-loader-0".to_string(),
            source: io::Error::new(io::ErrorKind::Other, "no threads left"),
        };
        assert_eq!(
            err.to_string(),
            "failed to spawn worker thread 'ferry-loader-0'"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn invalid_transition_display() {
        let err = LoaderError::InvalidTransition {
            id: RequestId::from_raw(4),
            from: Some(RequestState::Pending),
            to: RequestState::Finalized,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition for request #4: Some(Pending) -> Finalized"
        );
    }
}
