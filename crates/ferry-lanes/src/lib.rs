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

//! # Ferry Lanes
//!
//! The data plane of the loader: everything that runs on, or is shared with,
//! worker threads.
//!
//! - [`queue`]: the blocking request queue with a close signal.
//! - [`channel`]: the non-blocking event channel back to the owner.
//! - [`worker`]: the generic thread runner.
//! - [`file_loader`]: a [`Loader`](ferry_core::Loader) reading from disk.

#![warn(missing_docs)]

pub mod channel;
pub mod file_loader;
pub mod queue;
pub mod worker;

pub use channel::{event_channel, EventSender, LoaderEvent, ResultChannel};
pub use file_loader::FileLoader;
pub use queue::{Popped, PushError, QueueOrdering, RequestQueue};
pub use worker::{run_worker, WorkerHandle};
