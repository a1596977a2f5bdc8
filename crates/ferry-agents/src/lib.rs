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

//! # Ferry Agents
//!
//! The control plane of the loader. Agents sit on the owning thread and
//! drive the lanes: they start and stop workers, hand requests to the queue,
//! keep track of every request's state and finalize results against the
//! exclusive context.

#![warn(missing_docs)]

pub mod config;
pub mod loader;
pub mod metrics;
pub mod owner;
pub mod tracker;

pub use config::LoaderConfig;
pub use loader::{AsyncLoader, LoaderPhase, ShutdownReport, Submitter};
pub use metrics::{LoaderMetrics, INSTANCE_LABEL, LOADER_NAMESPACE};
pub use owner::{ContextOwner, Finalized};
pub use tracker::RequestTracker;
