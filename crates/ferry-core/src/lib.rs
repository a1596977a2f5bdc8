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

//! # Ferry Core
//!
//! Foundational crate containing the request and result types, the error
//! taxonomy, and the interface contracts shared by the loading pipeline.
//!
//! Nothing in this crate spawns a thread. It only describes:
//! - what travels from the owner to the workers ([`LoadRequest`]),
//! - what travels back ([`LoadResult`]),
//! - the lifecycle a request goes through ([`RequestState`]),
//! - the pluggable collaborators ([`Loader`], [`Decoder`], [`Finalize`]),
//! - and the thread-affinity capability guarding the exclusive context
//!   ([`ContextToken`], [`ExclusiveContext`]).

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod loader;
pub mod request;
pub mod result;
pub mod state;

pub use context::{ContextToken, ExclusiveContext};
pub use error::{ErrorKind, LoadError, LoaderError};
pub use loader::{finalize_fn, Decoder, Finalize, FinalizeFn, Loader};
pub use request::{IdAllocator, LoadRequest, Locator, Priority, RequestId};
pub use result::LoadResult;
pub use state::RequestState;
