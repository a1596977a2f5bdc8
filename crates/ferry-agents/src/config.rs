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

//! Loader configuration.

use anyhow::{Context, Result};
use ferry_core::LoaderError;
use ferry_lanes::QueueOrdering;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of an [`AsyncLoader`](crate::AsyncLoader) and the
/// [`ContextOwner`](crate::ContextOwner) driving it.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Number of worker threads spawned by `start`.
    pub worker_count: usize,
    /// Maximum number of queued requests. `None` means unbounded.
    pub queue_capacity: Option<usize>,
    /// Dispatch order of the request queue.
    pub ordering: QueueOrdering,
    /// Name of the loader. Prefixes worker thread names (`<thread_name>-<index>`)
    /// and labels the loader's metrics.
    pub thread_name: String,
    /// Maximum number of results finalized per cycle. `None` means all.
    pub finalize_budget: Option<usize>,
    /// Keep the state history of every in-flight request.
    pub record_history: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            queue_capacity: None,
            ordering: QueueOrdering::Fifo,
            thread_name: "ferry-loader".to_string(),
            finalize_budget: None,
            record_history: false,
        }
    }
}

impl LoaderConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads and validates a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read loader config {:?}", path))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse loader config {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Rejected loader config {:?}", path))?;
        Ok(config)
    }

    /// Serializes the configuration as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Checks that the configuration describes a usable loader.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.worker_count == 0 {
            return Err(LoaderError::Config("worker_count must be at least 1".into()));
        }
        if self.queue_capacity == Some(0) {
            return Err(LoaderError::Config(
                "queue_capacity must be at least 1 when set".into(),
            ));
        }
        if self.finalize_budget == Some(0) {
            return Err(LoaderError::Config(
                "finalize_budget must be at least 1 when set".into(),
            ));
        }
        if self.thread_name.trim().is_empty() {
            return Err(LoaderError::Config("thread_name must not be empty".into()));
        }
        Ok(())
    }

    /// Name of the worker thread at `index`.
    pub fn worker_thread_name(&self, index: usize) -> String {
        format!("{}-{}", self.thread_name, index)
    }
}
