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

//! Storage backends for metrics.

use crate::metrics::{Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Interface of a metrics store.
///
/// Handles update metrics concurrently from worker threads, so every
/// read-modify-write goes through [`MetricsBackend::update_metric`], which
/// implementations must run atomically.
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Stores or replaces a metric.
    fn put_metric(&self, metric: Metric) -> MetricsResult<()>;

    /// Stores a metric whose id is not taken yet. Never replaces a live metric.
    fn insert_metric(&self, metric: Metric) -> MetricsResult<()>;

    /// Returns a snapshot of a metric.
    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric>;

    /// Applies `update` to the stored value of `id` atomically.
    fn update_metric(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut MetricValue) -> MetricsResult<()>,
    ) -> MetricsResult<()>;

    /// Whether `id` is registered.
    fn contains_metric(&self, id: &MetricId) -> bool;

    /// Snapshot of every metric.
    fn list_all_metrics(&self) -> Vec<Metric>;

    /// Number of registered metrics.
    fn metric_count(&self) -> usize;

    /// Adds `delta` to a counter and returns the new value.
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        let mut result = 0;
        self.update_metric(id, &mut |value| match value {
            MetricValue::Counter(v) => {
                *v = v.saturating_add(delta);
                result = *v;
                Ok(())
            }
            other => Err(mismatch(MetricType::Counter, other)),
        })?;
        Ok(result)
    }

    /// Sets a gauge.
    fn set_gauge(&self, id: &MetricId, new_value: f64) -> MetricsResult<()> {
        self.update_metric(id, &mut |value| match value {
            MetricValue::Gauge(v) => {
                *v = new_value;
                Ok(())
            }
            other => Err(mismatch(MetricType::Gauge, other)),
        })
    }

    /// Adds `delta` to a gauge and returns the new value.
    fn add_gauge(&self, id: &MetricId, delta: f64) -> MetricsResult<f64> {
        let mut result = 0.0;
        self.update_metric(id, &mut |value| match value {
            MetricValue::Gauge(v) => {
                *v += delta;
                result = *v;
                Ok(())
            }
            other => Err(mismatch(MetricType::Gauge, other)),
        })?;
        Ok(result)
    }

    /// Records one histogram observation.
    fn observe_histogram(&self, id: &MetricId, sample: f64) -> MetricsResult<()> {
        self.update_metric(id, &mut |value| match value {
            MetricValue::Histogram {
                count,
                sum,
                bucket_bounds,
                bucket_counts,
            } => {
                *count += 1;
                *sum += sample;
                let slot = bucket_bounds
                    .iter()
                    .position(|&bound| sample <= bound)
                    .unwrap_or(bucket_bounds.len());
                bucket_counts[slot] += 1;
                Ok(())
            }
            other => Err(mismatch(MetricType::Histogram, other)),
        })
    }
}

fn mismatch(expected: MetricType, found: &MetricValue) -> MetricsError {
    MetricsError::TypeMismatch {
        expected,
        found: found.metric_type(),
    }
}

/// In-memory backend: a `HashMap` behind a `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<HashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every metric of `namespace`.
    pub fn metrics_in_namespace(&self, namespace: &str) -> Vec<Metric> {
        self.read()
            .values()
            .filter(|metric| metric.id.namespace == namespace)
            .cloned()
            .collect()
    }

    // Poisoning only means a panic happened while the lock was held; every
    // update leaves the map consistent, so the data is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<MetricId, Metric>> {
        self.storage
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MetricId, Metric>> {
        self.storage
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl MetricsBackend for InMemoryBackend {
    fn put_metric(&self, metric: Metric) -> MetricsResult<()> {
        self.write().insert(metric.id.clone(), metric);
        Ok(())
    }

    fn insert_metric(&self, metric: Metric) -> MetricsResult<()> {
        match self.write().entry(metric.id.clone()) {
            Entry::Occupied(_) => Err(MetricsError::AlreadyRegistered(metric.id)),
            Entry::Vacant(slot) => {
                slot.insert(metric);
                Ok(())
            }
        }
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
    }

    fn update_metric(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut MetricValue) -> MetricsResult<()>,
    ) -> MetricsResult<()> {
        let mut storage = self.write();
        let metric = storage
            .get_mut(id)
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))?;
        update(&mut metric.value)?;
        metric.last_updated = Instant::now();
        Ok(())
    }

    fn contains_metric(&self, id: &MetricId) -> bool {
        self.read().contains_key(id)
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        self.read().values().cloned().collect()
    }

    fn metric_count(&self) -> usize {
        self.read().len()
    }
}
