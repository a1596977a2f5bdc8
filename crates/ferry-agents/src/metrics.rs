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

//! Metrics a loader reports.

use ferry_telemetry::{
    CounterHandle, GaugeHandle, HistogramHandle, MetricId, MetricsRegistry, MetricsResult,
};

/// Namespace every loader metric is registered under.
pub const LOADER_NAMESPACE: &str = "loader";

/// Label key naming the loader a metric belongs to.
pub const INSTANCE_LABEL: &str = "instance";

/// Metric handles of one loader.
///
/// Counters are updated on the owning thread when an outcome is observed;
/// only `load_time` is written from workers.
#[derive(Debug, Clone)]
pub struct LoaderMetrics {
    /// Requests accepted by the queue.
    pub submitted_total: CounterHandle,
    /// Successful loads delivered to the owner.
    pub completed_total: CounterHandle,
    /// Failed loads delivered to the owner.
    pub failed_total: CounterHandle,
    /// Results the owner finalized.
    pub finalized_total: CounterHandle,
    /// Requests and results dropped by shutdown.
    pub discarded_total: CounterHandle,
    /// Time spent in the load function, in milliseconds.
    pub load_time: HistogramHandle,
    /// Requests waiting in the queue, sampled on the owning thread.
    pub queue_depth: GaugeHandle,
}

impl LoaderMetrics {
    /// Registers the metrics of the loader called `instance` on `registry`.
    ///
    /// Every id carries an `instance` label, so loaders sharing a registry
    /// keep separate series. Registering the same instance twice fails and
    /// leaves the live metrics untouched.
    pub fn register(registry: &MetricsRegistry, instance: &str) -> MetricsResult<Self> {
        let id = |name: &str| Self::metric_id(instance, name);
        Ok(Self {
            submitted_total: registry.register_counter_with_id(
                id("submitted_total"),
                "Requests accepted by the loader queue",
            )?,
            completed_total: registry.register_counter_with_id(
                id("completed_total"),
                "Successful loads delivered to the owner",
            )?,
            failed_total: registry.register_counter_with_id(
                id("failed_total"),
                "Failed loads delivered to the owner",
            )?,
            finalized_total: registry
                .register_counter_with_id(id("finalized_total"), "Results consumed by the owner")?,
            discarded_total: registry.register_counter_with_id(
                id("discarded_total"),
                "Requests and results dropped at shutdown",
            )?,
            load_time: registry.register_histogram_with_id(
                id("load_time"),
                "Time spent in the load function",
                "ms",
                vec![1.0, 5.0, 16.0, 33.0, 100.0, 500.0],
            )?,
            queue_depth: registry.register_gauge_with_id(
                id("queue_depth"),
                "Requests waiting for a worker",
                "requests",
            )?,
        })
    }

    /// Id of the metric `name` of the loader called `instance`.
    pub fn metric_id(instance: &str, name: &str) -> MetricId {
        MetricId::new(LOADER_NAMESPACE, name).with_label(INSTANCE_LABEL, instance)
    }

    pub(crate) fn count(counter: &CounterHandle, amount: usize) {
        if amount == 0 {
            return;
        }
        if let Err(e) = counter.increment_by(amount as u64) {
            log::warn!("Failed to update metric {}: {:?}", counter.id(), e);
        }
    }

    pub(crate) fn sample_queue_depth(&self, depth: usize) {
        if let Err(e) = self.queue_depth.set(depth as f64) {
            log::warn!("Failed to update metric {}: {:?}", self.queue_depth.id(), e);
        }
    }
}
