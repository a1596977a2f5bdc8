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

//! Metric identifiers, values and errors.

use std::fmt;
use std::time::Instant;

/// Identifies a metric by namespace, name and optional labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricId {
    /// The broad category, e.g. `"loader"`.
    pub namespace: String,
    /// The metric name, e.g. `"load_time"`.
    pub name: String,
    /// Dimensional labels, kept sorted by key.
    pub labels: Vec<(String, String)>,
}

impl MetricId {
    /// Creates an id without labels.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: Vec::new(),
        }
    }

    /// Adds a label. Labels are re-sorted so equal sets hash equally.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self.labels.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "[{labels}]")?;
        }
        Ok(())
    }
}

/// The kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Monotonically increasing count.
    Counter,
    /// Value that goes up and down.
    Gauge,
    /// Distribution of observations over fixed buckets.
    Histogram,
}

/// The current value of a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Counter value.
    Counter(u64),
    /// Gauge value.
    Gauge(f64),
    /// Histogram summary. Samples themselves are not retained.
    Histogram {
        /// Number of observations.
        count: u64,
        /// Sum of all observations.
        sum: f64,
        /// Inclusive upper bounds of the buckets, ascending.
        bucket_bounds: Vec<f64>,
        /// Observations per bucket; one extra trailing slot counts overflow.
        bucket_counts: Vec<u64>,
    },
}

impl MetricValue {
    /// Returns the [`MetricType`] of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// The value as a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }

    /// Mean of a histogram, `None` for other kinds or an empty histogram.
    pub fn histogram_mean(&self) -> Option<f64> {
        match self {
            MetricValue::Histogram { count, sum, .. } if *count > 0 => Some(sum / *count as f64),
            _ => None,
        }
    }
}

/// A registered metric: its value plus descriptive metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Identifier.
    pub id: MetricId,
    /// Human-readable description.
    pub description: String,
    /// Unit of measurement.
    pub unit: String,
    /// Current value.
    pub value: MetricValue,
    /// Last time the value changed.
    pub last_updated: Instant,
}

impl Metric {
    /// A counter starting at zero.
    pub fn new_counter(id: MetricId, description: impl Into<String>) -> Self {
        Self::new(id, description, "count", MetricValue::Counter(0))
    }

    /// A gauge starting at zero.
    pub fn new_gauge(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self::new(id, description, unit, MetricValue::Gauge(0.0))
    }

    /// An empty histogram over `bucket_bounds` (sorted on construction).
    pub fn new_histogram(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        mut bucket_bounds: Vec<f64>,
    ) -> Self {
        bucket_bounds.sort_by(|a, b| a.total_cmp(b));
        let bucket_counts = vec![0; bucket_bounds.len() + 1];
        Self::new(
            id,
            description,
            unit,
            MetricValue::Histogram {
                count: 0,
                sum: 0.0,
                bucket_bounds,
                bucket_counts,
            },
        )
    }

    fn new(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            unit: unit.into(),
            value,
            last_updated: Instant::now(),
        }
    }
}

/// Result alias for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors of the metrics system.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    /// No metric is registered under that id.
    #[error("metric not found: {0}")]
    MetricNotFound(MetricId),
    /// A metric is already registered under that id.
    #[error("metric already registered: {0}")]
    AlreadyRegistered(MetricId),
    /// The operation does not apply to the metric's type.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// The type the operation needs.
        expected: MetricType,
        /// The type actually registered.
        found: MetricType,
    },
    /// The storage backend failed.
    #[error("storage error: {0}")]
    StorageError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_sorted_and_displayed() {
        let id = MetricId::new("loader", "load_time")
            .with_label("worker", "2")
            .with_label("kind", "texture");
        assert_eq!(id.labels[0].0, "kind");
        assert_eq!(id.to_string(), "loader:load_time[kind=texture,worker=2]");
        assert_eq!(MetricId::new("loader", "queue_depth").to_string(), "loader:queue_depth");
    }

    #[test]
    fn histogram_starts_empty_with_overflow_bucket() {
        let metric = Metric::new_histogram(MetricId::new("t", "h"), "h", "ms", vec![10.0, 1.0]);
        match &metric.value {
            MetricValue::Histogram {
                count,
                bucket_bounds,
                bucket_counts,
                ..
            } => {
                assert_eq!(*count, 0);
                assert_eq!(bucket_bounds, &vec![1.0, 10.0]);
                assert_eq!(bucket_counts.len(), 3);
            }
            other => panic!("unexpected value {other:?}"),
        }
        assert_eq!(metric.value.histogram_mean(), None);
    }
}
