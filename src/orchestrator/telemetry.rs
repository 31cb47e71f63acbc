//! Telemetry and metrics collection abstraction
//!
//! The orchestrator reports run events and durations to a
//! [`MetricsCollector`]. The CLI plugs in a progress spinner; tests use
//! [`MemoryCollector`].

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::phase::PhaseKind;

/// Run event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// Preflight passed, nothing mutated yet
    RunStarted,
    /// A phase began
    PhaseStarted(PhaseKind),
    /// A phase ended with a passing tree
    PhaseSucceeded(PhaseKind),
    /// A phase ended with a failing tree
    PhaseFailed(PhaseKind),
    /// A phase was not run
    PhaseSkipped(PhaseKind),
    /// One probe finished
    ProbeCompleted,
    /// Cancellation observed between phases
    RunCancelled,
    /// Report written
    RunFinished,
}

/// Metric data point
#[derive(Debug, Clone)]
pub struct MetricData {
    /// Metric name
    pub name: String,
    /// Metric value
    pub value: f64,
    /// Tags for categorization
    pub tags: BTreeMap<String, String>,
    /// Timestamp (if provided)
    pub timestamp: Option<std::time::SystemTime>,
}

impl MetricData {
    /// Create a new metric
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            tags: BTreeMap::new(),
            timestamp: Some(std::time::SystemTime::now()),
        }
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Trait for pluggable metrics collection
pub trait MetricsCollector: Send + Sync {
    /// Collector name
    fn name(&self) -> &str;

    /// Record a run event
    fn record_event(&self, event: RunEvent, detail: &str);

    /// Record a metric value
    fn record_metric(&self, metric: MetricData);

    /// Record a phase duration
    fn record_duration(&self, stage: &str, duration: Duration) {
        let metric = MetricData::new(format!("{}_duration_ms", stage), duration.as_millis() as f64)
            .with_tag("stage", stage);
        self.record_metric(metric);
    }

    /// Record a bundle size
    fn record_size(&self, label: &str, size_bytes: u64) {
        let metric =
            MetricData::new(format!("{}_size_bytes", label), size_bytes as f64).with_tag("label", label);
        self.record_metric(metric);
    }

    /// Flush any buffered metrics
    fn flush(&self) {}
}

/// No-op collector (default)
pub struct NoOpCollector;

impl MetricsCollector for NoOpCollector {
    fn name(&self) -> &str {
        "noop"
    }

    fn record_event(&self, _event: RunEvent, _detail: &str) {}

    fn record_metric(&self, _metric: MetricData) {}
}

/// Forwards everything to the `log` facade
pub struct LogCollector;

impl MetricsCollector for LogCollector {
    fn name(&self) -> &str {
        "log"
    }

    fn record_event(&self, event: RunEvent, detail: &str) {
        if detail.is_empty() {
            log::info!("[event] {:?}", event);
        } else {
            log::info!("[event] {:?}: {}", event, detail);
        }
    }

    fn record_metric(&self, metric: MetricData) {
        log::debug!("[metric] {} = {} {:?}", metric.name, metric.value, metric.tags);
    }
}

/// Event with its detail
type EventRecord = (RunEvent, String);

/// In-memory collector for testing
#[derive(Default, Clone)]
pub struct MemoryCollector {
    events: Arc<Mutex<Vec<EventRecord>>>,
    metrics: Arc<Mutex<Vec<MetricData>>>,
}

impl MemoryCollector {
    /// Create a new memory collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events
    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }

    /// Get all recorded metrics
    pub fn metrics(&self) -> Vec<MetricData> {
        self.metrics.lock().clone()
    }

    /// Whether `event` was recorded
    pub fn saw(&self, event: RunEvent) -> bool {
        self.events.lock().iter().any(|(e, _)| *e == event)
    }

    /// Clear all recorded data
    pub fn clear(&self) {
        self.events.lock().clear();
        self.metrics.lock().clear();
    }
}

impl MetricsCollector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn record_event(&self, event: RunEvent, detail: &str) {
        self.events.lock().push((event, detail.to_string()));
    }

    fn record_metric(&self, metric: MetricData) {
        self.metrics.lock().push(metric);
    }
}
