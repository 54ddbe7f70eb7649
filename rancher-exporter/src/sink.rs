//! Metric sink: where reconciled samples end up.
//!
//! The orchestrator only talks to [`MetricSink`]; [`PrometheusSink`] backs
//! it with a private `prometheus::Registry` so the resource gauges are
//! owned by one exporter instance instead of living in global state.

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Gauge families exported for Rancher resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    ServiceScale,
    ServiceState,
    ServiceHealth,
    StackState,
    StackHealth,
    HostState,
    HostAgentState,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::ServiceScale,
        Metric::ServiceState,
        Metric::ServiceHealth,
        Metric::StackState,
        Metric::StackHealth,
        Metric::HostState,
        Metric::HostAgentState,
    ];

    /// Fully-qualified metric name.
    pub fn name(self) -> &'static str {
        match self {
            Metric::ServiceScale => "rancher_service_scale",
            Metric::ServiceState => "rancher_service_state",
            Metric::ServiceHealth => "rancher_service_health_status",
            Metric::StackState => "rancher_stack_state",
            Metric::StackHealth => "rancher_stack_health_status",
            Metric::HostState => "rancher_host_state",
            Metric::HostAgentState => "rancher_host_agent_state",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Metric::ServiceScale => "Scale of the service as reported by the Rancher API",
            Metric::ServiceState => "State of the service as reported by the Rancher API (1 for the current state)",
            Metric::ServiceHealth => "HealthState of the service as reported by the Rancher API (1 for the current health state)",
            Metric::StackState => "State of the stack as reported by the Rancher API (1 for the current state)",
            Metric::StackHealth => "HealthState of the stack as reported by the Rancher API (1 for the current health state)",
            Metric::HostState => "State of the host as reported by the Rancher API (1 for the current state)",
            Metric::HostAgentState => "State of the host agent as reported by the Rancher API (1 for the current state)",
        }
    }

    /// Label names, in the order sample label values are given.
    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            Metric::ServiceScale => &["name", "stack_name"],
            Metric::ServiceState => &["name", "stack_name", "state"],
            Metric::ServiceHealth => &["name", "stack_name", "health_state"],
            Metric::StackState => &["name", "state", "system"],
            Metric::StackHealth => &["name", "health_state", "system"],
            Metric::HostState | Metric::HostAgentState => &["name", "state"],
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One gauge value for one label set.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Metric,
    /// Label values, ordered as [`Metric::label_names`].
    pub labels: Vec<String>,
    pub value: f64,
}

impl Sample {
    pub fn new(metric: Metric, labels: Vec<String>, value: f64) -> Self {
        Self {
            metric,
            labels,
            value,
        }
    }

    /// Value of a label by name.
    #[cfg(test)]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric
            .label_names()
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

/// Errors raised while publishing or encoding samples.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{metric} expects {expected} label values, got {actual}")]
    LabelMismatch {
        metric: Metric,
        expected: usize,
        actual: usize,
    },

    #[error("metric has no gauge registered: {0}")]
    UnknownMetric(Metric),

    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Destination for reconciled samples.
pub trait MetricSink: Send {
    /// Drop every previously published value.
    fn reset(&mut self);

    /// Publish one gauge value.
    fn publish(&mut self, sample: &Sample) -> Result<(), SinkError>;

    /// Names of every metric this sink can publish. Logged at startup so
    /// operators can see which families the exporter serves.
    fn describe(&self) -> Vec<&'static str>;

    /// Current values, ready for exposition.
    fn gather(&self) -> Vec<MetricFamily>;

    /// Publish a whole value set. Samples that fail are logged and skipped;
    /// returns how many were published.
    fn publish_all(&mut self, samples: &[Sample]) -> usize {
        let mut published = 0;
        for sample in samples {
            match self.publish(sample) {
                Ok(()) => published += 1,
                Err(e) => warn!(metric = %sample.metric, labels = ?sample.labels, "Failed to publish sample: {}", e),
            }
        }
        published
    }
}

/// [`MetricSink`] backed by a private Prometheus registry.
pub struct PrometheusSink {
    registry: Registry,
    gauges: HashMap<Metric, GaugeVec>,
}

impl PrometheusSink {
    /// Create and register one gauge family per [`Metric`].
    pub fn new() -> Result<Self, SinkError> {
        let registry = Registry::new();
        let mut gauges = HashMap::new();

        for metric in Metric::ALL {
            let gauge = GaugeVec::new(
                Opts::new(metric.name(), metric.help()),
                metric.label_names(),
            )?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(metric, gauge);
        }

        Ok(Self { registry, gauges })
    }

    /// Current value of one series, if it has been published.
    #[cfg(test)]
    pub fn value(&self, metric: Metric, labels: &[&str]) -> Option<f64> {
        let names = metric.label_names();
        if names.len() != labels.len() {
            return None;
        }

        let family = self
            .registry
            .gather()
            .into_iter()
            .find(|f| f.get_name() == metric.name())?;

        family
            .get_metric()
            .iter()
            .find(|m| {
                names.iter().zip(labels).all(|(name, value)| {
                    m.get_label()
                        .iter()
                        .any(|pair| pair.get_name() == *name && pair.get_value() == *value)
                })
            })
            .map(|m| m.get_gauge().get_value())
    }

    /// Number of series currently published for a metric.
    #[cfg(test)]
    pub fn series_count(&self, metric: Metric) -> usize {
        self.registry
            .gather()
            .iter()
            .find(|f| f.get_name() == metric.name())
            .map(|f| f.get_metric().len())
            .unwrap_or(0)
    }
}

impl MetricSink for PrometheusSink {
    fn reset(&mut self) {
        for gauge in self.gauges.values() {
            gauge.reset();
        }
    }

    fn publish(&mut self, sample: &Sample) -> Result<(), SinkError> {
        let expected = sample.metric.label_names().len();
        if sample.labels.len() != expected {
            return Err(SinkError::LabelMismatch {
                metric: sample.metric,
                expected,
                actual: sample.labels.len(),
            });
        }

        let gauge = self
            .gauges
            .get(&sample.metric)
            .ok_or(SinkError::UnknownMetric(sample.metric))?;
        let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
        gauge.get_metric_with_label_values(&values)?.set(sample.value);
        Ok(())
    }

    fn describe(&self) -> Vec<&'static str> {
        Metric::ALL.iter().map(|m| m.name()).collect()
    }

    fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

/// Encode metric families in the Prometheus text exposition format.
pub fn encode_text(families: &[MetricFamily]) -> Result<String, SinkError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_publish_and_read_back() {
        let mut sink = PrometheusSink::new().unwrap();
        sink.publish(&Sample::new(
            Metric::ServiceScale,
            labels(&["web", "core"]),
            3.0,
        ))
        .unwrap();

        assert_eq!(sink.value(Metric::ServiceScale, &["web", "core"]), Some(3.0));
        assert_eq!(sink.value(Metric::ServiceScale, &["web", "other"]), None);
        assert_eq!(sink.series_count(Metric::ServiceScale), 1);
    }

    #[test]
    fn test_publish_rejects_wrong_label_count() {
        let mut sink = PrometheusSink::new().unwrap();
        let err = sink
            .publish(&Sample::new(Metric::HostState, labels(&["node1"]), 1.0))
            .unwrap_err();

        assert!(matches!(
            err,
            SinkError::LabelMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_publish_all_skips_bad_samples() {
        let mut sink = PrometheusSink::new().unwrap();
        let samples = vec![
            Sample::new(Metric::HostState, labels(&["node1", "active"]), 1.0),
            Sample::new(Metric::HostState, labels(&["node1"]), 1.0),
            Sample::new(Metric::HostState, labels(&["node1", "inactive"]), 0.0),
        ];

        assert_eq!(sink.publish_all(&samples), 2);
        assert_eq!(sink.series_count(Metric::HostState), 2);
    }

    #[test]
    fn test_reset_clears_series() {
        let mut sink = PrometheusSink::new().unwrap();
        sink.publish(&Sample::new(
            Metric::StackState,
            labels(&["core", "active", "false"]),
            1.0,
        ))
        .unwrap();
        sink.reset();

        assert_eq!(sink.series_count(Metric::StackState), 0);
        assert_eq!(sink.value(Metric::StackState, &["core", "active", "false"]), None);
    }

    #[test]
    fn test_describe_lists_every_metric() {
        let sink = PrometheusSink::new().unwrap();
        let names = sink.describe();
        assert_eq!(names.len(), Metric::ALL.len());
        assert!(names.contains(&"rancher_service_state"));
        assert!(names.contains(&"rancher_host_agent_state"));
    }

    #[test]
    fn test_encode_text() {
        let mut sink = PrometheusSink::new().unwrap();
        sink.publish(&Sample::new(
            Metric::HostState,
            labels(&["node1", "active"]),
            1.0,
        ))
        .unwrap();

        let output = encode_text(&sink.gather()).unwrap();
        assert!(output.contains("# HELP rancher_host_state"));
        assert!(output.contains("# TYPE rancher_host_state gauge"));
        assert!(output.contains("rancher_host_state{name=\"node1\",state=\"active\"} 1"));
    }

    #[test]
    fn test_sample_label_lookup() {
        let sample = Sample::new(
            Metric::ServiceState,
            labels(&["web", "core", "active"]),
            1.0,
        );
        assert_eq!(sample.label("stack_name"), Some("core"));
        assert_eq!(sample.label("state"), Some("active"));
        assert_eq!(sample.label("system"), None);
    }
}
