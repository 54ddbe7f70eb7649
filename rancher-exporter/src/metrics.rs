//! Prometheus metrics describing the exporter itself.
//!
//! These live in a process-wide registry and are appended to every
//! `/metrics` response after the resource gauges:
//! - Function call counts and durations (metadata fetches, scrape cycles)
//! - Scrape outcomes
//! - Build info

use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

lazy_static! {
    /// Global registry for the exporter's own metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Calls of instrumented functions.
    pub static ref FUNCTION_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("rancher_exporter_function_calls_total", "Total calls of instrumented exporter functions"),
        &["pkg", "fnc"]
    ).expect("Failed to create FUNCTION_CALLS_TOTAL metric");

    /// Duration of instrumented functions in seconds.
    pub static ref FUNCTION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("rancher_exporter_function_duration_seconds", "Duration of instrumented exporter functions in seconds")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["pkg", "fnc"]
    ).expect("Failed to create FUNCTION_DURATION metric");

    /// Completed scrape cycles by result (success, failure).
    pub static ref SCRAPES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("rancher_exporter_scrapes_total", "Completed scrape cycles by result"),
        &["result"]
    ).expect("Failed to create SCRAPES_TOTAL metric");

    /// Exporter version info (always 1, with version label).
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("rancher_exporter_build_info", "Exporter version info (always 1)"),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

/// Register all self-metrics with the global registry.
///
/// Should be called once at startup. Collectors that are already
/// registered are left as they are.
pub fn register_metrics() -> Result<()> {
    let collectors: [Box<dyn Collector>; 4] = [
        Box::new(FUNCTION_CALLS_TOTAL.clone()),
        Box::new(FUNCTION_DURATION.clone()),
        Box::new(SCRAPES_TOTAL.clone()),
        Box::new(BUILD_INFO.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Snapshot of the self-metrics for exposition.
pub fn gather() -> Vec<MetricFamily> {
    REGISTRY.gather()
}

/// Record a call of an instrumented function.
pub fn inc_function_call(pkg: &str, fnc: &str) {
    FUNCTION_CALLS_TOTAL.with_label_values(&[pkg, fnc]).inc();
}

/// Record how long an instrumented function took.
pub fn observe_function_duration(pkg: &str, fnc: &str, duration_secs: f64) {
    FUNCTION_DURATION
        .with_label_values(&[pkg, fnc])
        .observe(duration_secs);
}

/// Record the outcome of a scrape cycle.
pub fn inc_scrape(success: bool) {
    let result = if success { "success" } else { "failure" };
    SCRAPES_TOTAL.with_label_values(&[result]).inc();
}

/// Set build info (call once at startup).
pub fn set_build_info(version: &str) {
    BUILD_INFO.with_label_values(&[version]).set(1.0);
}
