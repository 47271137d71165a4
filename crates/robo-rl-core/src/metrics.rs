//! Write-only scalar time series for training diagnostics
//!
//! Sinks are best effort: recording never fails and never feeds back into
//! control decisions.

use crate::RewardBreakdown;

/// Destination for named scalar series keyed by tick or episode index
pub trait MetricsSink: Send + Sync {
    /// Record one value of the series `name` at `step`
    fn record(&self, name: &str, value: f64, step: u64);

    /// Record every component of a breakdown as `<group>.<component>`, plus
    /// `<group>.total`
    fn record_breakdown(&self, group: &str, breakdown: &RewardBreakdown, step: u64) {
        for (component, value) in breakdown.iter() {
            self.record(&format!("{group}.{component}"), value, step);
        }
        self.record(&format!("{group}.total"), breakdown.total().0, step);
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record(&self, _name: &str, _value: f64, _step: u64) {}
}

/// Emits each value as a `debug` event under the `rl_metrics` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, name: &str, value: f64, step: u64) {
        tracing::debug!(target: "rl_metrics", metric = name, value, step);
    }
}

/// Forwards values to the `metrics` facade as gauges
///
/// Whatever recorder the host process installed (Prometheus, statsd, ...)
/// receives them; with no recorder installed the calls are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFacadeSink;

impl MetricsSink for MetricsFacadeSink {
    fn record(&self, name: &str, value: f64, _step: u64) {
        ::metrics::gauge!(name.to_string(), value);
    }
}
