//! In-memory run metrics
//!
//! Counts iterations, durations, and per-validator tallies as results
//! arrive, and absorbs per-injector and per-validator metric snapshots at
//! stop time. Append-only under a mutex; the snapshot is a plain serde
//! record embedded in the run report.

use crate::report::IterationResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Metrics snapshot of one injector, tagged with its scope label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InjectorMetrics {
    /// Scope label the injector was registered under, if any.
    pub scope: Option<String>,
    /// Values reported by the injector's metrics capability.
    pub values: HashMap<String, Value>,
}

/// Immutable snapshot of the collector, embedded in the run report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Iterations recorded.
    pub iterations_total: u64,
    /// Iterations recorded as failed.
    pub iterations_failed: u64,
    /// Panics the executor recovered across the run.
    pub panics_recovered: u64,
    /// Mean iteration duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Median iteration duration in milliseconds.
    pub median_duration_ms: f64,
    /// Evaluations per validator.
    pub validator_runs: HashMap<String, u64>,
    /// Failed evaluations per validator.
    pub validator_failures: HashMap<String, u64>,
    /// Final metrics per injector.
    pub injectors: HashMap<String, InjectorMetrics>,
    /// Final metrics per validator.
    pub validators: HashMap<String, HashMap<String, Value>>,
}

#[derive(Default)]
struct CollectorInner {
    iterations_total: u64,
    iterations_failed: u64,
    panics_recovered: u64,
    durations: Vec<Duration>,
    validator_runs: HashMap<String, u64>,
    validator_failures: HashMap<String, u64>,
    injectors: HashMap<String, InjectorMetrics>,
    validators: HashMap<String, HashMap<String, Value>>,
}

/// Run-global metrics collector.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<CollectorInner>>,
}

impl MetricsCollector {
    /// Fresh collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one iteration result into the tallies.
    pub fn record_iteration(&self, result: &IterationResult) {
        let mut inner = self.inner.lock();
        inner.iterations_total += 1;
        if !result.success {
            inner.iterations_failed += 1;
        }
        inner.panics_recovered += result.panics_recovered;
        inner.durations.push(result.duration);
        for outcome in &result.validator_outcomes {
            *inner.validator_runs.entry(outcome.name.clone()).or_default() += 1;
            if !outcome.passed {
                *inner
                    .validator_failures
                    .entry(outcome.name.clone())
                    .or_default() += 1;
            }
        }
    }

    /// Absorb an injector's final metrics.
    pub fn record_injector(
        &self,
        name: &str,
        scope: Option<&str>,
        values: HashMap<String, Value>,
    ) {
        self.inner.lock().injectors.insert(
            name.to_string(),
            InjectorMetrics {
                scope: scope.map(str::to_string),
                values,
            },
        );
    }

    /// Absorb a validator's final metrics.
    pub fn record_validator(&self, name: &str, values: HashMap<String, Value>) {
        self.inner.lock().validators.insert(name.to_string(), values);
    }

    /// Immutable snapshot of everything recorded so far.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            iterations_total: inner.iterations_total,
            iterations_failed: inner.iterations_failed,
            panics_recovered: inner.panics_recovered,
            mean_duration_ms: mean_ms(&inner.durations),
            median_duration_ms: median_ms(&inner.durations),
            validator_runs: inner.validator_runs.clone(),
            validator_failures: inner.validator_failures.clone(),
            injectors: inner.injectors.clone(),
            validators: inner.validators.clone(),
        }
    }
}

fn mean_ms(durations: &[Duration]) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    let total: f64 = durations.iter().map(|d| d.as_secs_f64() * 1_000.0).sum();
    total / durations.len() as f64
}

fn median_ms(durations: &[Duration]) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    let mut millis: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1_000.0).collect();
    millis.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = millis.len() / 2;
    if millis.len() % 2 == 0 {
        (millis[mid - 1] + millis[mid]) / 2.0
    } else {
        millis[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosforge_core::{Severity, ValidatorOutcome};

    fn result(success: bool, duration_ms: u64, outcomes: Vec<ValidatorOutcome>) -> IterationResult {
        IterationResult {
            scenario: "metrics-test".to_string(),
            iteration: 0,
            success,
            duration: Duration::from_millis(duration_ms),
            error: None,
            error_kind: None,
            validator_outcomes: outcomes,
            panics_recovered: 0,
        }
    }

    #[test]
    fn tallies_iterations_and_validators() {
        let collector = MetricsCollector::new();
        collector.record_iteration(&result(
            true,
            10,
            vec![ValidatorOutcome::passed("checks", Severity::Critical)],
        ));
        collector.record_iteration(&result(
            false,
            30,
            vec![ValidatorOutcome::failed(
                "checks",
                Severity::Critical,
                "broken",
            )],
        ));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.iterations_total, 2);
        assert_eq!(snapshot.iterations_failed, 1);
        assert_eq!(snapshot.validator_runs["checks"], 2);
        assert_eq!(snapshot.validator_failures["checks"], 1);
        assert!((snapshot.mean_duration_ms - 20.0).abs() < 0.5);
        assert!((snapshot.median_duration_ms - 20.0).abs() < 0.5);
    }

    #[test]
    fn median_of_odd_sample_counts() {
        let collector = MetricsCollector::new();
        for ms in [10, 100, 40] {
            collector.record_iteration(&result(true, ms, Vec::new()));
        }
        let snapshot = collector.snapshot();
        assert!((snapshot.median_duration_ms - 40.0).abs() < 0.5);
    }

    #[test]
    fn empty_collector_snapshots_cleanly() {
        let snapshot = MetricsCollector::new().snapshot();
        assert_eq!(snapshot.iterations_total, 0);
        assert_eq!(snapshot.mean_duration_ms, 0.0);
    }

    #[test]
    fn injector_metrics_keep_their_scope() {
        let collector = MetricsCollector::new();
        collector.record_injector(
            "latency",
            Some("network"),
            HashMap::from([("delays_applied".to_string(), 4u64.into())]),
        );
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.injectors["latency"].scope.as_deref(), Some("network"));
        assert_eq!(
            snapshot.injectors["latency"].values["delays_applied"],
            Value::from(4u64)
        );
    }
}
