//! Run reporting
//!
//! The reporter accumulates per-iteration results in insertion order and
//! finishes into a [`RunReport`]: the machine-readable record (serde JSON)
//! that also renders the plain-text summary and answers verdict queries.

use crate::metrics::MetricsSnapshot;
use crate::verdict::{Thresholds, Verdict};
use chaosforge_core::ValidatorOutcome;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    /// Scenario name.
    pub scenario: String,
    /// Zero-based iteration index.
    pub iteration: u64,
    /// Whether the iteration succeeded.
    pub success: bool,
    /// Wall-clock duration of the iteration.
    pub duration: Duration,
    /// Failure description, when the iteration failed.
    pub error: Option<String>,
    /// Machine-readable failure kind, when the iteration failed.
    pub error_kind: Option<String>,
    /// Outcome of every validator, in insertion order.
    pub validator_outcomes: Vec<ValidatorOutcome>,
    /// Panics the executor recovered during this iteration.
    pub panics_recovered: u64,
}

/// Accumulates iteration results during a run.
#[derive(Clone)]
pub struct Reporter {
    run_id: Uuid,
    scenario: String,
    seed: u64,
    started_at: DateTime<Utc>,
    results: Arc<Mutex<Vec<IterationResult>>>,
    aborted: Arc<AtomicBool>,
}

impl Reporter {
    /// Reporter for one run of the named scenario.
    pub fn new(scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.into(),
            seed,
            started_at: Utc::now(),
            results: Arc::new(Mutex::new(Vec::new())),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Append one iteration result.
    pub fn record(&self, result: IterationResult) {
        self.results.lock().push(result);
    }

    /// Mark that fail-fast tripped and later iterations were skipped.
    pub fn mark_aborted(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Number of results recorded so far.
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    /// Whether no result has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    /// Finish the run into its report.
    pub fn finish(self, metrics: MetricsSnapshot, diagnostics: Vec<String>) -> RunReport {
        RunReport {
            run_id: self.run_id,
            scenario: self.scenario,
            seed: self.seed,
            started_at: self.started_at,
            finished_at: Utc::now(),
            aborted_early: self.aborted.load(Ordering::Relaxed),
            iterations: std::mem::take(&mut *self.results.lock()),
            diagnostics,
            metrics,
        }
    }
}

/// The machine report of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Scenario name.
    pub scenario: String,
    /// Seed the run was driven by (generated if none was configured).
    pub seed: u64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Whether fail-fast tripped and skipped later iterations.
    pub aborted_early: bool,
    /// Per-iteration results in execution order.
    pub iterations: Vec<IterationResult>,
    /// Non-fatal problems observed during the run (stop failures,
    /// teardown failures, skipped injectors).
    pub diagnostics: Vec<String>,
    /// Metrics snapshot taken at the end of the run.
    pub metrics: MetricsSnapshot,
}

impl RunReport {
    /// Completed iterations.
    pub fn total(&self) -> u64 {
        self.iterations.len() as u64
    }

    /// Failed iterations.
    pub fn failed(&self) -> u64 {
        self.iterations.iter().filter(|i| !i.success).count() as u64
    }

    /// Successful iterations.
    pub fn succeeded(&self) -> u64 {
        self.total() - self.failed()
    }

    /// Success rate in `[0, 1]`; a run with zero iterations rates 1.0.
    pub fn success_rate(&self) -> f64 {
        if self.iterations.is_empty() {
            1.0
        } else {
            self.succeeded() as f64 / self.total() as f64
        }
    }

    /// Panics recovered across the run.
    pub fn panics_recovered(&self) -> u64 {
        self.iterations.iter().map(|i| i.panics_recovered).sum()
    }

    /// Compute the verdict under the given thresholds.
    pub fn verdict(&self, thresholds: &Thresholds) -> Verdict {
        thresholds.evaluate(self)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a report back from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Human-readable summary with the per-iteration rollup and verdict.
    pub fn text_summary(&self, thresholds: &Thresholds) -> String {
        let verdict = self.verdict(thresholds);
        let mut out = String::new();
        let _ = writeln!(out, "scenario '{}' (run {})", self.scenario, self.run_id);
        let _ = writeln!(out, "  seed:       0x{:X}", self.seed);
        let _ = writeln!(
            out,
            "  iterations: {} total, {} succeeded, {} failed{}",
            self.total(),
            self.succeeded(),
            self.failed(),
            if self.aborted_early {
                " (aborted early)"
            } else {
                ""
            }
        );
        let _ = writeln!(
            out,
            "  duration:   mean {:.1}ms, median {:.1}ms",
            self.metrics.mean_duration_ms, self.metrics.median_duration_ms
        );
        if self.panics_recovered() > 0 {
            let _ = writeln!(out, "  panics recovered: {}", self.panics_recovered());
        }

        let mut failing: Vec<(&String, &u64)> = self
            .metrics
            .validator_failures
            .iter()
            .filter(|(_, count)| **count > 0)
            .collect();
        failing.sort();
        if !failing.is_empty() {
            let _ = writeln!(out, "  failing validators:");
            for (name, count) in failing {
                let runs = self.metrics.validator_runs.get(name).copied().unwrap_or(0);
                let _ = writeln!(out, "    {name}: {count}/{runs} iterations");
            }
        }
        for diagnostic in &self.diagnostics {
            let _ = writeln!(out, "  note: {diagnostic}");
        }
        let _ = writeln!(
            out,
            "  verdict:    {} (exit {})",
            verdict.as_str(),
            verdict.exit_code()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(index: u64, success: bool) -> IterationResult {
        IterationResult {
            scenario: "report-test".to_string(),
            iteration: index,
            success,
            duration: Duration::from_millis(12),
            error: (!success).then(|| "step 'x' failed: boom".to_string()),
            error_kind: (!success).then(|| "step-failed".to_string()),
            validator_outcomes: Vec::new(),
            panics_recovered: 0,
        }
    }

    #[test]
    fn accumulates_in_insertion_order() {
        let reporter = Reporter::new("report-test", 7);
        reporter.record(sample_result(0, true));
        reporter.record(sample_result(1, false));
        reporter.record(sample_result(2, true));

        let report = reporter.finish(MetricsSnapshot::default(), Vec::new());
        assert_eq!(report.total(), 3);
        assert_eq!(report.failed(), 1);
        let indices: Vec<u64> = report.iterations.iter().map(|i| i.iteration).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!((report.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_run_rates_perfect() {
        let report = Reporter::new("report-test", 7).finish(MetricsSnapshot::default(), Vec::new());
        assert_eq!(report.success_rate(), 1.0);
    }

    #[test]
    fn json_roundtrip_preserves_verdict_and_counts() {
        let reporter = Reporter::new("report-test", 7);
        for i in 0..10 {
            reporter.record(sample_result(i, i != 3));
        }
        let report = reporter.finish(MetricsSnapshot::default(), Vec::new());
        let thresholds = Thresholds::default();

        let json = report.to_json().expect("serialize");
        let back = RunReport::from_json(&json).expect("deserialize");
        assert_eq!(back.total(), report.total());
        assert_eq!(back.failed(), report.failed());
        assert_eq!(back.verdict(&thresholds), report.verdict(&thresholds));
        assert_eq!(back.run_id, report.run_id);
    }

    #[test]
    fn text_summary_names_the_verdict() {
        let reporter = Reporter::new("report-test", 0xC0FFEE);
        reporter.record(sample_result(0, true));
        let report = reporter.finish(MetricsSnapshot::default(), Vec::new());
        let text = report.text_summary(&Thresholds::default());
        assert!(text.contains("report-test"));
        assert!(text.contains("verdict:    pass (exit 0)"));
    }
}
