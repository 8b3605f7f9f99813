//! Thresholds and verdict computation

use crate::report::RunReport;
use chaosforge_core::Severity;
use serde::{Deserialize, Serialize};

/// Final judgment of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Every threshold held.
    Pass,
    /// The run completed but showed warnings, informational failures, or
    /// recovered panics.
    Unstable,
    /// A critical failure, or the success thresholds were missed.
    Fail,
}

impl Verdict {
    /// Process exit code for harness drivers.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Unstable => 1,
            Self::Fail => 2,
        }
    }

    /// Lower-case label used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Unstable => "unstable",
            Self::Fail => "fail",
        }
    }
}

/// Success thresholds driving verdict computation.
///
/// A validator named in `critical_validators` or `warning_validators`
/// contributes at that severity regardless of its own declaration; any
/// other validator contributes at its declared severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum fraction of successful iterations, in `[0, 1]`.
    pub min_success_rate: f64,
    /// Maximum tolerated failed iterations.
    pub max_failed_iterations: u64,
    /// Validators promoted to critical for verdict purposes.
    pub critical_validators: Vec<String>,
    /// Validators demoted to warnings for verdict purposes.
    pub warning_validators: Vec<String>,
}

impl Thresholds {
    /// The default preset: 95% success rate required.
    pub fn default_preset() -> Self {
        Self {
            min_success_rate: 0.95,
            max_failed_iterations: u64::MAX,
            critical_validators: Vec::new(),
            warning_validators: Vec::new(),
        }
    }

    /// The strict preset: every iteration must succeed.
    pub fn strict() -> Self {
        Self {
            min_success_rate: 1.0,
            max_failed_iterations: 0,
            ..Self::default_preset()
        }
    }

    /// The relaxed preset: 80% success rate required.
    pub fn relaxed() -> Self {
        Self {
            min_success_rate: 0.80,
            ..Self::default_preset()
        }
    }

    /// Treat the named validator's failures as critical.
    pub fn with_critical(mut self, validator: impl Into<String>) -> Self {
        self.critical_validators.push(validator.into());
        self
    }

    /// Treat the named validator's failures as warnings.
    pub fn with_warning(mut self, validator: impl Into<String>) -> Self {
        self.warning_validators.push(validator.into());
        self
    }

    /// Compute the verdict for a finished run.
    pub fn evaluate(&self, report: &RunReport) -> Verdict {
        let failed = report.failed();
        let success_rate = report.success_rate();

        let mut critical_failure = false;
        let mut warning_failure = false;
        let mut info_failure = false;
        for iteration in &report.iterations {
            for outcome in &iteration.validator_outcomes {
                if outcome.passed {
                    continue;
                }
                let effective = if self.critical_validators.contains(&outcome.name) {
                    Severity::Critical
                } else if self.warning_validators.contains(&outcome.name) {
                    Severity::Warning
                } else {
                    outcome.severity
                };
                match effective {
                    Severity::Critical => critical_failure = true,
                    Severity::Warning => warning_failure = true,
                    Severity::Info => info_failure = true,
                }
            }
        }

        if critical_failure
            || success_rate < self.min_success_rate
            || failed > self.max_failed_iterations
        {
            return Verdict::Fail;
        }
        if warning_failure || info_failure || report.panics_recovered() > 0 {
            return Verdict::Unstable;
        }
        Verdict::Pass
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::default_preset()
    }
}
