//! Validator contracts
//!
//! A validator asserts an invariant once per iteration, after the steps
//! run. Severity governs how a failure contributes to the verdict, never
//! whether the validator runs. Optional capabilities (reset, event
//! recorders, step wrapping) are discovered through the accessors on
//! [`Validator`].

use crate::context::ChaosContext;
use crate::events::PanicEvent;
use crate::target::{Step, Target};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity of a validator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Purely informational; never affects the verdict beyond reporting.
    Info,
    /// Recorded and surfaced; an otherwise-clean run becomes `unstable`.
    Warning,
    /// A failure marks the iteration as failed and drives the verdict to
    /// `fail`.
    Critical,
}

impl Severity {
    /// Lower-case label used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Outcome of one validator evaluation within an iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorOutcome {
    /// Validator name.
    pub name: String,
    /// Declared severity of the validator.
    pub severity: Severity,
    /// Whether the invariant held.
    pub passed: bool,
    /// Failure description when the invariant was violated.
    pub message: Option<String>,
}

impl ValidatorOutcome {
    /// Passing outcome.
    pub fn passed(name: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            severity,
            passed: true,
            message: None,
        }
    }

    /// Failing outcome with a description.
    pub fn failed(name: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            severity,
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Per-iteration state reset, invoked before the iteration's first step.
pub trait Resettable: Send + Sync {
    /// Clear state accumulated during the previous iteration.
    fn reset(&self);
}

/// Notified for every panic the executor recovered during the iteration.
pub trait PanicRecorder: Send + Sync {
    /// One call per recovered panic.
    fn on_panic_recovered(&self, event: &PanicEvent);
}

/// Receives recursion-depth samples published by instrumented user code.
pub trait RecursionRecorder: Send + Sync {
    /// One call per sample.
    fn on_recursion_depth(&self, depth: u32);
}

/// Wraps a step with supervisory machinery before it executes.
pub trait StepWrapper: Send + Sync {
    /// Return the decorated step. The executor applies wrappers so that
    /// the first wrapping validator in insertion order becomes the
    /// outermost layer.
    fn wrap_step(&self, step: Step) -> Step;
}

/// The validator contract.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validator name, unique within a scenario.
    fn name(&self) -> &str;

    /// Declared severity of a failure.
    fn severity(&self) -> Severity;

    /// Evaluate the invariant. `Err` means the invariant was violated;
    /// the error's rendering becomes the outcome message.
    async fn validate(&self, ctx: &ChaosContext, target: &dyn Target) -> anyhow::Result<()>;

    /// Reset capability, if the validator keeps per-iteration state.
    fn as_resettable(&self) -> Option<&dyn Resettable> {
        None
    }

    /// Panic-recorder capability, if offered.
    fn as_panic_recorder(&self) -> Option<&dyn PanicRecorder> {
        None
    }

    /// Recursion-recorder capability, if offered.
    fn as_recursion_recorder(&self) -> Option<&dyn RecursionRecorder> {
        None
    }

    /// Step-wrapping capability, if offered.
    fn as_step_wrapper(&self) -> Option<&dyn StepWrapper> {
        None
    }

    /// Metrics snapshot, merged into the run report.
    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_impact() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!(Severity::Critical.as_str(), "critical");
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).expect("serialize");
        assert_eq!(json, "\"warning\"");
        let back: Severity = serde_json::from_str("\"critical\"").expect("deserialize");
        assert_eq!(back, Severity::Critical);
    }

    #[test]
    fn outcome_constructors() {
        let ok = ValidatorOutcome::passed("recursion", Severity::Critical);
        assert!(ok.passed);
        assert!(ok.message.is_none());

        let bad = ValidatorOutcome::failed("recursion", Severity::Critical, "depth 75 > 50");
        assert!(!bad.passed);
        assert_eq!(bad.message.as_deref(), Some("depth 75 > 50"));
    }
}
