//! Iteration execution-time validator

use async_trait::async_trait;
use chaosforge_core::{ChaosContext, Resettable, Severity, Target, Validator};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Fails an iteration that ran longer than the configured budget.
///
/// The clock starts at validator reset, which the executor invokes before
/// the iteration's first step.
pub struct ExecutionTimeValidator {
    name: String,
    severity: Severity,
    max_duration: Duration,
    started: Mutex<Option<Instant>>,
    over_budget_total: AtomicU64,
}

impl ExecutionTimeValidator {
    /// Warning-severity validator named `execution_time`.
    pub fn new(max_duration: Duration) -> Self {
        Self {
            name: "execution_time".to_string(),
            severity: Severity::Warning,
            max_duration,
            started: Mutex::new(None),
            over_budget_total: AtomicU64::new(0),
        }
    }

    /// Override the validator name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[async_trait]
impl Validator for ExecutionTimeValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn validate(&self, _ctx: &ChaosContext, _target: &dyn Target) -> anyhow::Result<()> {
        let Some(started) = *self.started.lock() else {
            return Ok(());
        };
        let elapsed = started.elapsed();
        if elapsed > self.max_duration {
            self.over_budget_total.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!(
                "iteration took {}ms, over the {}ms budget",
                elapsed.as_millis(),
                self.max_duration.as_millis()
            );
        }
        Ok(())
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "iterations_over_budget".to_string(),
            self.over_budget_total.load(Ordering::Relaxed).into(),
        )])
    }
}

impl Resettable for ExecutionTimeValidator {
    fn reset(&self) {
        *self.started.lock() = Some(Instant::now());
    }
}
