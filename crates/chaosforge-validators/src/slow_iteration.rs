//! Slow-iteration budget validator

use async_trait::async_trait;
use chaosforge_core::{ChaosContext, Resettable, Severity, Target, Validator};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tolerates a bounded number of slow iterations across the run.
///
/// Unlike [`crate::ExecutionTimeValidator`], a single slow iteration does
/// not fail; the validator only starts failing once more than `max_slow`
/// iterations have crossed the threshold.
pub struct SlowIterationValidator {
    name: String,
    severity: Severity,
    threshold: Duration,
    max_slow: u64,
    started: Mutex<Option<Instant>>,
    slow_total: AtomicU64,
}

impl SlowIterationValidator {
    /// Warning-severity validator named `slow_iterations`.
    pub fn new(threshold: Duration, max_slow: u64) -> Self {
        Self {
            name: "slow_iterations".to_string(),
            severity: Severity::Warning,
            threshold,
            max_slow,
            started: Mutex::new(None),
            slow_total: AtomicU64::new(0),
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

    /// Slow iterations counted so far across the run.
    pub fn slow_total(&self) -> u64 {
        self.slow_total.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Validator for SlowIterationValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn validate(&self, _ctx: &ChaosContext, _target: &dyn Target) -> anyhow::Result<()> {
        let started = self.started.lock().take();
        if let Some(started) = started {
            if started.elapsed() > self.threshold {
                self.slow_total.fetch_add(1, Ordering::Relaxed);
            }
        }
        let slow = self.slow_total.load(Ordering::Relaxed);
        if slow > self.max_slow {
            anyhow::bail!(
                "{slow} iterations over the {}ms threshold, only {} tolerated",
                self.threshold.as_millis(),
                self.max_slow
            );
        }
        Ok(())
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "slow_iterations".to_string(),
            self.slow_total.load(Ordering::Relaxed).into(),
        )])
    }
}

impl Resettable for SlowIterationValidator {
    fn reset(&self) {
        *self.started.lock() = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTarget;

    #[async_trait]
    impl chaosforge_core::Target for NullTarget {
        fn name(&self) -> &str {
            "null"
        }
    }

    #[tokio::test]
    async fn tolerates_up_to_the_budget() {
        let validator = SlowIterationValidator::new(Duration::from_millis(5), 2);
        let ctx = ChaosContext::disabled();

        for _ in 0..2 {
            validator.reset();
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(validator.validate(&ctx, &NullTarget).await.is_ok());
        }
        assert_eq!(validator.slow_total(), 2);

        // Third slow iteration crosses the budget.
        validator.reset();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(validator.validate(&ctx, &NullTarget).await.is_err());
    }

    #[tokio::test]
    async fn fast_iterations_never_count() {
        let validator = SlowIterationValidator::new(Duration::from_secs(5), 0);
        let ctx = ChaosContext::disabled();
        validator.reset();
        assert!(validator.validate(&ctx, &NullTarget).await.is_ok());
        assert_eq!(validator.slow_total(), 0);
    }
}
