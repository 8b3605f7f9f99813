//! Runtime task-count validator

use async_trait::async_trait;
use chaosforge_core::{ChaosContext, Severity, Target, Validator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fails when the number of alive tokio tasks exceeds a limit.
///
/// Steps that ignore cancellation leak supervised tasks; this validator
/// observes that leakage from the outside via the runtime metrics.
pub struct TaskCountValidator {
    name: String,
    severity: Severity,
    limit: usize,
    peak_seen: AtomicU64,
}

impl TaskCountValidator {
    /// Warning-severity validator named `task_count`.
    pub fn new(limit: usize) -> Self {
        Self {
            name: "task_count".to_string(),
            severity: Severity::Warning,
            limit,
            peak_seen: AtomicU64::new(0),
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
impl Validator for TaskCountValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn validate(&self, _ctx: &ChaosContext, _target: &dyn Target) -> anyhow::Result<()> {
        let alive = tokio::runtime::Handle::current().metrics().num_alive_tasks();
        self.peak_seen.fetch_max(alive as u64, Ordering::Relaxed);
        if alive > self.limit {
            anyhow::bail!("{alive} alive tasks exceed limit {}", self.limit);
        }
        Ok(())
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "peak_alive_tasks".to_string(),
            self.peak_seen.load(Ordering::Relaxed).into(),
        )])
    }
}
