//! Recursion-depth limit validator

use async_trait::async_trait;
use chaosforge_core::{
    ChaosContext, RecursionRecorder, Resettable, Severity, Target, Validator,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fails an iteration when instrumented user code reports a recursion
/// depth beyond the configured limit.
///
/// Samples arrive through the recursion-recorder capability; only the
/// deepest sample per iteration matters.
pub struct RecursionDepthValidator {
    name: String,
    severity: Severity,
    limit: u32,
    max_seen: Mutex<Option<u32>>,
    violations_total: AtomicU64,
}

impl RecursionDepthValidator {
    /// Critical-severity validator named `recursion_depth`.
    pub fn new(limit: u32) -> Self {
        Self {
            name: "recursion_depth".to_string(),
            severity: Severity::Critical,
            limit,
            max_seen: Mutex::new(None),
            violations_total: AtomicU64::new(0),
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
impl Validator for RecursionDepthValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn validate(&self, _ctx: &ChaosContext, _target: &dyn Target) -> anyhow::Result<()> {
        let max_seen = *self.max_seen.lock();
        match max_seen {
            Some(depth) if depth > self.limit => {
                self.violations_total.fetch_add(1, Ordering::Relaxed);
                anyhow::bail!("recursion depth {depth} exceeded limit {}", self.limit)
            }
            _ => Ok(()),
        }
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        Some(self)
    }

    fn as_recursion_recorder(&self) -> Option<&dyn RecursionRecorder> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "depth_violations".to_string(),
            self.violations_total.load(Ordering::Relaxed).into(),
        )])
    }
}

impl Resettable for RecursionDepthValidator {
    fn reset(&self) {
        *self.max_seen.lock() = None;
    }
}

impl RecursionRecorder for RecursionDepthValidator {
    fn on_recursion_depth(&self, depth: u32) {
        let mut max_seen = self.max_seen.lock();
        match *max_seen {
            Some(current) if current >= depth => {}
            _ => *max_seen = Some(depth),
        }
    }
}
