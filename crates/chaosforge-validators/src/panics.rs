//! Recovered-panic validator

use async_trait::async_trait;
use chaosforge_core::{
    ChaosContext, PanicEvent, PanicRecorder, Resettable, Severity, Target, Validator,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fails an iteration in which the executor recovered any panic.
///
/// The executor forwards every recovered panic through the
/// panic-recorder capability before validators run.
pub struct RecoveredPanicValidator {
    name: String,
    severity: Severity,
    payloads: Mutex<Vec<String>>,
    recovered_total: AtomicU64,
}

impl RecoveredPanicValidator {
    /// Warning-severity validator named `recovered_panics`.
    pub fn new() -> Self {
        Self {
            name: "recovered_panics".to_string(),
            severity: Severity::Warning,
            payloads: Mutex::new(Vec::new()),
            recovered_total: AtomicU64::new(0),
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

    /// Panics recovered across the whole run.
    pub fn recovered_total(&self) -> u64 {
        self.recovered_total.load(Ordering::Relaxed)
    }
}

impl Default for RecoveredPanicValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for RecoveredPanicValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn validate(&self, _ctx: &ChaosContext, _target: &dyn Target) -> anyhow::Result<()> {
        let payloads = self.payloads.lock();
        if payloads.is_empty() {
            return Ok(());
        }
        anyhow::bail!(
            "{} panic(s) recovered this iteration; first: {}",
            payloads.len(),
            payloads[0]
        )
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        Some(self)
    }

    fn as_panic_recorder(&self) -> Option<&dyn PanicRecorder> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "panics_recovered".to_string(),
            self.recovered_total.load(Ordering::Relaxed).into(),
        )])
    }
}

impl Resettable for RecoveredPanicValidator {
    fn reset(&self) {
        self.payloads.lock().clear();
    }
}

impl PanicRecorder for RecoveredPanicValidator {
    fn on_panic_recovered(&self, event: &PanicEvent) {
        self.recovered_total.fetch_add(1, Ordering::Relaxed);
        self.payloads.lock().push(event.payload.clone());
    }
}
