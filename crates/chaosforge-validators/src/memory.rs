//! Process memory-limit validator

use async_trait::async_trait;
use chaosforge_core::{ChaosContext, Severity, Target, Validator};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::{ProcessesToUpdate, System};

/// Fails when the current process's resident memory exceeds a limit.
pub struct MemoryLimitValidator {
    name: String,
    severity: Severity,
    max_bytes: u64,
    system: Mutex<System>,
    peak_bytes: AtomicU64,
}

impl MemoryLimitValidator {
    /// Critical-severity validator named `memory_limit`.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            name: "memory_limit".to_string(),
            severity: Severity::Critical,
            max_bytes,
            system: Mutex::new(System::new()),
            peak_bytes: AtomicU64::new(0),
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

    fn current_memory_bytes(&self) -> anyhow::Result<u64> {
        let pid = sysinfo::get_current_pid()
            .map_err(|err| anyhow::anyhow!("cannot resolve current pid: {err}"))?;
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let memory = system
            .process(pid)
            .map(sysinfo::Process::memory)
            .unwrap_or(0);
        Ok(memory)
    }
}

#[async_trait]
impl Validator for MemoryLimitValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn validate(&self, _ctx: &ChaosContext, _target: &dyn Target) -> anyhow::Result<()> {
        let memory = self.current_memory_bytes()?;
        self.peak_bytes.fetch_max(memory, Ordering::Relaxed);
        if memory > self.max_bytes {
            anyhow::bail!(
                "process uses {memory} bytes, over the {} byte limit",
                self.max_bytes
            );
        }
        Ok(())
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "peak_memory_bytes".to_string(),
            self.peak_bytes.load(Ordering::Relaxed).into(),
        )])
    }
}
