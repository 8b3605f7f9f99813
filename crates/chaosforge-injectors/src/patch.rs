//! Monkey-patch-style injection
//!
//! A global injector whose whole effect is swapping function
//! implementations through the
//! [`FunctionPatcher`](chaosforge_core::FunctionPatcher) contract:
//! replacements are installed at `inject` and the originals restored in
//! reverse order at `stop`. The core owns neither the patchers nor the
//! runtime facilities they use; it only drives the lifecycle.

use async_trait::async_trait;
use chaosforge_core::{
    ChaosError, FunctionPatcher, Injector, InjectorContext, InjectorState, Lifecycle, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A patcher registered under a label, for logs and failure reasons.
#[derive(Clone)]
pub struct NamedPatcher {
    label: String,
    patcher: Arc<dyn FunctionPatcher>,
}

impl NamedPatcher {
    /// Pair a patcher with the label reports refer to it by.
    pub fn new(label: impl Into<String>, patcher: Arc<dyn FunctionPatcher>) -> Self {
        Self {
            label: label.into(),
            patcher,
        }
    }

    /// The patcher's label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Reference monkey-patch injector.
pub struct MonkeyPatchInjector {
    name: String,
    lifecycle: Lifecycle,
    patchers: Vec<NamedPatcher>,
}

impl MonkeyPatchInjector {
    /// Create a monkey-patch injector named `monkey_patch`.
    pub fn new(patchers: Vec<NamedPatcher>) -> Self {
        Self {
            name: "monkey_patch".to_string(),
            lifecycle: Lifecycle::new(),
            patchers,
        }
    }

    /// Override the injector name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Injector for MonkeyPatchInjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_inject(&self.name)?;
        for (index, entry) in self.patchers.iter().enumerate() {
            if let Err(err) = entry.patcher.install() {
                // Roll the already-patched sites back before failing.
                for installed in self.patchers[..index].iter().rev() {
                    if let Err(err) = installed.patcher.restore() {
                        warn!(patch = %installed.label, error = %err, "rollback restore failed");
                    }
                }
                self.lifecycle.begin_stop();
                return Err(ChaosError::InjectFailed {
                    name: self.name.clone(),
                    reason: format!("installing patch '{}' failed: {err}", entry.label),
                });
            }
            debug!(patch = %entry.label, "patch installed");
        }
        ctx.logger.debug("monkey patch injector active");
        Ok(())
    }

    async fn stop(&self, _ctx: &InjectorContext) -> Result<()> {
        if !self.lifecycle.begin_stop() {
            return Ok(());
        }
        for entry in self.patchers.iter().rev() {
            if let Err(err) = entry.patcher.restore() {
                warn!(patch = %entry.label, error = %err, "patch restore failed");
            } else {
                debug!(patch = %entry.label, "patch restored");
            }
        }
        Ok(())
    }

    fn state(&self) -> InjectorState {
        self.lifecycle.state()
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "patches_configured".to_string(),
            (self.patchers.len() as u64).into(),
        )])
    }
}
