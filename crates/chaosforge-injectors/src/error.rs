//! Error injection
//!
//! Offers the error-provider capability: instrumented fallible operations
//! consult it through `maybe_error` and return the injected failure
//! instead of proceeding.

use crate::config::ErrorConfig;
use async_trait::async_trait;
use chaosforge_core::{
    ChaosError, ChaosRng, ErrorProvider, Injector, InjectorContext, InjectorState, Lifecycle,
    Result, SeedSink,
};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct ErrorState {
    config: ErrorConfig,
    rng: Mutex<Option<ChaosRng>>,
    injected_total: AtomicU64,
}

impl ErrorProvider for ErrorState {
    fn should_return_error(&self) -> Option<ChaosError> {
        if !self.config.enabled {
            return None;
        }
        let decision = if let Some(rng) = self.rng.lock().as_ref() {
            rng.random_bool(self.config.probability)
        } else {
            rand::rng().random_bool(self.config.probability.clamp(0.0, 1.0))
        };
        if decision {
            self.injected_total.fetch_add(1, Ordering::Relaxed);
            Some(ChaosError::InjectedFault(self.config.message.clone()))
        } else {
            None
        }
    }
}

/// Reference error injector.
pub struct ErrorInjector {
    name: String,
    lifecycle: Lifecycle,
    state: Arc<ErrorState>,
}

impl ErrorInjector {
    /// Create an error injector named `error`.
    pub fn new(config: ErrorConfig) -> Self {
        Self {
            name: "error".to_string(),
            lifecycle: Lifecycle::new(),
            state: Arc::new(ErrorState {
                config,
                rng: Mutex::new(None),
                injected_total: AtomicU64::new(0),
            }),
        }
    }

    /// Override the injector name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of failures injected so far.
    pub fn injected_total(&self) -> u64 {
        self.state.injected_total.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Injector for ErrorInjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_inject(&self.name)?;
        ctx.logger.debug("error injector active");
        Ok(())
    }

    async fn stop(&self, _ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_stop();
        Ok(())
    }

    fn state(&self) -> InjectorState {
        self.lifecycle.state()
    }

    fn error_provider(&self) -> Option<Arc<dyn ErrorProvider>> {
        if self.state.config.enabled {
            Some(Arc::clone(&self.state) as Arc<dyn ErrorProvider>)
        } else {
            None
        }
    }

    fn as_seed_sink(&self) -> Option<&dyn SeedSink> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "errors_injected".to_string(),
            self.state.injected_total.load(Ordering::Relaxed).into(),
        )])
    }
}

impl SeedSink for ErrorInjector {
    fn bind_rng(&self, rng: ChaosRng) {
        *self.state.rng.lock() = Some(rng);
    }
}
