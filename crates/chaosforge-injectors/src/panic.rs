//! Panic injection
//!
//! Offers the panic-provider capability: `maybe_panic` consults it and
//! raises an unrecoverable failure when told to. Decisions are drawn from
//! the bound iteration RNG so runs with the same seed panic at the same
//! points.

use crate::config::PanicConfig;
use async_trait::async_trait;
use chaosforge_core::{
    ChaosRng, Injector, InjectorContext, InjectorState, Lifecycle, PanicProvider, Result, SeedSink,
};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct PanicState {
    config: PanicConfig,
    rng: Mutex<Option<ChaosRng>>,
    signalled_total: AtomicU64,
}

impl PanicProvider for PanicState {
    fn should_chaos_panic(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let decision = if let Some(rng) = self.rng.lock().as_ref() {
            rng.random_bool(self.config.probability)
        } else {
            rand::rng().random_bool(self.config.probability.clamp(0.0, 1.0))
        };
        if decision {
            self.signalled_total.fetch_add(1, Ordering::Relaxed);
        }
        decision
    }
}

/// Reference panic injector.
pub struct PanicInjector {
    name: String,
    lifecycle: Lifecycle,
    state: Arc<PanicState>,
}

impl PanicInjector {
    /// Create a panic injector named `panic`.
    pub fn new(config: PanicConfig) -> Self {
        Self {
            name: "panic".to_string(),
            lifecycle: Lifecycle::new(),
            state: Arc::new(PanicState {
                config,
                rng: Mutex::new(None),
                signalled_total: AtomicU64::new(0),
            }),
        }
    }

    /// Override the injector name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of times the provider told user code to panic.
    pub fn signalled_total(&self) -> u64 {
        self.state.signalled_total.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Injector for PanicInjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_inject(&self.name)?;
        ctx.logger.debug("panic injector active");
        Ok(())
    }

    async fn stop(&self, _ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_stop();
        Ok(())
    }

    fn state(&self) -> InjectorState {
        self.lifecycle.state()
    }

    fn panic_provider(&self) -> Option<Arc<dyn PanicProvider>> {
        if self.state.config.enabled {
            Some(Arc::clone(&self.state) as Arc<dyn PanicProvider>)
        } else {
            None
        }
    }

    fn as_seed_sink(&self) -> Option<&dyn SeedSink> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "panics_signalled".to_string(),
            self.state.signalled_total.load(Ordering::Relaxed).into(),
        )])
    }
}

impl SeedSink for PanicInjector {
    fn bind_rng(&self, rng: ChaosRng) {
        *self.state.rng.lock() = Some(rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_one_always_signals() {
        let injector = PanicInjector::new(PanicConfig {
            enabled: true,
            probability: 1.0,
        });
        injector.bind_rng(ChaosRng::from_seed(5));
        let provider = injector.panic_provider().expect("capability present");
        assert!(provider.should_chaos_panic());
        assert_eq!(injector.signalled_total(), 1);
    }

    #[test]
    fn probability_zero_never_signals() {
        let injector = PanicInjector::new(PanicConfig {
            enabled: true,
            probability: 0.0,
        });
        injector.bind_rng(ChaosRng::from_seed(5));
        let provider = injector.panic_provider().expect("capability present");
        for _ in 0..32 {
            assert!(!provider.should_chaos_panic());
        }
    }

    #[test]
    fn decisions_replay_with_the_same_seed() {
        let config = PanicConfig {
            enabled: true,
            probability: 0.5,
        };
        let first = PanicInjector::new(config.clone());
        first.bind_rng(ChaosRng::from_seed(0xC0FFEE));
        let a: Vec<bool> = (0..64)
            .map(|_| first.state.should_chaos_panic())
            .collect();

        let second = PanicInjector::new(config);
        second.bind_rng(ChaosRng::from_seed(0xC0FFEE));
        let b: Vec<bool> = (0..64)
            .map(|_| second.state.should_chaos_panic())
            .collect();

        assert_eq!(a, b);
    }

    #[test]
    fn disabled_injector_offers_no_capability() {
        let injector = PanicInjector::new(PanicConfig {
            enabled: false,
            probability: 1.0,
        });
        assert!(injector.panic_provider().is_none());
    }
}
