//! Cancellation injection
//!
//! Offers the cancellation-provider capability: at iteration start the
//! executor asks for a child of the iteration token, and with the
//! configured probability this injector attaches a background canceller
//! that fires after a randomized delay. The canceller ties its lifetime to
//! the parent token, so it drains as soon as the iteration finishes.

use crate::config::CancellationConfig;
use async_trait::async_trait;
use chaosforge_core::{
    CancellationProvider, ChaosRng, Injector, InjectorContext, InjectorState, Lifecycle, Result,
    SeedSink,
};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct CancelState {
    config: CancellationConfig,
    rng: Mutex<Option<ChaosRng>>,
    armed_total: AtomicU64,
    fired_total: Arc<AtomicU64>,
}

impl CancelState {
    fn draw_bool(&self, probability: f64) -> bool {
        if let Some(rng) = self.rng.lock().as_ref() {
            rng.random_bool(probability)
        } else {
            rand::rng().random_bool(probability.clamp(0.0, 1.0))
        }
    }

    fn draw_after(&self) -> Duration {
        let (min, max) = (self.config.min_after_ms, self.config.max_after_ms);
        let millis = if let Some(rng) = self.rng.lock().as_ref() {
            rng.random_range_u64(min, max)
        } else if min >= max {
            min
        } else {
            rand::rng().random_range(min..=max)
        };
        Duration::from_millis(millis)
    }
}

impl CancellationProvider for CancelState {
    fn chaos_token(&self, parent: &CancellationToken) -> CancellationToken {
        let child = parent.child_token();
        if !self.config.enabled || !self.draw_bool(self.config.probability) {
            return child;
        }

        let after = self.draw_after();
        self.armed_total.fetch_add(1, Ordering::Relaxed);
        debug!(after_ms = after.as_millis() as u64, "arming chaos cancellation");

        let target = child.clone();
        let parent = parent.clone();
        let fired = Arc::clone(&self.fired_total);
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {}
                _ = sleep(after) => {
                    fired.fetch_add(1, Ordering::Relaxed);
                    debug!("chaos cancellation fired");
                    target.cancel();
                }
            }
        });
        child
    }
}

/// Reference cancellation injector.
pub struct CancellationInjector {
    name: String,
    lifecycle: Lifecycle,
    state: Arc<CancelState>,
}

impl CancellationInjector {
    /// Create a cancellation injector named `cancellation`.
    pub fn new(config: CancellationConfig) -> Self {
        Self {
            name: "cancellation".to_string(),
            lifecycle: Lifecycle::new(),
            state: Arc::new(CancelState {
                config,
                rng: Mutex::new(None),
                armed_total: AtomicU64::new(0),
                fired_total: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Override the injector name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of cancellations that actually fired.
    pub fn fired_total(&self) -> u64 {
        self.state.fired_total.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Injector for CancellationInjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_inject(&self.name)?;
        ctx.logger.debug("cancellation injector active");
        Ok(())
    }

    async fn stop(&self, _ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_stop();
        Ok(())
    }

    fn state(&self) -> InjectorState {
        self.lifecycle.state()
    }

    fn cancellation_provider(&self) -> Option<Arc<dyn CancellationProvider>> {
        if self.state.config.enabled {
            Some(Arc::clone(&self.state) as Arc<dyn CancellationProvider>)
        } else {
            None
        }
    }

    fn as_seed_sink(&self) -> Option<&dyn SeedSink> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            (
                "cancellations_armed".to_string(),
                self.state.armed_total.load(Ordering::Relaxed).into(),
            ),
            (
                "cancellations_fired".to_string(),
                self.state.fired_total.load(Ordering::Relaxed).into(),
            ),
        ])
    }
}

impl SeedSink for CancellationInjector {
    fn bind_rng(&self, rng: ChaosRng) {
        *self.state.rng.lock() = Some(rng);
    }
}
