//! Delay injection
//!
//! Two modes. In probability mode every `maybe_delay` call draws
//! independently against the configured probability. In interval mode a
//! background producer opens a delay window on every tick; `maybe_delay`
//! blocks until a window opens or a short timeout elapses, and only one
//! waiter consumes each window. Unclaimed windows lapse after roughly the
//! window duration plus a small slack.
//!
//! The injector is a hybrid: besides the delay-provider capability it can
//! also apply its delay as a pre-step hook (`apply_before_step`).

use crate::config::{DelayConfig, DelayMode};
use async_trait::async_trait;
use chaosforge_core::{
    ChaosContext, ChaosRng, DelayProvider, Injector, InjectorContext, InjectorState, Lifecycle,
    Result, SeedSink, StepHooks, StepOutcome,
};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long `chaos_delay` waits for an interval-mode window to open.
const CLAIM_WAIT: Duration = Duration::from_millis(50);

/// Extra lifetime granted to a window beyond its configured duration.
const WINDOW_SLACK: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct DelayWindow {
    duration: Duration,
    opened_at: Instant,
    lifetime: Duration,
}

struct DelayState {
    config: DelayConfig,
    rng: Mutex<Option<ChaosRng>>,
    window: Mutex<Option<DelayWindow>>,
    notify: Notify,
    applied_total: AtomicU64,
    windows_opened: AtomicU64,
    windows_lapsed: AtomicU64,
}

impl DelayState {
    fn new(config: DelayConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(None),
            window: Mutex::new(None),
            notify: Notify::new(),
            applied_total: AtomicU64::new(0),
            windows_opened: AtomicU64::new(0),
            windows_lapsed: AtomicU64::new(0),
        }
    }

    fn draw_bool(&self, probability: f64) -> bool {
        if let Some(rng) = self.rng.lock().as_ref() {
            rng.random_bool(probability)
        } else {
            rand::rng().random_bool(probability.clamp(0.0, 1.0))
        }
    }

    fn draw_duration(&self) -> Duration {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        let millis = if let Some(rng) = self.rng.lock().as_ref() {
            rng.random_range_u64(min, max)
        } else if min >= max {
            min
        } else {
            rand::rng().random_range(min..=max)
        };
        Duration::from_millis(millis)
    }

    /// Claim the open window, if one is still live. Stale windows count as
    /// lapsed.
    fn try_claim(&self) -> Option<Duration> {
        let mut slot = self.window.lock();
        let window = slot.take()?;
        if window.opened_at.elapsed() <= window.lifetime {
            Some(window.duration)
        } else {
            self.windows_lapsed.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    fn open_window(&self, duration: Duration, lifetime: Duration) {
        let mut slot = self.window.lock();
        if slot.is_some() {
            // Previous window was never consumed.
            self.windows_lapsed.fetch_add(1, Ordering::Relaxed);
        }
        *slot = Some(DelayWindow {
            duration,
            opened_at: Instant::now(),
            lifetime,
        });
        drop(slot);
        self.windows_opened.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }
}

#[async_trait]
impl DelayProvider for DelayState {
    async fn chaos_delay(&self) -> (Duration, bool) {
        if !self.config.enabled {
            return (Duration::ZERO, false);
        }
        match self.config.mode {
            DelayMode::Probability => {
                if self.draw_bool(self.config.probability) {
                    let duration = self.draw_duration();
                    self.applied_total.fetch_add(1, Ordering::Relaxed);
                    (duration, true)
                } else {
                    (Duration::ZERO, false)
                }
            }
            DelayMode::Interval { .. } => {
                if let Some(duration) = self.try_claim() {
                    self.applied_total.fetch_add(1, Ordering::Relaxed);
                    return (duration, true);
                }
                // Wait briefly for the next window, then try once more.
                let _ = timeout(CLAIM_WAIT, self.notify.notified()).await;
                match self.try_claim() {
                    Some(duration) => {
                        self.applied_total.fetch_add(1, Ordering::Relaxed);
                        (duration, true)
                    }
                    None => (Duration::ZERO, false),
                }
            }
        }
    }
}

#[async_trait]
impl StepHooks for DelayState {
    async fn before_step(&self, ctx: &ChaosContext, step: &str) {
        let (duration, applied) = self.chaos_delay().await;
        if applied && !duration.is_zero() {
            debug!(step, delay_ms = duration.as_millis() as u64, "pre-step delay");
            tokio::select! {
                _ = sleep(duration) => {}
                _ = ctx.cancellation().cancelled() => {}
            }
        }
    }

    async fn after_step(&self, _ctx: &ChaosContext, outcome: &StepOutcome) {
        debug!(step = %outcome.step, success = outcome.success, "delay injector observed step");
    }
}

/// Reference delay injector.
pub struct DelayInjector {
    name: String,
    lifecycle: Lifecycle,
    state: Arc<DelayState>,
    stop: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DelayInjector {
    /// Create a delay injector named `delay`.
    pub fn new(config: DelayConfig) -> Self {
        Self {
            name: "delay".to_string(),
            lifecycle: Lifecycle::new(),
            state: Arc::new(DelayState::new(config)),
            stop: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Override the injector name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of delays handed out so far.
    pub fn applied_total(&self) -> u64 {
        self.state.applied_total.load(Ordering::Relaxed)
    }

    fn spawn_producer(&self, run_cancel: CancellationToken) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let stop = self.stop.clone();
        let DelayMode::Interval {
            interval_ms,
            window_ms,
        } = state.config.mode
        else {
            unreachable!("producer is only spawned in interval mode");
        };
        let interval = Duration::from_millis(interval_ms);
        let lifetime = Duration::from_millis(window_ms) + WINDOW_SLACK;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = run_cancel.cancelled() => break,
                    _ = sleep(interval) => {}
                }
                let duration = state.draw_duration();
                state.open_window(duration, lifetime);
            }
            debug!("delay window producer exited");
        })
    }
}

#[async_trait]
impl Injector for DelayInjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_inject(&self.name)?;
        if self.state.config.enabled {
            if let DelayMode::Interval { .. } = self.state.config.mode {
                let handle = self.spawn_producer(ctx.cancel.clone());
                *self.worker.lock() = Some(handle);
            }
        }
        ctx.logger.debug("delay injector active");
        Ok(())
    }

    async fn stop(&self, ctx: &InjectorContext) -> Result<()> {
        if !self.lifecycle.begin_stop() {
            return Ok(());
        }
        self.stop.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        ctx.logger.debug("delay injector stopped");
        Ok(())
    }

    fn state(&self) -> InjectorState {
        self.lifecycle.state()
    }

    fn delay_provider(&self) -> Option<Arc<dyn DelayProvider>> {
        if self.state.config.enabled {
            Some(Arc::clone(&self.state) as Arc<dyn DelayProvider>)
        } else {
            None
        }
    }

    fn step_hooks(&self) -> Option<Arc<dyn StepHooks>> {
        if self.state.config.enabled && self.state.config.apply_before_step {
            Some(Arc::clone(&self.state) as Arc<dyn StepHooks>)
        } else {
            None
        }
    }

    fn as_seed_sink(&self) -> Option<&dyn SeedSink> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        let mut metrics = HashMap::new();
        metrics.insert(
            "delays_applied".to_string(),
            self.state.applied_total.load(Ordering::Relaxed).into(),
        );
        metrics.insert(
            "windows_opened".to_string(),
            self.state.windows_opened.load(Ordering::Relaxed).into(),
        );
        metrics.insert(
            "windows_lapsed".to_string(),
            self.state.windows_lapsed.load(Ordering::Relaxed).into(),
        );
        metrics
    }
}

impl SeedSink for DelayInjector {
    fn bind_rng(&self, rng: ChaosRng) {
        *self.state.rng.lock() = Some(rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injector_ctx() -> InjectorContext {
        InjectorContext::new("test", ChaosRng::from_seed(1), CancellationToken::new())
    }

    #[tokio::test]
    async fn probability_mode_is_deterministic_with_bound_rng() {
        let config = DelayConfig {
            probability: 0.5,
            min_delay_ms: 1,
            max_delay_ms: 9,
            ..DelayConfig::default()
        };

        let first = DelayInjector::new(config.clone());
        first.bind_rng(ChaosRng::from_seed(0xC0FFEE));
        let mut decisions_a = Vec::new();
        for _ in 0..32 {
            decisions_a.push(first.state.chaos_delay().await);
        }

        let second = DelayInjector::new(config);
        second.bind_rng(ChaosRng::from_seed(0xC0FFEE));
        let mut decisions_b = Vec::new();
        for _ in 0..32 {
            decisions_b.push(second.state.chaos_delay().await);
        }

        assert_eq!(decisions_a, decisions_b);
    }

    #[tokio::test]
    async fn always_applies_at_probability_one() {
        let injector = DelayInjector::new(DelayConfig::fixed(5));
        injector.bind_rng(ChaosRng::from_seed(7));
        let (duration, applied) = injector.state.chaos_delay().await;
        assert!(applied);
        assert_eq!(duration, Duration::from_millis(5));
        assert_eq!(injector.applied_total(), 1);
    }

    #[tokio::test]
    async fn disabled_config_never_applies() {
        let config = DelayConfig {
            enabled: false,
            ..DelayConfig::fixed(5)
        };
        let injector = DelayInjector::new(config);
        assert!(injector.delay_provider().is_none());
        let (_, applied) = injector.state.chaos_delay().await;
        assert!(!applied);
    }

    #[tokio::test]
    async fn interval_mode_opens_and_lapses_windows() {
        let config = DelayConfig {
            probability: 1.0,
            min_delay_ms: 1,
            max_delay_ms: 1,
            mode: DelayMode::Interval {
                interval_ms: 10,
                window_ms: 5,
            },
            ..DelayConfig::default()
        };
        let injector = DelayInjector::new(config);
        injector.bind_rng(ChaosRng::from_seed(3));
        let ctx = injector_ctx();
        injector.inject(&ctx).await.expect("inject");

        // Let several windows open and lapse unclaimed.
        sleep(Duration::from_millis(120)).await;
        let (duration, applied) = injector.state.chaos_delay().await;
        assert!(applied, "a window should be claimable");
        assert_eq!(duration, Duration::from_millis(1));

        injector.stop(&ctx).await.expect("stop");
        let lapsed = injector.state.windows_lapsed.load(Ordering::Relaxed);
        assert!(lapsed >= 1, "unclaimed windows should lapse, saw {lapsed}");
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_waits_for_producer() {
        let config = DelayConfig {
            mode: DelayMode::Interval {
                interval_ms: 10,
                window_ms: 5,
            },
            ..DelayConfig::default()
        };
        let injector = DelayInjector::new(config);
        let ctx = injector_ctx();
        injector.inject(&ctx).await.expect("inject");
        assert_eq!(injector.state(), InjectorState::Active);

        injector.stop(&ctx).await.expect("first stop");
        injector.stop(&ctx).await.expect("second stop is a no-op");
        assert_eq!(injector.state(), InjectorState::Stopped);

        // Inject after stop must fail.
        assert!(injector.inject(&ctx).await.is_err());
    }
}
