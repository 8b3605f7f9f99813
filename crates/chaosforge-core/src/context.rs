//! Per-iteration chaos context
//!
//! A read-only value bundle the executor threads through every step and,
//! transitively, into user code. It carries the iteration RNG, the logger
//! handle, the event recorder, the cancellation token, and provider tables
//! resolved from the active injectors. Instrumented user code consults it
//! through the `maybe_*` instrumentation points; on a context built with
//! [`ChaosContext::disabled`] every one of them is a no-op, so
//! instrumented code can run outside the framework unchanged.

use crate::events::EventRecorder;
use crate::injector::{DelayProvider, ErrorProvider, Injector, NetworkProvider, PanicProvider};
use crate::logger::Logger;
use crate::rng::ChaosRng;
use crate::{ChaosError, Result};
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Provider tables resolved from active injectors at iteration start.
///
/// The context references injectors only through these tables, so dropping
/// the context at iteration end never touches injector lifecycle.
#[derive(Clone, Default)]
pub struct ProviderTables {
    delay: Vec<Arc<dyn DelayProvider>>,
    panic: Vec<Arc<dyn PanicProvider>>,
    error: Vec<Arc<dyn ErrorProvider>>,
    network: Vec<Arc<dyn NetworkProvider>>,
}

impl ProviderTables {
    /// Collect every capability the given injectors expose, in injector
    /// insertion order.
    pub fn from_injectors<'a, I>(injectors: I) -> Self
    where
        I: IntoIterator<Item = &'a Arc<dyn Injector>>,
    {
        let mut tables = Self::default();
        for injector in injectors {
            if let Some(p) = injector.delay_provider() {
                tables.delay.push(p);
            }
            if let Some(p) = injector.panic_provider() {
                tables.panic.push(p);
            }
            if let Some(p) = injector.error_provider() {
                tables.error.push(p);
            }
            if let Some(p) = injector.network_provider() {
                tables.network.push(p);
            }
        }
        tables
    }

    /// Whether no provider of any kind is registered.
    pub fn is_empty(&self) -> bool {
        self.delay.is_empty()
            && self.panic.is_empty()
            && self.error.is_empty()
            && self.network.is_empty()
    }
}

struct ContextInner {
    scenario: String,
    iteration: u64,
    enabled: bool,
    rng: ChaosRng,
    recorder: EventRecorder,
    logger: Logger,
    providers: ProviderTables,
    cancel: CancellationToken,
}

/// Per-iteration value bundle propagated through the call chain.
///
/// Cheap to clone; immutable once constructed.
#[derive(Clone)]
pub struct ChaosContext {
    inner: Arc<ContextInner>,
}

impl ChaosContext {
    /// Build the context for one iteration. Called by the executor.
    pub fn new(
        scenario: impl Into<String>,
        iteration: u64,
        rng: ChaosRng,
        recorder: EventRecorder,
        logger: Logger,
        providers: ProviderTables,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                scenario: scenario.into(),
                iteration,
                enabled: true,
                rng,
                recorder,
                logger,
                providers,
                cancel,
            }),
        }
    }

    /// A detached context: every instrumentation call is a no-op.
    ///
    /// Lets instrumented user code run outside a chaos scenario.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                scenario: String::new(),
                iteration: 0,
                enabled: false,
                rng: ChaosRng::from_seed(0),
                recorder: EventRecorder::new(),
                logger: Logger::disabled(),
                providers: ProviderTables::default(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Derive a context sharing everything but the cancellation token.
    /// Used by supervisory step wrappers to hand the step body its own
    /// deadline-bearing token.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        let inner = &self.inner;
        Self {
            inner: Arc::new(ContextInner {
                scenario: inner.scenario.clone(),
                iteration: inner.iteration,
                enabled: inner.enabled,
                rng: inner.rng.clone(),
                recorder: inner.recorder.clone(),
                logger: inner.logger.clone(),
                providers: inner.providers.clone(),
                cancel,
            }),
        }
    }

    /// Scenario name.
    pub fn scenario(&self) -> &str {
        &self.inner.scenario
    }

    /// Zero-based iteration index.
    pub fn iteration(&self) -> u64 {
        self.inner.iteration
    }

    /// Whether this context is attached to a running scenario.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// The iteration RNG handle.
    pub fn rng(&self) -> &ChaosRng {
        &self.inner.rng
    }

    /// The structured-logger handle.
    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    /// The iteration event recorder.
    pub fn events(&self) -> &EventRecorder {
        &self.inner.recorder
    }

    /// The iteration cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Whether the iteration has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Consult the delay providers and sleep whatever they yield.
    ///
    /// Providers are visited in injector insertion order so draws stay
    /// deterministic. Sleeps end early if the iteration is cancelled.
    pub async fn maybe_delay(&self) {
        if !self.inner.enabled {
            return;
        }
        for provider in &self.inner.providers.delay {
            let (duration, applied) = provider.chaos_delay().await;
            if !applied || duration.is_zero() {
                continue;
            }
            debug!(
                scenario = %self.inner.scenario,
                iteration = self.inner.iteration,
                delay_ms = duration.as_millis() as u64,
                "injecting delay"
            );
            tokio::select! {
                _ = sleep(duration) => {}
                _ = self.inner.cancel.cancelled() => return,
            }
        }
    }

    /// Consult the panic providers and raise an unrecoverable failure if
    /// any of them says so. The executor recovers the panic, records the
    /// iteration as failed, and notifies panic-recording validators.
    pub fn maybe_panic(&self) {
        if !self.inner.enabled {
            return;
        }
        for provider in &self.inner.providers.panic {
            if provider.should_chaos_panic() {
                debug!(
                    scenario = %self.inner.scenario,
                    iteration = self.inner.iteration,
                    "raising chaos panic"
                );
                panic!(
                    "chaos panic injected (scenario '{}', iteration {})",
                    self.inner.scenario, self.inner.iteration
                );
            }
        }
    }

    /// Standalone coin toss against the iteration RNG. Always `false` on a
    /// detached context.
    pub fn should_fail(&self, probability: f64) -> bool {
        if !self.inner.enabled {
            return false;
        }
        self.inner.rng.random_bool(probability)
    }

    /// Consult the error providers; the first injected failure wins.
    pub fn maybe_error(&self) -> Result<()> {
        if !self.inner.enabled {
            return Ok(());
        }
        for provider in &self.inner.providers.error {
            if let Some(err) = provider.should_return_error() {
                debug!(
                    scenario = %self.inner.scenario,
                    iteration = self.inner.iteration,
                    error = %err,
                    "injecting error"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// Query the network providers for this host/port and apply their
    /// decisions: sleep any latency, then fail if a drop was decided.
    pub async fn maybe_network_chaos(&self, host: &str, port: u16) -> Result<()> {
        if !self.inner.enabled {
            return Ok(());
        }
        for provider in &self.inner.providers.network {
            if !provider.should_apply_chaos(host, port) {
                continue;
            }
            if let Some(latency) = provider.network_latency(host, port) {
                if !latency.is_zero() {
                    debug!(
                        host,
                        port,
                        latency_ms = latency.as_millis() as u64,
                        "injecting network latency"
                    );
                    tokio::select! {
                        _ = sleep(latency) => {}
                        _ = self.inner.cancel.cancelled() => {
                            return Err(ChaosError::Cancelled(format!(
                                "iteration {} cancelled during network latency",
                                self.inner.iteration
                            )));
                        }
                    }
                }
            }
            if provider.should_drop_connection(host, port) {
                debug!(host, port, "dropping connection");
                return Err(ChaosError::ConnectionDropped {
                    host: host.to_string(),
                    port,
                });
            }
        }
        Ok(())
    }

    /// Publish the caller's current recursion depth to the event recorder.
    pub fn record_recursion_depth(&self, depth: u32) {
        if !self.inner.enabled {
            return;
        }
        self.inner.recorder.record_recursion(depth);
    }
}
