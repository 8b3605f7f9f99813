//! Injector lifecycle and capability contracts
//!
//! An injector always has a name and a monotonic lifecycle
//! (created → active → stopped). Everything else is optional capability:
//! the executor discovers providers, step hooks, and the seed sink through
//! the default-implemented accessors on [`Injector`] and builds the
//! per-iteration provider tables from whatever is present.

use crate::context::ChaosContext;
use crate::error::{ChaosError, Result};
use crate::logger::Logger;
use crate::rng::ChaosRng;
use crate::target::StepOutcome;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Injector lifecycle state. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectorState {
    /// Constructed, not yet started.
    Created,
    /// `inject` succeeded; providers and background tasks are live.
    Active,
    /// `stop` completed (or the injector was never started and was
    /// stopped anyway). Terminal.
    Stopped,
}

/// Lifecycle guard embedded by injector implementations.
///
/// Serializes state transitions under a per-injector lock: `inject` may
/// run once, `inject` after `stop` fails, double `stop` is a no-op.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<InjectorState>,
}

impl Lifecycle {
    /// New guard in the `Created` state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InjectorState::Created),
        }
    }

    /// Current state.
    pub fn state(&self) -> InjectorState {
        *self.state.lock()
    }

    /// Whether the injector is currently active.
    pub fn is_active(&self) -> bool {
        self.state() == InjectorState::Active
    }

    /// Transition created → active.
    pub fn begin_inject(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            InjectorState::Created => {
                *state = InjectorState::Active;
                Ok(())
            }
            InjectorState::Active => Err(ChaosError::Lifecycle(format!(
                "injector '{name}' is already active"
            ))),
            InjectorState::Stopped => Err(ChaosError::Lifecycle(format!(
                "injector '{name}' cannot be injected after stop"
            ))),
        }
    }

    /// Transition to stopped. Returns `true` if the injector was active
    /// and its teardown work should run; `false` means the stop was a
    /// no-op (never started, or already stopped).
    pub fn begin_stop(&self) -> bool {
        let mut state = self.state.lock();
        let was_active = *state == InjectorState::Active;
        *state = InjectorState::Stopped;
        was_active
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Run-level context handed to `inject` and `stop`.
#[derive(Debug, Clone)]
pub struct InjectorContext {
    /// Scenario the injector belongs to.
    pub scenario: String,
    /// Run-level RNG handle; iteration handles are re-bound through the
    /// seed-sink capability.
    pub rng: ChaosRng,
    /// Token cancelled when the run finishes; background tasks must tie
    /// their lifetime to it.
    pub cancel: CancellationToken,
    /// Structured-logger handle.
    pub logger: Logger,
}

impl InjectorContext {
    /// Build a lifecycle context for one run.
    pub fn new(scenario: impl Into<String>, rng: ChaosRng, cancel: CancellationToken) -> Self {
        let scenario = scenario.into();
        let logger = Logger::for_run(&scenario);
        Self {
            scenario,
            rng,
            cancel,
            logger,
        }
    }
}

/// Delay decisions offered to `maybe_delay`.
///
/// Must be cheap; interval-mode implementations may block briefly while
/// waiting for a delay window.
#[async_trait]
pub trait DelayProvider: Send + Sync {
    /// Returns the duration to sleep and whether a delay applies to this
    /// call.
    async fn chaos_delay(&self) -> (Duration, bool);
}

/// Panic decisions offered to `maybe_panic`.
pub trait PanicProvider: Send + Sync {
    /// `true` directs instrumented user code to raise an unrecoverable
    /// failure.
    fn should_chaos_panic(&self) -> bool;
}

/// Error decisions offered to instrumented fallible operations.
pub trait ErrorProvider: Send + Sync {
    /// Returns the failure to inject, or `None` to proceed normally.
    fn should_return_error(&self) -> Option<ChaosError>;
}

/// Per-host/port network decisions offered to `maybe_network_chaos`.
pub trait NetworkProvider: Send + Sync {
    /// Whether chaos applies to this host/port at all.
    fn should_apply_chaos(&self, host: &str, port: u16) -> bool;

    /// Extra latency to apply before the connection proceeds.
    fn network_latency(&self, host: &str, port: u16) -> Option<Duration>;

    /// Whether to sever the connection outright.
    fn should_drop_connection(&self, host: &str, port: u16) -> bool;
}

/// Derives per-iteration cancellation tokens that may be cancelled
/// asynchronously mid-iteration.
pub trait CancellationProvider: Send + Sync {
    /// Hand out a child of `parent`. Implementations that cancel the child
    /// from a background task must tie that task's lifetime to `parent` so
    /// it drains when the iteration finishes.
    fn chaos_token(&self, parent: &CancellationToken) -> CancellationToken;
}

/// Pre/post step hooks.
#[async_trait]
pub trait StepHooks: Send + Sync {
    /// Runs before the step body. May sleep or panic; a panic fails the
    /// step.
    async fn before_step(&self, ctx: &ChaosContext, step: &str);

    /// Notification after the step body with its outcome.
    async fn after_step(&self, ctx: &ChaosContext, outcome: &StepOutcome);
}

/// Accepts the iteration RNG so randomized decisions are reproducible.
///
/// The executor re-binds the handle at every iteration start.
pub trait SeedSink: Send + Sync {
    /// Replace the RNG the injector draws from.
    fn bind_rng(&self, rng: ChaosRng);
}

/// The injector contract.
///
/// `inject` and `stop` are reentrancy-safe and idempotent in the direction
/// of state; implementations route transitions through [`Lifecycle`].
#[async_trait]
pub trait Injector: Send + Sync {
    /// Injector name, unique within a scenario.
    fn name(&self) -> &str;

    /// Start the injector. Called once, before the first iteration.
    async fn inject(&self, ctx: &InjectorContext) -> Result<()>;

    /// Stop the injector and wait for its background tasks to exit.
    /// Stopping a stopped injector is a no-op.
    async fn stop(&self, ctx: &InjectorContext) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> InjectorState;

    /// Delay capability, if offered.
    fn delay_provider(&self) -> Option<Arc<dyn DelayProvider>> {
        None
    }

    /// Panic capability, if offered.
    fn panic_provider(&self) -> Option<Arc<dyn PanicProvider>> {
        None
    }

    /// Error capability, if offered.
    fn error_provider(&self) -> Option<Arc<dyn ErrorProvider>> {
        None
    }

    /// Network capability, if offered.
    fn network_provider(&self) -> Option<Arc<dyn NetworkProvider>> {
        None
    }

    /// Cancellation capability, if offered.
    fn cancellation_provider(&self) -> Option<Arc<dyn CancellationProvider>> {
        None
    }

    /// Step hooks, if offered.
    fn step_hooks(&self) -> Option<Arc<dyn StepHooks>> {
        None
    }

    /// Deterministic seed sink, if the injector draws randomized
    /// decisions.
    fn as_seed_sink(&self) -> Option<&dyn SeedSink> {
        None
    }

    /// Metrics snapshot, merged into the run report at stop time.
    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_monotonic() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), InjectorState::Created);

        lifecycle.begin_inject("x").expect("first inject");
        assert!(lifecycle.is_active());

        // Double inject fails.
        assert!(lifecycle.begin_inject("x").is_err());

        // First stop tears down, second is a no-op.
        assert!(lifecycle.begin_stop());
        assert!(!lifecycle.begin_stop());
        assert_eq!(lifecycle.state(), InjectorState::Stopped);

        // Inject after stop fails.
        assert!(lifecycle.begin_inject("x").is_err());
    }

    #[test]
    fn stop_before_inject_is_noop() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.begin_stop());
        assert_eq!(lifecycle.state(), InjectorState::Stopped);
        assert!(lifecycle.begin_inject("x").is_err());
    }
}
