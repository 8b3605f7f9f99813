//! ChaosForge
//!
//! A chaos-engineering framework for in-process fault injection and
//! invariant validation. A scenario pairs a target under test with
//! ordered steps, injectors that perturb execution, and validators that
//! assert invariants; the executor runs it repeatedly and the reporter
//! turns the results into a pass / unstable / fail verdict.
//!
//! ```
//! use chaosforge::{new_scenario, Executor, ExecutorOptions, Thresholds, Verdict};
//! use chaosforge_core::Target;
//!
//! struct Checkout;
//!
//! #[async_trait::async_trait]
//! impl Target for Checkout {
//!     fn name(&self) -> &str {
//!         "checkout"
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scenario = new_scenario("smoke")
//!     .with_target(Checkout)
//!     .step("ping", |ctx, _target| async move {
//!         ctx.maybe_delay().await;
//!         Ok(())
//!     })
//!     .repeat(3)
//!     .build();
//!
//! let report = Executor::new(ExecutorOptions::default().with_seed(7))
//!     .run(&scenario)
//!     .await
//!     .expect("run completes");
//! assert_eq!(report.verdict(&Thresholds::default()), Verdict::Pass);
//! # }
//! ```

pub mod builder;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod scenario;
pub mod verdict;

pub use builder::{new_scenario, ScenarioBuilder, ScopeBuilder};
pub use executor::{Executor, ExecutorOptions, FailurePolicy};
pub use metrics::{InjectorMetrics, MetricsCollector, MetricsSnapshot};
pub use report::{IterationResult, Reporter, RunReport};
pub use scenario::{
    InjectorDescription, NamedInjector, Scenario, ScenarioDescription, ValidatorDescription,
};
pub use verdict::{Thresholds, Verdict};

// The contracts live in `chaosforge-core`; re-export the surface user
// code touches so a single dependency suffices for most scenarios.
pub use chaosforge_core::{
    ChaosContext, ChaosError, ChaosRng, EventRecorder, Injector, InjectorContext, InjectorState,
    Logger, PanicEvent, Result, Severity, Step, StepOutcome, Target, Validator, ValidatorOutcome,
};
