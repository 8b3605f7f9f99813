//! ChaosForge core contracts
//!
//! Defines the pieces every other ChaosForge crate builds on: the chaos
//! context and its instrumentation points, the injector lifecycle and
//! capability traits, the validator model, the per-iteration event
//! recorder, the deterministic RNG handle, and the framework error type.
//!
//! Reference injectors live in `chaosforge-injectors`, reference
//! validators in `chaosforge-validators`, and the scenario builder,
//! executor, and reporter in the `chaosforge` crate.

pub mod collaborators;
pub mod context;
pub mod error;
pub mod events;
pub mod injector;
pub mod logger;
pub mod rng;
pub mod target;
pub mod validator;

pub use collaborators::{FailpointRuntime, FunctionPatcher, ProxyManager, Toxic};
pub use context::{ChaosContext, ProviderTables};
pub use error::{ChaosError, Result};
pub use events::{EventRecorder, PanicEvent, RecursionSample};
pub use injector::{
    CancellationProvider, DelayProvider, ErrorProvider, Injector, InjectorContext, InjectorState,
    Lifecycle, NetworkProvider, PanicProvider, SeedSink, StepHooks,
};
pub use logger::Logger;
pub use rng::ChaosRng;
pub use target::{Step, StepFn, StepFuture, StepOutcome, Target};
pub use validator::{
    PanicRecorder, RecursionRecorder, Resettable, Severity, StepWrapper, Validator,
    ValidatorOutcome,
};
