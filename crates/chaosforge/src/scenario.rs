//! Immutable scenario description
//!
//! A scenario is a complete test description: the target, the ordered
//! steps, the named injectors (optionally carrying a scope label for
//! reporting), the named validators, the repeat count, and an optional
//! bound on the whole run. All mutation happens on the builder; once
//! built, a scenario only hands out read access.

use chaosforge_core::{Injector, Severity, Step, Target, Validator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// An injector registered in a scenario, with its optional scope label.
///
/// Scopes are purely organizational: they group injectors in reports and
/// metrics and have no effect on execution order.
#[derive(Clone)]
pub struct NamedInjector {
    injector: Arc<dyn Injector>,
    scope: Option<String>,
}

impl NamedInjector {
    pub(crate) fn new(injector: Arc<dyn Injector>, scope: Option<String>) -> Self {
        Self { injector, scope }
    }

    /// The injector itself.
    pub fn injector(&self) -> &Arc<dyn Injector> {
        &self.injector
    }

    /// Scope label, if the injector was registered inside a scope.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

/// Immutable scenario description. Built by
/// [`ScenarioBuilder`](crate::builder::ScenarioBuilder).
pub struct Scenario {
    name: String,
    target: Arc<dyn Target>,
    steps: Vec<Step>,
    injectors: Vec<NamedInjector>,
    validators: Vec<Arc<dyn Validator>>,
    repeat: u64,
    max_duration: Option<Duration>,
}

impl Scenario {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        target: Arc<dyn Target>,
        steps: Vec<Step>,
        injectors: Vec<NamedInjector>,
        validators: Vec<Arc<dyn Validator>>,
        repeat: u64,
        max_duration: Option<Duration>,
    ) -> Self {
        Self {
            name,
            target,
            steps,
            injectors,
            validators,
            repeat,
            max_duration,
        }
    }

    /// Scenario name, unique among the scenarios a harness runs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to the subject under test.
    pub fn target(&self) -> Arc<dyn Target> {
        Arc::clone(&self.target)
    }

    /// Ordered steps of one iteration.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Injectors in insertion order (scoped injectors flattened in).
    pub fn injectors(&self) -> &[NamedInjector] {
        &self.injectors
    }

    /// Validators in insertion order.
    pub fn validators(&self) -> &[Arc<dyn Validator>] {
        &self.validators
    }

    /// How many iterations to run.
    pub fn repeat(&self) -> u64 {
        self.repeat
    }

    /// Optional bound on the whole run's wall-clock duration.
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }

    /// Structural description of the scenario, without the closures.
    ///
    /// Two builds of the same scenario definition describe equal; the
    /// description also feeds reports and tooling.
    pub fn describe(&self) -> ScenarioDescription {
        ScenarioDescription {
            name: self.name.clone(),
            target: self.target.name().to_string(),
            steps: self.steps.iter().map(|s| s.name().to_string()).collect(),
            injectors: self
                .injectors
                .iter()
                .map(|entry| InjectorDescription {
                    name: entry.injector().name().to_string(),
                    scope: entry.scope().map(str::to_string),
                })
                .collect(),
            validators: self
                .validators
                .iter()
                .map(|validator| ValidatorDescription {
                    name: validator.name().to_string(),
                    severity: validator.severity(),
                })
                .collect(),
            repeat: self.repeat,
            max_duration_ms: self.max_duration.map(|d| d.as_millis() as u64),
        }
    }
}

/// Serializable structural view of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDescription {
    /// Scenario name.
    pub name: String,
    /// Target name.
    pub target: String,
    /// Step names in order.
    pub steps: Vec<String>,
    /// Injector names and scope labels in insertion order.
    pub injectors: Vec<InjectorDescription>,
    /// Validator names and severities in insertion order.
    pub validators: Vec<ValidatorDescription>,
    /// Iteration count.
    pub repeat: u64,
    /// Run bound in milliseconds, if configured.
    pub max_duration_ms: Option<u64>,
}

/// One injector entry in a [`ScenarioDescription`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectorDescription {
    /// Injector name.
    pub name: String,
    /// Scope label, if any.
    pub scope: Option<String>,
}

/// One validator entry in a [`ScenarioDescription`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDescription {
    /// Validator name.
    pub name: String,
    /// Declared severity.
    pub severity: Severity,
}
