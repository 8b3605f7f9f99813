//! Fluent scenario construction
//!
//! ```
//! use chaosforge::builder::new_scenario;
//! use chaosforge_core::Target;
//!
//! struct Service;
//!
//! #[async_trait::async_trait]
//! impl Target for Service {
//!     fn name(&self) -> &str {
//!         "service"
//!     }
//! }
//!
//! let scenario = new_scenario("smoke")
//!     .with_target(Service)
//!     .step("ping", |_ctx, _target| async { Ok(()) })
//!     .repeat(3)
//!     .build();
//! assert_eq!(scenario.repeat(), 3);
//! ```

use crate::scenario::{NamedInjector, Scenario};
use chaosforge_core::{ChaosContext, Injector, Step, Target, Validator};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Start building a scenario. Alias for [`ScenarioBuilder::new`].
pub fn new_scenario(name: impl Into<String>) -> ScenarioBuilder {
    ScenarioBuilder::new(name)
}

/// Fluent builder for [`Scenario`].
///
/// Names must be unique within each category (steps, injectors,
/// validators); `build` panics on duplicates, on a missing target, and on
/// a zero repeat count, since all of these are programming errors in the
/// test definition itself.
pub struct ScenarioBuilder {
    name: String,
    target: Option<Arc<dyn Target>>,
    steps: Vec<Step>,
    injectors: Vec<NamedInjector>,
    validators: Vec<Arc<dyn Validator>>,
    repeat: u64,
    max_duration: Option<Duration>,
}

impl ScenarioBuilder {
    /// New builder for a scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            steps: Vec::new(),
            injectors: Vec::new(),
            validators: Vec::new(),
            repeat: 1,
            max_duration: None,
        }
    }

    /// Set the subject under test.
    pub fn with_target(mut self, target: impl Target + 'static) -> Self {
        self.target = Some(Arc::new(target));
        self
    }

    /// Set the subject under test from an existing handle.
    pub fn with_target_handle(mut self, target: Arc<dyn Target>) -> Self {
        self.target = Some(target);
        self
    }

    /// Append a named step.
    pub fn step<F, Fut>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ChaosContext, Arc<dyn Target>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.steps.push(Step::from_fn(name, func));
        self
    }

    /// Register an injector under its own name.
    pub fn inject(self, injector: impl Injector + 'static) -> Self {
        self.inject_arc(Arc::new(injector))
    }

    /// Register an already-shared injector.
    pub fn inject_arc(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injectors.push(NamedInjector::new(injector, None));
        self
    }

    /// Register a labeled group of injectors.
    ///
    /// Scopes are reporting-only: the injectors are flattened into the
    /// main insertion-ordered list with the label preserved for metrics.
    pub fn scope(mut self, label: impl Into<String>, f: impl FnOnce(ScopeBuilder) -> ScopeBuilder) -> Self {
        let scope = f(ScopeBuilder::new(label));
        let label = scope.label;
        for injector in scope.injectors {
            self.injectors
                .push(NamedInjector::new(injector, Some(label.clone())));
        }
        self
    }

    /// Register a validator under its own name.
    pub fn assert(self, validator: impl Validator + 'static) -> Self {
        self.assert_arc(Arc::new(validator))
    }

    /// Register an already-shared validator.
    pub fn assert_arc(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Set the iteration count. Must be at least 1.
    pub fn repeat(mut self, count: u64) -> Self {
        self.repeat = count;
        self
    }

    /// Bound the whole run's wall-clock duration; once hit, the current
    /// iteration is cancelled and the run winds down.
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Finish building.
    ///
    /// # Panics
    ///
    /// On a missing target, a zero repeat count, or a duplicate name
    /// within any category.
    pub fn build(self) -> Scenario {
        let target = self
            .target
            .unwrap_or_else(|| panic!("scenario '{}' has no target", self.name));
        assert!(
            self.repeat >= 1,
            "scenario '{}' must repeat at least once",
            self.name
        );

        ensure_unique(&self.name, "step", self.steps.iter().map(Step::name));
        ensure_unique(
            &self.name,
            "injector",
            self.injectors.iter().map(|entry| entry.injector().name()),
        );
        ensure_unique(
            &self.name,
            "validator",
            self.validators.iter().map(|validator| validator.name()),
        );

        Scenario::new(
            self.name,
            target,
            self.steps,
            self.injectors,
            self.validators,
            self.repeat,
            self.max_duration,
        )
    }
}

/// Builder for a labeled injector scope.
pub struct ScopeBuilder {
    label: String,
    injectors: Vec<Arc<dyn Injector>>,
}

impl ScopeBuilder {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            injectors: Vec::new(),
        }
    }

    /// Register an injector inside this scope.
    pub fn inject(self, injector: impl Injector + 'static) -> Self {
        self.inject_arc(Arc::new(injector))
    }

    /// Register an already-shared injector inside this scope.
    pub fn inject_arc(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injectors.push(injector);
        self
    }
}

fn ensure_unique<'a>(scenario: &str, category: &str, names: impl Iterator<Item = &'a str>) {
    let mut seen = HashSet::new();
    for name in names {
        assert!(
            seen.insert(name),
            "scenario '{scenario}' has a duplicate {category} name: '{name}'"
        );
    }
}
