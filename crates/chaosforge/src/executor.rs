//! Scenario executor
//!
//! Drives a scenario from setup to verdict-ready results: target setup,
//! injector start in insertion order, the per-iteration loop (validator
//! reset, hook-wrapped step execution with panic recovery, event fan-out,
//! validator evaluation), injector stop in reverse order, and teardown.
//! Every iteration owns an RNG seeded from the run seed and the iteration
//! index, so identical seeds replay identical chaos decisions.

use crate::metrics::MetricsCollector;
use crate::report::{IterationResult, Reporter, RunReport};
use crate::scenario::Scenario;
use chaosforge_core::{
    ChaosContext, ChaosError, ChaosRng, EventRecorder, InjectorContext, InjectorState, Logger,
    ProviderTables, Result, Severity, StepHooks, StepOutcome, ValidatorOutcome,
};
use futures::FutureExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a failing iteration does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failing iteration aborts the run; later iterations are
    /// skipped.
    FailFast,
    /// Run every iteration and accumulate failures.
    #[default]
    ContinueOnFailure,
}

/// Executor configuration.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Failure policy.
    pub failure_policy: FailurePolicy,
    /// Run seed; generated and recorded when absent.
    pub seed: Option<u64>,
}

impl ExecutorOptions {
    /// Set the failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Pin the run seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// The repeat-iteration scheduler.
pub struct Executor {
    options: ExecutorOptions,
}

impl Executor {
    /// Executor with the given options.
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    /// Executor with default options.
    pub fn with_defaults() -> Self {
        Self::new(ExecutorOptions::default())
    }

    /// Run the scenario to completion.
    ///
    /// Returns `Err` only when target setup or an injector start fails;
    /// iteration failures live in the report, which distinguishes a
    /// fail-fast abort via [`RunReport::aborted_early`].
    pub async fn run(&self, scenario: &Scenario) -> Result<RunReport> {
        let seed = self.options.seed.unwrap_or_else(|| rand::rng().random());
        let run_logger = Logger::for_run(scenario.name());
        let metrics = MetricsCollector::new();
        let reporter = Reporter::new(scenario.name(), seed);
        let mut diagnostics: Vec<String> = Vec::new();

        let run_cancel = CancellationToken::new();
        let run_rng = ChaosRng::from_seed(seed);
        let injector_ctx =
            InjectorContext::new(scenario.name(), run_rng.clone(), run_cancel.clone());

        // 1. Target setup. Failure aborts the run without teardown.
        info!(scenario = scenario.name(), seed, "setting up target");
        let target = scenario.target();
        match AssertUnwindSafe(target.setup()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(scenario = scenario.name(), error = %err, "target setup failed");
                return Err(ChaosError::SetupFailed(format!("{err:#}")));
            }
            Err(payload) => {
                let payload = panic_payload(payload.as_ref());
                error!(scenario = scenario.name(), payload = %payload, "target setup panicked");
                return Err(ChaosError::SetupFailed(format!("setup panicked: {payload}")));
            }
        }

        // 2. Start injectors in insertion order. A failure stops what
        // already started (reverse order) and tears the target down.
        let mut started: Vec<usize> = Vec::new();
        for (index, entry) in scenario.injectors().iter().enumerate() {
            let injector = entry.injector();
            debug!(injector = injector.name(), "starting injector");
            let failed: Option<String> =
                match AssertUnwindSafe(injector.inject(&injector_ctx)).catch_unwind().await {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) if err.is_precondition() => {
                        warn!(injector = injector.name(), error = %err, "injector skipped");
                        diagnostics.push(format!("injector '{}' skipped: {err}", injector.name()));
                        None
                    }
                    Ok(Err(err)) => Some(err.to_string()),
                    Err(payload) => {
                        Some(format!("inject panicked: {}", panic_payload(payload.as_ref())))
                    }
                };
            if let Some(reason) = failed {
                error!(injector = injector.name(), reason = %reason, "injector failed to start");
                self.stop_injectors(scenario, &started, &injector_ctx, &mut diagnostics).await;
                self.teardown(&target, &run_logger, &mut diagnostics).await;
                return Err(ChaosError::InjectFailed {
                    name: injector.name().to_string(),
                    reason,
                });
            }
            if injector.state() == InjectorState::Active {
                started.push(index);
            }
        }

        // Optional bound on the whole run.
        let watchdog = scenario.max_duration().map(|limit| {
            let token = run_cancel.clone();
            let scenario_name = scenario.name().to_string();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(scenario = %scenario_name, "run duration limit hit, cancelling");
                token.cancel();
            })
        });

        // 3. The iteration loop.
        for index in 0..scenario.repeat() {
            if run_cancel.is_cancelled() {
                diagnostics.push(format!("run cancelled before iteration {index}"));
                reporter.mark_aborted();
                break;
            }
            let result = self
                .run_iteration(scenario, index, seed, &run_cancel)
                .await;
            let iteration_failed = !result.success;
            metrics.record_iteration(&result);
            reporter.record(result);
            if iteration_failed && self.options.failure_policy == FailurePolicy::FailFast {
                info!(scenario = scenario.name(), iteration = index, "fail-fast tripped");
                reporter.mark_aborted();
                break;
            }
        }

        if let Some(handle) = watchdog {
            handle.abort();
        }

        // 4. Stop injectors in reverse insertion order; snapshot their
        // metrics either way.
        self.stop_injectors(scenario, &started, &injector_ctx, &mut diagnostics).await;
        for entry in scenario.injectors() {
            metrics.record_injector(
                entry.injector().name(),
                entry.scope(),
                entry.injector().metrics(),
            );
        }
        for validator in scenario.validators() {
            metrics.record_validator(validator.name(), validator.metrics());
        }

        // 5. Teardown. Failure is reported, never fatal.
        self.teardown(&target, &run_logger, &mut diagnostics).await;

        Ok(reporter.finish(metrics.snapshot(), diagnostics))
    }

    async fn run_iteration(
        &self,
        scenario: &Scenario,
        index: u64,
        seed: u64,
        run_cancel: &CancellationToken,
    ) -> IterationResult {
        let iteration_started = Instant::now();
        let rng = ChaosRng::for_iteration(seed, index);
        let recorder = EventRecorder::new();
        let logger = Logger::for_iteration(scenario.name(), index);

        // Injectors drawing randomized decisions re-bind to the iteration
        // stream, keeping observable behavior a pure function of the seed.
        for entry in scenario.injectors() {
            if let Some(sink) = entry.injector().as_seed_sink() {
                sink.bind_rng(rng.clone());
            }
        }

        // Scope token: cancelled at iteration end so chaos cancellers
        // drain; cancellation providers derive the chain below it.
        let iteration_scope = run_cancel.child_token();
        let mut iteration_token = iteration_scope.clone();
        for entry in scenario.injectors() {
            if let Some(provider) = entry.injector().cancellation_provider() {
                iteration_token = provider.chaos_token(&iteration_token);
            }
        }

        let providers =
            ProviderTables::from_injectors(scenario.injectors().iter().map(|e| e.injector()));
        let ctx = ChaosContext::new(
            scenario.name(),
            index,
            rng,
            recorder.clone(),
            logger,
            providers,
            iteration_token,
        );

        // Validator reset runs strictly before the first step.
        let mut reset_failures: Vec<ValidatorOutcome> = Vec::new();
        for validator in scenario.validators() {
            if let Some(resettable) = validator.as_resettable() {
                if let Err(payload) =
                    std::panic::catch_unwind(AssertUnwindSafe(|| resettable.reset()))
                {
                    let payload = panic_payload(payload.as_ref());
                    error!(validator = validator.name(), payload = %payload, "validator reset panicked");
                    reset_failures.push(ValidatorOutcome::failed(
                        validator.name(),
                        Severity::Warning,
                        format!("reset panicked: {payload}"),
                    ));
                }
            }
        }

        let target = scenario.target();
        let hooks: Vec<Arc<dyn StepHooks>> = scenario
            .injectors()
            .iter()
            .filter_map(|entry| entry.injector().step_hooks())
            .collect();

        let mut success = true;
        let mut failure: Option<ChaosError> = None;

        for step in scenario.steps() {
            if ctx.is_cancelled() {
                success = false;
                failure.get_or_insert_with(|| {
                    ChaosError::Cancelled(format!("iteration {index} cancelled"))
                });
                break;
            }

            // Step-wrapping validators decorate the step; the first
            // wrapper in insertion order ends up outermost.
            let mut effective = step.clone();
            for validator in scenario.validators().iter().rev() {
                if let Some(wrapper) = validator.as_step_wrapper() {
                    effective = wrapper.wrap_step(effective);
                }
            }

            let step_started = Instant::now();
            let raced: std::result::Result<anyhow::Result<()>, Box<dyn Any + Send>> = {
                let body = async {
                    for hook in &hooks {
                        hook.before_step(&ctx, step.name()).await;
                    }
                    effective.call(ctx.clone(), Arc::clone(&target)).await
                };
                tokio::select! {
                    result = AssertUnwindSafe(body).catch_unwind() => result,
                    _ = ctx.cancellation().cancelled() => Ok(Err(ChaosError::Cancelled(
                        format!("iteration {index} cancelled in step '{}'", step.name()),
                    )
                    .into())),
                }
            };
            let step_duration = step_started.elapsed();

            let outcome = match raced {
                Ok(Ok(())) => StepOutcome::success(step.name(), step_duration),
                Ok(Err(err)) => {
                    let chaos = match err.downcast::<ChaosError>() {
                        Ok(chaos) => chaos,
                        Err(other) => ChaosError::StepFailed {
                            step: step.name().to_string(),
                            reason: format!("{other:#}"),
                        },
                    };
                    warn!(step = step.name(), error = %chaos, "step failed");
                    let outcome =
                        StepOutcome::failure(step.name(), chaos.to_string(), step_duration);
                    success = false;
                    failure.get_or_insert(chaos);
                    outcome
                }
                Err(payload) => {
                    let payload = panic_payload(payload.as_ref());
                    let panicked = ChaosError::StepPanicked {
                        step: step.name().to_string(),
                        payload: payload.clone(),
                    };
                    error!(step = step.name(), error = %panicked, "step panicked, recovered");
                    recorder.record_panic(payload, Some(step.name().to_string()));
                    // Structured failures, caught panics, and instrumented
                    // maybe_panic calls all converge to step-failed in
                    // results; the panic survives as an event and in the
                    // failure reason.
                    let chaos = ChaosError::StepFailed {
                        step: step.name().to_string(),
                        reason: panicked.to_string(),
                    };
                    let outcome =
                        StepOutcome::failure(step.name(), chaos.to_string(), step_duration);
                    success = false;
                    failure.get_or_insert(chaos);
                    outcome
                }
            };

            // Post-step hooks run in reverse order; a panicking hook is
            // contained and logged.
            for hook in hooks.iter().rev() {
                if AssertUnwindSafe(hook.after_step(&ctx, &outcome))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!(step = step.name(), "post-step hook panicked");
                }
            }

            if !outcome.success && self.options.failure_policy == FailurePolicy::FailFast {
                break;
            }
        }

        // Fan recorded events out to the recorder capabilities before
        // validators evaluate.
        for event in recorder.panics() {
            for validator in scenario.validators() {
                if let Some(panic_recorder) = validator.as_panic_recorder() {
                    panic_recorder.on_panic_recovered(&event);
                }
            }
        }
        for sample in recorder.recursion_samples() {
            for validator in scenario.validators() {
                if let Some(recursion_recorder) = validator.as_recursion_recorder() {
                    recursion_recorder.on_recursion_depth(sample.depth);
                }
            }
        }

        // Every validator runs, in insertion order.
        let mut outcomes = Vec::with_capacity(scenario.validators().len());
        for validator in scenario.validators() {
            let outcome = match AssertUnwindSafe(validator.validate(&ctx, target.as_ref()))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => ValidatorOutcome::passed(validator.name(), validator.severity()),
                Ok(Err(err)) => {
                    ValidatorOutcome::failed(validator.name(), validator.severity(), format!("{err:#}"))
                }
                Err(payload) => {
                    let payload = panic_payload(payload.as_ref());
                    error!(validator = validator.name(), payload = %payload, "validator panicked");
                    ValidatorOutcome::failed(
                        validator.name(),
                        Severity::Warning,
                        format!("validator panicked: {payload}"),
                    )
                }
            };
            if !outcome.passed && outcome.severity == Severity::Critical {
                success = false;
                failure.get_or_insert_with(|| ChaosError::ValidatorFailed {
                    name: outcome.name.clone(),
                    reason: outcome.message.clone().unwrap_or_default(),
                });
            }
            outcomes.push(outcome);
        }
        outcomes.extend(reset_failures);

        // Drain armed cancellers; the context is dropped right after.
        iteration_scope.cancel();

        IterationResult {
            scenario: scenario.name().to_string(),
            iteration: index,
            success,
            duration: iteration_started.elapsed(),
            error_kind: failure.as_ref().map(|f| f.kind().to_string()),
            error: failure.map(|f| f.to_string()),
            validator_outcomes: outcomes,
            panics_recovered: recorder.panic_count() as u64,
        }
    }

    async fn stop_injectors(
        &self,
        scenario: &Scenario,
        started: &[usize],
        injector_ctx: &InjectorContext,
        diagnostics: &mut Vec<String>,
    ) {
        for &index in started.iter().rev() {
            let injector = scenario.injectors()[index].injector();
            if injector.state() != InjectorState::Active {
                continue;
            }
            debug!(injector = injector.name(), "stopping injector");
            match AssertUnwindSafe(injector.stop(injector_ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(injector = injector.name(), error = %err, "injector stop failed");
                    diagnostics.push(format!("injector '{}' stop failed: {err}", injector.name()));
                }
                Err(payload) => {
                    let payload = panic_payload(payload.as_ref());
                    error!(injector = injector.name(), payload = %payload, "injector stop panicked");
                    diagnostics.push(format!(
                        "injector '{}' stop panicked: {payload}",
                        injector.name()
                    ));
                }
            }
        }
    }

    async fn teardown(
        &self,
        target: &Arc<dyn chaosforge_core::Target>,
        run_logger: &Logger,
        diagnostics: &mut Vec<String>,
    ) {
        run_logger.info("tearing down target");
        match AssertUnwindSafe(target.teardown()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(error = %err, "target teardown failed");
                diagnostics.push(ChaosError::TeardownFailed(format!("{err:#}")).to_string());
            }
            Err(payload) => {
                let payload = panic_payload(payload.as_ref());
                error!(payload = %payload, "target teardown panicked");
                diagnostics
                    .push(ChaosError::TeardownFailed(format!("teardown panicked: {payload}")).to_string());
            }
        }
    }
}

/// Render a recovered panic payload.
fn panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_renders_both_string_kinds() {
        let boxed: Box<dyn Any + Send> = Box::new("static panic");
        assert_eq!(panic_payload(boxed.as_ref()), "static panic");

        let boxed: Box<dyn Any + Send> = Box::new("owned panic".to_string());
        assert_eq!(panic_payload(boxed.as_ref()), "owned panic");

        let boxed: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_payload(boxed.as_ref()), "opaque panic payload");
    }

    #[test]
    fn options_builders_compose() {
        let options = ExecutorOptions::default()
            .with_policy(FailurePolicy::FailFast)
            .with_seed(0xC0FFEE);
        assert_eq!(options.failure_policy, FailurePolicy::FailFast);
        assert_eq!(options.seed, Some(0xC0FFEE));
    }
}
