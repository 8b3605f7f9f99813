//! Loop-timeout validator: supervised step execution
//!
//! Wraps each step so its body runs on a separate task under a deadline.
//! On deadline the wrapper records a detection, cancels the step's derived
//! token, waits a short grace window for the body to notice, and returns
//! an iteration-timeout failure whether or not the body ever finishes. A
//! body that ignores cancellation keeps running as a detached task; the
//! framework does not force-kill it, which is an accepted limit the
//! task-count validator exists to observe.

use async_trait::async_trait;
use chaosforge_core::{
    ChaosContext, ChaosError, Resettable, Severity, Step, StepFuture, StepWrapper, Target,
    Validator,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::error;

/// Grace window granted to a timed-out step before the wrapper gives up
/// on it.
const GRACE_WINDOW: Duration = Duration::from_millis(100);

struct LoopTimeoutState {
    timeout: Duration,
    detections_total: AtomicU64,
    tripped_step: Mutex<Option<String>>,
}

/// Detects hung steps by supervising their execution under a deadline.
pub struct LoopTimeoutValidator {
    name: String,
    severity: Severity,
    state: Arc<LoopTimeoutState>,
}

impl LoopTimeoutValidator {
    /// Critical-severity validator named `loop_timeout`.
    pub fn new(step_timeout: Duration) -> Self {
        Self {
            name: "loop_timeout".to_string(),
            severity: Severity::Critical,
            state: Arc::new(LoopTimeoutState {
                timeout: step_timeout,
                detections_total: AtomicU64::new(0),
                tripped_step: Mutex::new(None),
            }),
        }
    }

    /// Override the validator name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Detections across the whole run.
    pub fn detections_total(&self) -> u64 {
        self.state.detections_total.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Validator for LoopTimeoutValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn validate(&self, _ctx: &ChaosContext, _target: &dyn Target) -> anyhow::Result<()> {
        let tripped = self.state.tripped_step.lock().clone();
        match tripped {
            Some(step) => anyhow::bail!(
                "step '{step}' exceeded the {}ms loop timeout",
                self.state.timeout.as_millis()
            ),
            None => Ok(()),
        }
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        Some(self)
    }

    fn as_step_wrapper(&self) -> Option<&dyn StepWrapper> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "loop_timeouts_detected".to_string(),
            self.state.detections_total.load(Ordering::Relaxed).into(),
        )])
    }
}

impl Resettable for LoopTimeoutValidator {
    fn reset(&self) {
        *self.state.tripped_step.lock() = None;
    }
}

impl StepWrapper for LoopTimeoutValidator {
    fn wrap_step(&self, step: Step) -> Step {
        let state = Arc::clone(&self.state);
        let step_name = step.name().to_string();
        Step::new(
            step_name.clone(),
            Arc::new(move |ctx: ChaosContext, target| {
                let state = Arc::clone(&state);
                let step = step.clone();
                let step_name = step_name.clone();
                let fut: StepFuture = Box::pin(async move {
                    // The body gets its own deadline-bearing token so a
                    // cooperative step can notice the timeout.
                    let deadline = ctx.cancellation().child_token();
                    let body_ctx = ctx.with_cancellation(deadline.clone());
                    let mut handle = tokio::spawn(step.call(body_ctx, target));

                    match timeout(state.timeout, &mut handle).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(join_err)) => {
                            if join_err.is_panic() {
                                std::panic::resume_unwind(join_err.into_panic());
                            }
                            Err(anyhow::anyhow!("supervised step task was aborted"))
                        }
                        Err(_) => {
                            state.detections_total.fetch_add(1, Ordering::Relaxed);
                            *state.tripped_step.lock() = Some(step_name.clone());
                            error!(
                                step = %step_name,
                                timeout_ms = state.timeout.as_millis() as u64,
                                "possible infinite loop detected"
                            );
                            deadline.cancel();
                            // Give the body a moment to observe the
                            // cancellation; a body that never does stays
                            // running as a detached task.
                            let _ = timeout(GRACE_WINDOW, &mut handle).await;
                            Err(ChaosError::IterationTimeout {
                                step: step_name,
                                timeout_ms: state.timeout.as_millis() as u64,
                            }
                            .into())
                        }
                    }
                });
                fut
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    struct NullTarget;

    #[async_trait]
    impl Target for NullTarget {
        fn name(&self) -> &str {
            "null"
        }
    }

    fn target() -> Arc<dyn Target> {
        Arc::new(NullTarget)
    }

    #[tokio::test]
    async fn fast_step_is_untouched() {
        let validator = LoopTimeoutValidator::new(Duration::from_millis(500));
        let step = Step::from_fn("quick", |_ctx, _target| async { Ok(()) });
        let wrapped = validator.wrap_step(step);

        let result = wrapped.call(ChaosContext::disabled(), target()).await;
        assert!(result.is_ok());
        assert_eq!(validator.detections_total(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hanging_step_is_detected() {
        let validator = LoopTimeoutValidator::new(Duration::from_millis(50));
        let step = Step::from_fn("hang", |_ctx, _target| async {
            sleep(Duration::from_millis(2_000)).await;
            Ok(())
        });
        let wrapped = validator.wrap_step(step);

        let err = wrapped
            .call(ChaosContext::disabled(), target())
            .await
            .expect_err("deadline must trip");
        let chaos = err.downcast_ref::<ChaosError>().expect("typed failure");
        assert_eq!(chaos.kind(), "iteration-timeout");
        assert_eq!(validator.detections_total(), 1);

        // The trip is visible to validation until reset.
        let ctx = ChaosContext::disabled();
        assert!(validator.validate(&ctx, &NullTarget).await.is_err());
        validator.reset();
        assert!(validator.validate(&ctx, &NullTarget).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cooperative_step_sees_the_deadline() {
        let validator = LoopTimeoutValidator::new(Duration::from_millis(50));
        let step = Step::from_fn("cooperative", |ctx: ChaosContext, _target| async move {
            ctx.cancellation().cancelled().await;
            Ok(())
        });
        let wrapped = validator.wrap_step(step);

        // Build an enabled context so the derived token is observable.
        let ctx = ChaosContext::disabled();
        let err = wrapped.call(ctx, target()).await.expect_err("still a timeout");
        assert!(err.to_string().contains("exceeded"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_step_propagates_its_payload() {
        let validator = LoopTimeoutValidator::new(Duration::from_millis(500));
        let step = Step::from_fn("explode", |_ctx, _target| async {
            panic!("chaos panic injected");
        });
        let wrapped = validator.wrap_step(step);

        let outcome = futures::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(
            wrapped.call(ChaosContext::disabled(), target()),
        ))
        .await;
        let payload = outcome.expect_err("panic must propagate");
        let text = payload
            .downcast_ref::<&str>()
            .copied()
            .map(str::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        assert!(text.contains("chaos panic injected"));
    }
}
