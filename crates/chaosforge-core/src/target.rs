//! Subject-under-test contract and step types

use crate::context::ChaosContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The subject under test.
///
/// `setup` runs once before the first iteration; `teardown` once after the
/// last. Setup failure aborts the scenario; teardown failure is reported
/// but not fatal.
#[async_trait]
pub trait Target: Send + Sync {
    /// Human-readable target name, used in reports.
    fn name(&self) -> &str;

    /// Prepare the target. Called once before the first iteration.
    async fn setup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Tear the target down. Called once after the last iteration.
    async fn teardown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Boxed step future, `'static` so supervisory wrappers can spawn it.
pub type StepFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Boxed step function: `(context, target) -> result-or-failure`.
pub type StepFn = Arc<dyn Fn(ChaosContext, Arc<dyn Target>) -> StepFuture + Send + Sync>;

/// A named, ordered operation within an iteration.
#[derive(Clone)]
pub struct Step {
    name: String,
    func: StepFn,
}

impl Step {
    /// Create a step from an already-boxed step function.
    pub fn new(name: impl Into<String>, func: StepFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    /// Create a step from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ChaosContext, Arc<dyn Target>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(
            name,
            Arc::new(move |ctx, target| {
                let fut: StepFuture = Box::pin(func(ctx, target));
                fut
            }),
        )
    }

    /// Step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute the step body under the given iteration context.
    pub fn call(&self, ctx: ChaosContext, target: Arc<dyn Target>) -> StepFuture {
        (self.func)(ctx, target)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// Result of one step execution, handed to post-step hooks and recorded in
/// iteration results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step name.
    pub step: String,
    /// Whether the step returned success.
    pub success: bool,
    /// Failure description, when the step failed.
    pub error: Option<String>,
    /// Wall-clock duration of the step body.
    pub duration: Duration,
}

impl StepOutcome {
    /// Successful outcome.
    pub fn success(step: impl Into<String>, duration: Duration) -> Self {
        Self {
            step: step.into(),
            success: true,
            error: None,
            duration,
        }
    }

    /// Failed outcome.
    pub fn failure(step: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            step: step.into(),
            success: false,
            error: Some(error.into()),
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChaosContext;

    struct NullTarget;

    #[async_trait]
    impl Target for NullTarget {
        fn name(&self) -> &str {
            "null"
        }
    }

    #[tokio::test]
    async fn step_runs_closure() {
        let step = Step::from_fn("noop", |_ctx, _target| async { Ok(()) });
        assert_eq!(step.name(), "noop");

        let target: Arc<dyn Target> = Arc::new(NullTarget);
        let result = step.call(ChaosContext::disabled(), target).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn default_lifecycle_hooks_succeed() {
        let target = NullTarget;
        assert!(target.setup().await.is_ok());
        assert!(target.teardown().await.is_ok());
    }

    #[test]
    fn outcome_constructors() {
        let ok = StepOutcome::success("a", Duration::from_millis(5));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let bad = StepOutcome::failure("b", "boom", Duration::ZERO);
        assert!(!bad.success);
        assert_eq!(bad.error.as_deref(), Some("boom"));
    }
}
