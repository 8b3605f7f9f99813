//! Failpoint-backed injection
//!
//! Drives a failpoint runtime through the
//! [`FailpointRuntime`](chaosforge_core::FailpointRuntime) contract. At
//! `inject` time the injector probes a sentinel failpoint; if the runtime
//! refuses (not compiled in), the injector reports a
//! precondition-not-met failure, which the executor treats as non-fatal:
//! the scenario still runs with the remaining injectors.

use async_trait::async_trait;
use chaosforge_core::{
    ChaosError, FailpointRuntime, Injector, InjectorContext, InjectorState, Lifecycle, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sentinel failpoint used to probe whether the runtime is available.
const PROBE_FAILPOINT: &str = "chaosforge/probe";

/// One failpoint to enable for the duration of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailpointSpec {
    /// Failpoint name as known to the runtime.
    pub name: String,
    /// String-encoded action, e.g. `return`, `panic`, `sleep(100)`.
    pub action: String,
}

/// Failpoint injector configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FailpointConfig {
    /// Failpoints enabled at inject time and disabled at stop.
    pub failpoints: Vec<FailpointSpec>,
}

/// Reference failpoint injector.
pub struct FailpointInjector {
    name: String,
    lifecycle: Lifecycle,
    runtime: Arc<dyn FailpointRuntime>,
    config: FailpointConfig,
}

impl FailpointInjector {
    /// Create a failpoint injector named `failpoint`.
    pub fn new(runtime: Arc<dyn FailpointRuntime>, config: FailpointConfig) -> Self {
        Self {
            name: "failpoint".to_string(),
            lifecycle: Lifecycle::new(),
            runtime,
            config,
        }
    }

    /// Override the injector name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Injector for FailpointInjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, ctx: &InjectorContext) -> Result<()> {
        // Probe before touching lifecycle so a refused runtime leaves the
        // injector stoppable as a no-op.
        if let Err(err) = self.runtime.enable(PROBE_FAILPOINT, "off") {
            warn!(injector = %self.name, error = %err, "failpoint runtime unavailable");
            return Err(ChaosError::PreconditionNotMet {
                name: self.name.clone(),
                reason: format!("failpoint runtime refused the probe: {err}"),
            });
        }
        let _ = self.runtime.disable(PROBE_FAILPOINT);

        self.lifecycle.begin_inject(&self.name)?;
        for spec in &self.config.failpoints {
            self.runtime
                .enable(&spec.name, &spec.action)
                .map_err(|err| ChaosError::InjectFailed {
                    name: self.name.clone(),
                    reason: format!("enabling failpoint '{}' failed: {err}", spec.name),
                })?;
            debug!(failpoint = %spec.name, action = %spec.action, "failpoint enabled");
        }
        ctx.logger.debug("failpoint injector active");
        Ok(())
    }

    async fn stop(&self, _ctx: &InjectorContext) -> Result<()> {
        if !self.lifecycle.begin_stop() {
            return Ok(());
        }
        for spec in self.config.failpoints.iter().rev() {
            if let Err(err) = self.runtime.disable(&spec.name) {
                warn!(failpoint = %spec.name, error = %err, "failpoint disable failed");
            }
        }
        Ok(())
    }

    fn state(&self) -> InjectorState {
        self.lifecycle.state()
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "failpoints_configured".to_string(),
            (self.config.failpoints.len() as u64).into(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosforge_core::ChaosRng;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    /// In-memory runtime recording enable/disable calls.
    struct FakeRuntime {
        available: bool,
        log: Mutex<Vec<String>>,
    }

    impl FakeRuntime {
        fn new(available: bool) -> Self {
            Self {
                available,
                log: Mutex::new(Vec::new()),
            }
        }
    }

    impl FailpointRuntime for FakeRuntime {
        fn enable(&self, name: &str, action: &str) -> Result<()> {
            if !self.available {
                return Err(ChaosError::PreconditionNotMet {
                    name: name.to_string(),
                    reason: "runtime disabled".to_string(),
                });
            }
            self.log.lock().push(format!("enable {name}={action}"));
            Ok(())
        }

        fn disable(&self, name: &str) -> Result<()> {
            if self.available {
                self.log.lock().push(format!("disable {name}"));
            }
            Ok(())
        }
    }

    fn injector_ctx() -> InjectorContext {
        InjectorContext::new("test", ChaosRng::from_seed(1), CancellationToken::new())
    }

    fn config() -> FailpointConfig {
        FailpointConfig {
            failpoints: vec![FailpointSpec {
                name: "storage/write".to_string(),
                action: "return".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn enables_and_disables_configured_failpoints() {
        let runtime = Arc::new(FakeRuntime::new(true));
        let injector = FailpointInjector::new(Arc::clone(&runtime) as Arc<dyn FailpointRuntime>, config());
        let ctx = injector_ctx();

        injector.inject(&ctx).await.expect("inject");
        injector.stop(&ctx).await.expect("stop");

        let log = runtime.log.lock().clone();
        assert_eq!(
            log,
            vec![
                "enable chaosforge/probe=off",
                "disable chaosforge/probe",
                "enable storage/write=return",
                "disable storage/write",
            ]
        );
    }

    #[tokio::test]
    async fn missing_runtime_reports_precondition_not_met() {
        let runtime = Arc::new(FakeRuntime::new(false));
        let injector = FailpointInjector::new(runtime, config());
        let ctx = injector_ctx();

        let err = injector.inject(&ctx).await.expect_err("probe refused");
        assert!(err.is_precondition());
        assert_eq!(injector.state(), InjectorState::Created);

        // Stop on the never-started injector stays a no-op.
        injector.stop(&ctx).await.expect("stop is a no-op");
    }
}
