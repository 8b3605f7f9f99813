//! Error types shared across the framework

use thiserror::Error;

/// Convenience alias used throughout the framework crates.
pub type Result<T, E = ChaosError> = std::result::Result<T, E>;

/// Chaos engineering errors
///
/// Each variant corresponds to one failure kind the executor knows how to
/// handle. Lower-level causes are flattened into the `reason` strings with
/// their scenario / step / injector context attached by the caller.
#[derive(Error, Debug)]
pub enum ChaosError {
    #[error("target setup failed: {0}")]
    SetupFailed(String),

    #[error("injector '{name}' failed to start: {reason}")]
    InjectFailed { name: String, reason: String },

    #[error("injector '{name}' precondition not met: {reason}")]
    PreconditionNotMet { name: String, reason: String },

    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A recovered panic, kept for logs and failure trails. The executor
    /// wraps it into `StepFailed` before recording, so iteration results
    /// always carry the `step-failed` kind.
    #[error("step '{step}' panicked: {payload}")]
    StepPanicked { step: String, payload: String },

    #[error("validator '{name}' failed: {reason}")]
    ValidatorFailed { name: String, reason: String },

    #[error("infinite loop detected: step '{step}' exceeded {timeout_ms}ms")]
    IterationTimeout { step: String, timeout_ms: u64 },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("target teardown failed: {0}")]
    TeardownFailed(String),

    #[error("injected fault: {0}")]
    InjectedFault(String),

    #[error("connection to {host}:{port} dropped by network chaos")]
    ConnectionDropped { host: String, port: u16 },

    #[error("lifecycle violation: {0}")]
    Lifecycle(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ChaosError {
    /// Stable machine-readable kind label, used in reports and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetupFailed(_) => "setup-failed",
            Self::InjectFailed { .. } => "inject-failed",
            Self::PreconditionNotMet { .. } => "precondition-not-met",
            Self::StepFailed { .. } => "step-failed",
            Self::StepPanicked { .. } => "step-panicked",
            Self::ValidatorFailed { .. } => "validator-failed",
            Self::IterationTimeout { .. } => "iteration-timeout",
            Self::Cancelled(_) => "cancelled",
            Self::TeardownFailed(_) => "teardown-failed",
            Self::InjectedFault(_) => "injected-fault",
            Self::ConnectionDropped { .. } => "connection-dropped",
            Self::Lifecycle(_) => "lifecycle",
            Self::Config(_) => "config",
        }
    }

    /// Whether this failure kind is non-fatal for the run as a whole.
    ///
    /// `precondition-not-met` reports that an injector could not activate
    /// (for example a missing external runtime); the remaining injectors
    /// still run.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::PreconditionNotMet { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        let err = ChaosError::StepFailed {
            step: "checkout".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.kind(), "step-failed");
        assert_eq!(
            ChaosError::IterationTimeout {
                step: "s".to_string(),
                timeout_ms: 100
            }
            .kind(),
            "iteration-timeout"
        );
    }

    #[test]
    fn display_includes_context() {
        let err = ChaosError::InjectFailed {
            name: "latency".to_string(),
            reason: "proxy unreachable".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("latency"));
        assert!(text.contains("proxy unreachable"));
    }

    #[test]
    fn precondition_is_non_fatal() {
        let err = ChaosError::PreconditionNotMet {
            name: "failpoint".to_string(),
            reason: "runtime disabled".to_string(),
        };
        assert!(err.is_precondition());
        assert!(!ChaosError::Cancelled("run".to_string()).is_precondition());
    }
}
