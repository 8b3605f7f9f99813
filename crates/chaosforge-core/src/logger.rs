//! Structured-logger handle threaded through the chaos context
//!
//! The handle wraps a [`tracing::Span`] carrying the scenario name and
//! iteration index. Without a subscriber installed every call is a no-op,
//! which is the executor's default.

/// Opaque structured-logger handle.
#[derive(Debug, Clone)]
pub struct Logger {
    span: tracing::Span,
}

impl Logger {
    /// Logger scoped to one iteration of a scenario.
    pub fn for_iteration(scenario: &str, iteration: u64) -> Self {
        Self {
            span: tracing::info_span!("chaos_iteration", scenario = %scenario, iteration),
        }
    }

    /// Logger scoped to the run as a whole (setup, injector lifecycle,
    /// teardown).
    pub fn for_run(scenario: &str) -> Self {
        Self {
            span: tracing::info_span!("chaos_run", scenario = %scenario),
        }
    }

    /// Disabled logger; every call is a no-op.
    pub fn disabled() -> Self {
        Self {
            span: tracing::Span::none(),
        }
    }

    /// The underlying span, for callers that want to enter it around their
    /// own tracing calls.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Log at debug level inside the handle's span.
    pub fn debug(&self, message: &str) {
        let _guard = self.span.enter();
        tracing::debug!("{message}");
    }

    /// Log at info level inside the handle's span.
    pub fn info(&self, message: &str) {
        let _guard = self.span.enter();
        tracing::info!("{message}");
    }

    /// Log at warn level inside the handle's span.
    pub fn warn(&self, message: &str) {
        let _guard = self.span.enter();
        tracing::warn!("{message}");
    }

    /// Log at error level inside the handle's span.
    pub fn error(&self, message: &str) {
        let _guard = self.span.enter();
        tracing::error!("{message}");
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}
