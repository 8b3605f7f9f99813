//! Configuration records for the reference injectors

use serde::{Deserialize, Serialize};

/// How the delay injector decides when a delay applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelayMode {
    /// Each `maybe_delay` call draws independently against `probability`.
    Probability,
    /// A background ticker opens a delay window every `interval_ms`; the
    /// window stays claimable for `window_ms` (plus a small slack) and at
    /// most one waiter consumes it.
    Interval {
        /// Tick period in milliseconds.
        interval_ms: u64,
        /// How long an opened window stays claimable, in milliseconds.
        window_ms: u64,
    },
}

/// Delay injector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Master switch.
    pub enabled: bool,
    /// Probability a delay applies per draw (probability mode only).
    pub probability: f64,
    /// Minimum injected delay in milliseconds.
    pub min_delay_ms: u64,
    /// Maximum injected delay in milliseconds.
    pub max_delay_ms: u64,
    /// Decision mode.
    pub mode: DelayMode,
    /// Also apply the delay as a pre-step hook, making the injector a
    /// hybrid of context provider and step injector.
    pub apply_before_step: bool,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 0.5,
            min_delay_ms: 10,
            max_delay_ms: 100,
            mode: DelayMode::Probability,
            apply_before_step: false,
        }
    }
}

impl DelayConfig {
    /// Fixed-length delay applied on every draw.
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            probability: 1.0,
            min_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            ..Self::default()
        }
    }
}

/// Panic injector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanicConfig {
    /// Master switch.
    pub enabled: bool,
    /// Probability `maybe_panic` is told to raise, per draw.
    pub probability: f64,
}

impl Default for PanicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 0.05,
        }
    }
}

/// Error injector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorConfig {
    /// Master switch.
    pub enabled: bool,
    /// Probability an error is injected, per draw.
    pub probability: f64,
    /// Message carried by the injected failure.
    pub message: String,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 0.1,
            message: "injected fault".to_string(),
        }
    }
}

/// One host/port matching rule for network chaos.
///
/// `None` fields match anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRule {
    /// Exact host to match, or any host when `None`.
    pub host: Option<String>,
    /// Exact port to match, or any port when `None`.
    pub port: Option<u16>,
    /// Probability extra latency applies to a matching connection.
    pub latency_probability: f64,
    /// Minimum injected latency in milliseconds.
    pub min_latency_ms: u64,
    /// Maximum injected latency in milliseconds.
    pub max_latency_ms: u64,
    /// Probability a matching connection is dropped.
    pub drop_probability: f64,
}

impl Default for NetworkRule {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            latency_probability: 0.0,
            min_latency_ms: 0,
            max_latency_ms: 0,
            drop_probability: 0.0,
        }
    }
}

impl NetworkRule {
    /// Whether the rule matches the given endpoint.
    pub fn matches(&self, host: &str, port: u16) -> bool {
        if let Some(ref h) = self.host {
            if h != host {
                return false;
            }
        }
        if let Some(p) = self.port {
            if p != port {
                return false;
            }
        }
        true
    }
}

/// Network chaos injector configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkChaosConfig {
    /// Rules evaluated in order; the first matching rule decides.
    pub rules: Vec<NetworkRule>,
}

/// Cancellation injector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationConfig {
    /// Master switch.
    pub enabled: bool,
    /// Probability an iteration gets a canceller attached.
    pub probability: f64,
    /// Earliest cancellation, milliseconds after the iteration starts.
    pub min_after_ms: u64,
    /// Latest cancellation, milliseconds after the iteration starts.
    pub max_after_ms: u64,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 0.1,
            min_after_ms: 10,
            max_after_ms: 500,
        }
    }
}
