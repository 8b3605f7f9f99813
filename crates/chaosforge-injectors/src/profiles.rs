//! Chaos profiles: serde-able bundles of injector configuration
//!
//! A profile aggregates the reference injector configs so a whole
//! perturbation posture can be stored, shared, and materialized in one
//! call. Predefined profiles cover common failure patterns.

use crate::cancellation::CancellationInjector;
use crate::config::{
    CancellationConfig, DelayConfig, DelayMode, ErrorConfig, NetworkChaosConfig, NetworkRule,
    PanicConfig,
};
use crate::delay::DelayInjector;
use crate::error::ErrorInjector;
use crate::network::NetworkChaosInjector;
use crate::panic::PanicInjector;
use chaosforge_core::Injector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aggregated injector configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChaosProfile {
    /// Delay injection, if any.
    pub delay: Option<DelayConfig>,
    /// Panic injection, if any.
    pub panic: Option<PanicConfig>,
    /// Error injection, if any.
    pub error: Option<ErrorConfig>,
    /// Network chaos, if any.
    pub network: Option<NetworkChaosConfig>,
    /// Cancellation injection, if any.
    pub cancellation: Option<CancellationConfig>,
}

impl ChaosProfile {
    /// Materialize the configured injectors under their conventional
    /// names, in a fixed order (delay, panic, error, network,
    /// cancellation).
    pub fn build_injectors(&self) -> Vec<Arc<dyn Injector>> {
        let mut injectors: Vec<Arc<dyn Injector>> = Vec::new();
        if let Some(config) = &self.delay {
            injectors.push(Arc::new(DelayInjector::new(config.clone())));
        }
        if let Some(config) = &self.panic {
            injectors.push(Arc::new(PanicInjector::new(config.clone())));
        }
        if let Some(config) = &self.error {
            injectors.push(Arc::new(ErrorInjector::new(config.clone())));
        }
        if let Some(config) = &self.network {
            injectors.push(Arc::new(NetworkChaosInjector::new(config.clone())));
        }
        if let Some(config) = &self.cancellation {
            injectors.push(Arc::new(CancellationInjector::new(config.clone())));
        }
        injectors
    }
}

/// Predefined chaos profiles.
pub struct PredefinedProfiles;

impl PredefinedProfiles {
    /// High latency and dropped connections on every endpoint.
    pub fn network_degradation() -> ChaosProfile {
        ChaosProfile {
            network: Some(NetworkChaosConfig {
                rules: vec![NetworkRule {
                    latency_probability: 0.8,
                    min_latency_ms: 200,
                    max_latency_ms: 800,
                    drop_probability: 0.05,
                    ..NetworkRule::default()
                }],
            }),
            ..ChaosProfile::default()
        }
    }

    /// Random injected errors with occasional panics.
    pub fn service_instability() -> ChaosProfile {
        ChaosProfile {
            error: Some(ErrorConfig {
                enabled: true,
                probability: 0.2,
                message: "service unavailable".to_string(),
            }),
            panic: Some(PanicConfig {
                enabled: true,
                probability: 0.02,
            }),
            ..ChaosProfile::default()
        }
    }

    /// Delays feeding errors feeding mid-iteration cancellations.
    pub fn cascading_failure() -> ChaosProfile {
        ChaosProfile {
            delay: Some(DelayConfig {
                probability: 0.6,
                min_delay_ms: 50,
                max_delay_ms: 400,
                ..DelayConfig::default()
            }),
            error: Some(ErrorConfig {
                enabled: true,
                probability: 0.15,
                message: "upstream timed out".to_string(),
            }),
            cancellation: Some(CancellationConfig {
                enabled: true,
                probability: 0.1,
                min_after_ms: 50,
                max_after_ms: 1_000,
            }),
            ..ChaosProfile::default()
        }
    }

    /// Interval-mode delay windows, a steadily slow dependency.
    pub fn slow_backend() -> ChaosProfile {
        ChaosProfile {
            delay: Some(DelayConfig {
                probability: 1.0,
                min_delay_ms: 100,
                max_delay_ms: 300,
                mode: DelayMode::Interval {
                    interval_ms: 500,
                    window_ms: 200,
                },
                ..DelayConfig::default()
            }),
            ..ChaosProfile::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_builds_nothing() {
        assert!(ChaosProfile::default().build_injectors().is_empty());
    }

    #[test]
    fn cascading_failure_builds_in_fixed_order() {
        let injectors = PredefinedProfiles::cascading_failure().build_injectors();
        let names: Vec<&str> = injectors.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["delay", "error", "cancellation"]);
    }

    #[test]
    fn profiles_roundtrip_through_json() {
        let profile = PredefinedProfiles::network_degradation();
        let json = serde_json::to_string(&profile).expect("serialize");
        let back: ChaosProfile = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, profile);
    }
}
