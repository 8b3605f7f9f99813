//! Network chaos injection
//!
//! Offers the network-provider capability consulted by
//! `maybe_network_chaos`: per host/port rules decide whether extra latency
//! applies and whether the connection is dropped outright. The context
//! performs the sleep and raises the connection-dropped failure; this
//! injector only makes the decisions.

use crate::config::{NetworkChaosConfig, NetworkRule};
use async_trait::async_trait;
use chaosforge_core::{
    ChaosRng, Injector, InjectorContext, InjectorState, Lifecycle, NetworkProvider, Result,
    SeedSink,
};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct NetworkState {
    config: NetworkChaosConfig,
    rng: Mutex<Option<ChaosRng>>,
    delays_decided: AtomicU64,
    drops_decided: AtomicU64,
}

impl NetworkState {
    fn rule_for(&self, host: &str, port: u16) -> Option<&NetworkRule> {
        self.config.rules.iter().find(|rule| rule.matches(host, port))
    }

    fn draw_bool(&self, probability: f64) -> bool {
        if let Some(rng) = self.rng.lock().as_ref() {
            rng.random_bool(probability)
        } else {
            rand::rng().random_bool(probability.clamp(0.0, 1.0))
        }
    }

    fn draw_millis(&self, min: u64, max: u64) -> u64 {
        if let Some(rng) = self.rng.lock().as_ref() {
            rng.random_range_u64(min, max)
        } else if min >= max {
            min
        } else {
            rand::rng().random_range(min..=max)
        }
    }
}

impl NetworkProvider for NetworkState {
    fn should_apply_chaos(&self, host: &str, port: u16) -> bool {
        self.rule_for(host, port).is_some()
    }

    fn network_latency(&self, host: &str, port: u16) -> Option<Duration> {
        let rule = self.rule_for(host, port)?;
        if rule.latency_probability <= 0.0 || !self.draw_bool(rule.latency_probability) {
            return None;
        }
        let millis = self.draw_millis(rule.min_latency_ms, rule.max_latency_ms);
        if millis == 0 {
            return None;
        }
        self.delays_decided.fetch_add(1, Ordering::Relaxed);
        Some(Duration::from_millis(millis))
    }

    fn should_drop_connection(&self, host: &str, port: u16) -> bool {
        let Some(rule) = self.rule_for(host, port) else {
            return false;
        };
        let decision = rule.drop_probability > 0.0 && self.draw_bool(rule.drop_probability);
        if decision {
            self.drops_decided.fetch_add(1, Ordering::Relaxed);
        }
        decision
    }
}

/// Reference network chaos injector.
pub struct NetworkChaosInjector {
    name: String,
    lifecycle: Lifecycle,
    state: Arc<NetworkState>,
}

impl NetworkChaosInjector {
    /// Create a network injector named `network`.
    pub fn new(config: NetworkChaosConfig) -> Self {
        Self {
            name: "network".to_string(),
            lifecycle: Lifecycle::new(),
            state: Arc::new(NetworkState {
                config,
                rng: Mutex::new(None),
                delays_decided: AtomicU64::new(0),
                drops_decided: AtomicU64::new(0),
            }),
        }
    }

    /// Override the injector name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Injector for NetworkChaosInjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_inject(&self.name)?;
        ctx.logger.debug("network chaos injector active");
        Ok(())
    }

    async fn stop(&self, _ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_stop();
        Ok(())
    }

    fn state(&self) -> InjectorState {
        self.lifecycle.state()
    }

    fn network_provider(&self) -> Option<Arc<dyn NetworkProvider>> {
        if self.state.config.rules.is_empty() {
            None
        } else {
            Some(Arc::clone(&self.state) as Arc<dyn NetworkProvider>)
        }
    }

    fn as_seed_sink(&self) -> Option<&dyn SeedSink> {
        Some(self)
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            (
                "latencies_decided".to_string(),
                self.state.delays_decided.load(Ordering::Relaxed).into(),
            ),
            (
                "drops_decided".to_string(),
                self.state.drops_decided.load(Ordering::Relaxed).into(),
            ),
        ])
    }
}

impl SeedSink for NetworkChaosInjector {
    fn bind_rng(&self, rng: ChaosRng) {
        *self.state.rng.lock() = Some(rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_all_config() -> NetworkChaosConfig {
        NetworkChaosConfig {
            rules: vec![NetworkRule {
                drop_probability: 1.0,
                ..NetworkRule::default()
            }],
        }
    }

    #[test]
    fn empty_config_offers_no_capability() {
        let injector = NetworkChaosInjector::new(NetworkChaosConfig::default());
        assert!(injector.network_provider().is_none());
    }

    #[test]
    fn scoped_rule_only_hits_its_endpoint() {
        let config = NetworkChaosConfig {
            rules: vec![NetworkRule {
                host: Some("db.internal".to_string()),
                port: Some(5432),
                drop_probability: 1.0,
                ..NetworkRule::default()
            }],
        };
        let injector = NetworkChaosInjector::new(config);
        injector.bind_rng(ChaosRng::from_seed(1));
        let provider = injector.network_provider().expect("capability present");

        assert!(provider.should_apply_chaos("db.internal", 5432));
        assert!(provider.should_drop_connection("db.internal", 5432));
        assert!(!provider.should_apply_chaos("cache.internal", 6379));
        assert!(!provider.should_drop_connection("cache.internal", 6379));
    }

    #[test]
    fn latency_draws_within_configured_range() {
        let config = NetworkChaosConfig {
            rules: vec![NetworkRule {
                latency_probability: 1.0,
                min_latency_ms: 20,
                max_latency_ms: 40,
                ..NetworkRule::default()
            }],
        };
        let injector = NetworkChaosInjector::new(config);
        injector.bind_rng(ChaosRng::from_seed(2));
        let provider = injector.network_provider().expect("capability present");

        for _ in 0..32 {
            let latency = provider
                .network_latency("api.internal", 443)
                .expect("always applies");
            assert!((20..=40).contains(&(latency.as_millis() as u64)));
        }
    }

    #[test]
    fn drop_decisions_replay_with_same_seed() {
        let config = NetworkChaosConfig {
            rules: vec![NetworkRule {
                drop_probability: 0.5,
                ..NetworkRule::default()
            }],
        };

        let first = NetworkChaosInjector::new(config.clone());
        first.bind_rng(ChaosRng::from_seed(0xC0FFEE));
        let a: Vec<bool> = (0..64)
            .map(|_| first.state.should_drop_connection("x", 1))
            .collect();

        let second = NetworkChaosInjector::new(config);
        second.bind_rng(ChaosRng::from_seed(0xC0FFEE));
        let b: Vec<bool> = (0..64)
            .map(|_| second.state.should_drop_connection("x", 1))
            .collect();

        assert_eq!(a, b);
    }

    #[test]
    fn wildcard_rule_matches_everything() {
        let injector = NetworkChaosInjector::new(drop_all_config());
        injector.bind_rng(ChaosRng::from_seed(9));
        let provider = injector.network_provider().expect("capability present");
        assert!(provider.should_apply_chaos("anything", 80));
    }
}
