//! Proxy-toxic injection
//!
//! A global injector with no providers or hooks: all of its effect is the
//! side effect of installing toxics on a proxy at `inject` and removing
//! them at `stop`, through the
//! [`ProxyManager`](chaosforge_core::ProxyManager) contract. The core
//! never mutates proxy state directly.

use async_trait::async_trait;
use chaosforge_core::{
    ChaosError, Injector, InjectorContext, InjectorState, Lifecycle, ProxyManager, Result, Toxic,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Proxy-toxic injector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyToxicConfig {
    /// Proxy name as known to the manager.
    pub proxy: String,
    /// Listen address, used when the proxy is created by this injector.
    pub listen: String,
    /// Upstream address, used when the proxy is created by this injector.
    pub upstream: String,
    /// Whether this injector creates (and later deletes) the proxy, or
    /// attaches toxics to one that already exists.
    pub create_proxy: bool,
    /// Toxics installed at inject and removed at stop.
    pub toxics: Vec<Toxic>,
}

/// Reference proxy-toxic injector.
pub struct ProxyToxicInjector {
    name: String,
    lifecycle: Lifecycle,
    manager: Arc<dyn ProxyManager>,
    config: ProxyToxicConfig,
}

impl ProxyToxicInjector {
    /// Create a proxy-toxic injector named `proxy_toxics`.
    pub fn new(manager: Arc<dyn ProxyManager>, config: ProxyToxicConfig) -> Self {
        Self {
            name: "proxy_toxics".to_string(),
            lifecycle: Lifecycle::new(),
            manager,
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
impl Injector for ProxyToxicInjector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, ctx: &InjectorContext) -> Result<()> {
        self.lifecycle.begin_inject(&self.name)?;
        if self.config.create_proxy {
            self.manager
                .create_proxy(
                    &self.config.proxy,
                    &self.config.listen,
                    &self.config.upstream,
                    true,
                )
                .await
                .map_err(|err| ChaosError::InjectFailed {
                    name: self.name.clone(),
                    reason: format!("creating proxy '{}' failed: {err}", self.config.proxy),
                })?;
        }
        for toxic in &self.config.toxics {
            self.manager
                .add_toxic(&self.config.proxy, toxic.clone())
                .await
                .map_err(|err| ChaosError::InjectFailed {
                    name: self.name.clone(),
                    reason: format!("adding toxic '{}' failed: {err}", toxic.name()),
                })?;
            debug!(proxy = %self.config.proxy, toxic = %toxic.name(), "toxic installed");
        }
        ctx.logger.debug("proxy toxic injector active");
        Ok(())
    }

    async fn stop(&self, _ctx: &InjectorContext) -> Result<()> {
        if !self.lifecycle.begin_stop() {
            return Ok(());
        }
        for toxic in self.config.toxics.iter().rev() {
            if let Err(err) = self.manager.remove_toxic(&self.config.proxy, toxic.name()).await {
                warn!(proxy = %self.config.proxy, toxic = %toxic.name(), error = %err, "toxic removal failed");
            }
        }
        if self.config.create_proxy {
            if let Err(err) = self.manager.delete_proxy(&self.config.proxy).await {
                warn!(proxy = %self.config.proxy, error = %err, "proxy deletion failed");
            }
        }
        Ok(())
    }

    fn state(&self) -> InjectorState {
        self.lifecycle.state()
    }

    fn metrics(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "toxics_configured".to_string(),
            (self.config.toxics.len() as u64).into(),
        )])
    }
}
