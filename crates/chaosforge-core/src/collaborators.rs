//! External-collaborator contracts
//!
//! Injectors that drive network proxies, failpoint runtimes, or
//! function-pointer patchers talk to those systems through the traits
//! here. The core never touches the external state directly; it only
//! calls `inject` and `stop` on the injector owning the handle.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A toxic applied to a named proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Toxic {
    /// Added latency with jitter, in milliseconds.
    Latency {
        /// Toxic name, unique per proxy.
        name: String,
        /// Base latency in milliseconds.
        latency_ms: u64,
        /// Jitter in milliseconds.
        jitter_ms: u64,
    },
    /// Bandwidth cap in kilobytes per second.
    Bandwidth {
        /// Toxic name, unique per proxy.
        name: String,
        /// Rate limit in KB/s.
        rate_kbps: u64,
    },
    /// Stops all data and closes the connection after a delay.
    Timeout {
        /// Toxic name, unique per proxy.
        name: String,
        /// Milliseconds before the connection is closed.
        timeout_ms: u64,
    },
    /// Slices data into small chunks with optional delay between them.
    Slicer {
        /// Toxic name, unique per proxy.
        name: String,
        /// Average chunk size in bytes.
        average_size: u64,
        /// Microseconds to wait between chunks.
        delay_us: u64,
    },
}

impl Toxic {
    /// The toxic's name.
    pub fn name(&self) -> &str {
        match self {
            Self::Latency { name, .. }
            | Self::Bandwidth { name, .. }
            | Self::Timeout { name, .. }
            | Self::Slicer { name, .. } => name,
        }
    }
}

/// Manages proxies a network injector installs toxics on.
///
/// Implemented outside the core (for example on top of a toxiproxy
/// client); proxy-backed injectors hold a handle and drive it from their
/// `inject` and `stop`.
#[async_trait]
pub trait ProxyManager: Send + Sync {
    /// Create a proxy listening on `listen` and forwarding to `upstream`.
    async fn create_proxy(
        &self,
        name: &str,
        listen: &str,
        upstream: &str,
        enabled: bool,
    ) -> Result<()>;

    /// Delete a proxy and all of its toxics.
    async fn delete_proxy(&self, name: &str) -> Result<()>;

    /// Add a toxic to a named proxy.
    async fn add_toxic(&self, proxy: &str, toxic: Toxic) -> Result<()>;

    /// Remove a toxic from a named proxy.
    async fn remove_toxic(&self, proxy: &str, toxic_name: &str) -> Result<()>;
}

/// Per-name failpoint control.
///
/// The probe pattern: at `inject` time the injector attempts to enable a
/// sentinel name; a runtime-disabled failure means the failpoint runtime
/// is not compiled in, and the injector reports a precondition-not-met
/// failure instead of activating.
pub trait FailpointRuntime: Send + Sync {
    /// Enable a failpoint with a string-encoded action.
    fn enable(&self, name: &str, action: &str) -> Result<()>;

    /// Disable a failpoint.
    fn disable(&self, name: &str) -> Result<()>;
}

/// Captures and restores a patched function.
///
/// Monkey-patch-style injectors own a patcher per patched site; the core
/// only sees the injector lifecycle around it.
pub trait FunctionPatcher: Send + Sync {
    /// Install the replacement, capturing the original.
    fn install(&self) -> Result<()>;

    /// Restore the captured original.
    fn restore(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toxic_names_are_reachable_across_variants() {
        let toxic = Toxic::Latency {
            name: "slow-db".to_string(),
            latency_ms: 250,
            jitter_ms: 50,
        };
        assert_eq!(toxic.name(), "slow-db");

        let toxic = Toxic::Slicer {
            name: "chop".to_string(),
            average_size: 128,
            delay_us: 10,
        };
        assert_eq!(toxic.name(), "chop");
    }

    #[test]
    fn toxics_roundtrip_through_json() {
        let toxic = Toxic::Bandwidth {
            name: "dialup".to_string(),
            rate_kbps: 56,
        };
        let json = serde_json::to_string(&toxic).expect("serialize");
        let back: Toxic = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, toxic);
    }
}
