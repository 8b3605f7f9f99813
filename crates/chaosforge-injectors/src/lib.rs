//! ChaosForge reference injectors
//!
//! Implementations of the injector contract from `chaosforge-core`:
//! delay (probability and interval modes, optionally hooked before each
//! step), panic, error, network chaos, mid-iteration cancellation, and
//! the contract-backed failpoint, proxy-toxic and monkey-patch
//! injectors. All randomized decisions draw from the iteration RNG bound
//! through the seed-sink capability, so runs with the same seed
//! reproduce the same perturbations.

pub mod cancellation;
pub mod config;
pub mod delay;
pub mod error;
pub mod failpoint;
pub mod network;
pub mod panic;
pub mod patch;
pub mod profiles;
pub mod proxy;

pub use cancellation::CancellationInjector;
pub use config::{
    CancellationConfig, DelayConfig, DelayMode, ErrorConfig, NetworkChaosConfig, NetworkRule,
    PanicConfig,
};
pub use delay::DelayInjector;
pub use error::ErrorInjector;
pub use failpoint::{FailpointConfig, FailpointInjector, FailpointSpec};
pub use network::NetworkChaosInjector;
pub use panic::PanicInjector;
pub use patch::{MonkeyPatchInjector, NamedPatcher};
pub use profiles::{ChaosProfile, PredefinedProfiles};
pub use proxy::{ProxyToxicConfig, ProxyToxicInjector};
