//! Declarative management of NSX-T load balancer L4 health monitors
//!
//! Layers, bottom up:
//!
//! - [`nsx`] - NSX Manager API facade (REST client and an in-memory backend)
//! - [`resource`] - schemas, lifecycle controller and local state
//! - [`provider`] - host-facing entry points
//! - [`apply`] - document parsing and the plan/apply engine
//! - [`acceptance`] - end-to-end scenarios

pub mod acceptance;
pub mod apply;
pub mod config;
pub mod error;
pub mod nsx;
pub mod provider;
pub mod resource;

pub use config::ProviderConfig;
pub use error::{Diagnostic, Operation, OperationError, ProviderError};
pub use provider::Provider;

/// Version injected at compile time via NSXT_PROVIDER_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("NSXT_PROVIDER_VERSION") {
    Some(v) => v,
    None => "dev",
};
