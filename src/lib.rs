//! meshscope - service mesh diagnostic collector library.
//!
//! This library provides the collection engine used by the `meshscope`
//! binary: kubectl-driven resource export with per-item failure isolation,
//! and live Envoy sidecar scraping over `kubectl port-forward` tunnels.

pub mod collector;
pub mod config;
pub mod error;
pub mod export;
pub mod util;

pub use error::CollectError;
