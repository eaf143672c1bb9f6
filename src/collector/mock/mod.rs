//! Scripted stand-ins for kubectl and the sidecar admin endpoint.
//!
//! This module provides `MockRunner`, `MockHttp` and pre-built cluster
//! scenarios for testing collectors without a live Kubernetes cluster.

mod http;
mod runner;
mod scenarios;

pub use http::MockHttp;
pub use runner::MockRunner;
