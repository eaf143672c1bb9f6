//! Cluster diagnostic collectors.
//!
//! This module turns "a set of named kubectl queries" into "a directory of
//! result files", isolating failures per item, and scrapes live sidecar state
//! through a temporary port-forward tunnel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Collector (trait)                     │
//! │  ┌──────────────────────────┐   ┌─────────────────────────┐  │
//! │  │      OsmCollector        │   │      SmiCollector       │  │
//! │  │  meshes → namespaces     │   │  SMI CRDs → resources   │  │
//! │  │  → pods → EnvoyProbe     │   │                         │  │
//! │  └─────┬──────────────┬─────┘   └────────────┬────────────┘  │
//! │        │              │                      │               │
//! │  ┌─────▼─────┐  ┌─────▼──────┐   ┌───────────▼───────────┐   │
//! │  │EnvoyProbe │  │CollectorRun│◀──│ Kubectl (run / list)  │   │
//! │  │ Tunnel    │  │ files[]    │   └───────────┬───────────┘   │
//! │  └─────┬─────┘  └────────────┘               │               │
//! └────────┼─────────────────────────────────────┼───────────────┘
//!          │                                     │
//!   ┌──────▼──────┐                       ┌──────▼───────┐
//!   │ HttpClient  │                       │CommandRunner │ (traits)
//!   └──────┬──────┘                       └──────┬───────┘
//!      ┌───┴────┐                           ┌────┴─────┐
//!   UreqClient MockHttp                 RealRunner  MockRunner
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use meshscope::collector::{Collector, EnvoyProbe, Kubectl, OsmCollector, RealRunner, UreqClient};
//! use meshscope::config::CollectorConfig;
//!
//! let config = CollectorConfig::default();
//! let kubectl = Kubectl::with_binary(RealRunner::new(), &config.kubectl);
//! let probe = EnvoyProbe::new(UreqClient::new(config.http_timeout), config.probe.clone());
//! let collector = OsmCollector::new(kubectl, probe, config.collector_root("osm"));
//! let outcome = collector.collect().unwrap();
//! println!("{} files", outcome.run.files().len());
//! ```

pub mod kubectl;
pub mod mock;
mod osm;
pub mod probe;
pub mod resources;
pub mod run;
mod smi;
pub mod traits;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use kubectl::{Kubectl, OutputStreams, Query};
pub use mock::{MockHttp, MockRunner};
pub use osm::OsmCollector;
pub use probe::{EnvoyProbe, ProbeConfig, ProbeReport, TunnelHandle};
pub use resources::ResourceList;
pub use run::{Artifact, CollectorRun};
pub use smi::SmiCollector;
pub use traits::{BackgroundProcess, CommandRunner, HttpClient, RealRunner, UreqClient};

use crate::error::CollectError;

/// Kinds of collector available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CollectorType {
    /// Open Service Mesh resources, controller logs and Envoy state.
    Osm,
    /// Service Mesh Interface CRDs and custom resources.
    Smi,
}

impl CollectorType {
    /// Directory name of the collector's output.
    pub fn name(self) -> &'static str {
        match self {
            CollectorType::Osm => "osm",
            CollectorType::Smi => "smi",
        }
    }
}

impl fmt::Display for CollectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A discovery step that failed and took its whole scope with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFailure {
    /// What was skipped, e.g. `mesh osm` or `namespaces`.
    pub scope: String,
    pub reason: String,
}

/// Result of a collector invocation that got as far as creating its output.
#[derive(Debug)]
pub struct CollectOutcome {
    pub run: CollectorRun,
    pub failures: Vec<ScopeFailure>,
}

impl CollectOutcome {
    pub fn new(run: CollectorRun) -> Self {
        Self {
            run,
            failures: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, scope: impl Into<String>, err: &CollectError) {
        self.failures.push(ScopeFailure {
            scope: scope.into(),
            reason: err.to_string(),
        });
    }
}

/// One collector type.
pub trait Collector {
    fn collector_type(&self) -> CollectorType;

    /// Runs the collector to completion.
    ///
    /// Returns `Err` only when nothing could be collected at all (initial
    /// discovery failed or the output directory could not be created).
    /// Everything else is best-effort and reported in the outcome.
    fn collect(&self) -> Result<CollectOutcome, CollectError>;
}

/// Cooperative stop flag, cleared by the Ctrl-C handler.
#[derive(Debug, Clone)]
pub struct Running(Arc<AtomicBool>);

impl Default for Running {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl Running {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Converts `NotFound` into an empty list, passing other errors through.
pub(crate) fn list_or_empty(
    result: Result<ResourceList, CollectError>,
) -> Result<Vec<String>, CollectError> {
    match result {
        Ok(list) => Ok(list.non_blank().map(str::to_string).collect()),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Removes duplicates, keeping the first occurrence.
pub(crate) fn dedup_ordered(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
