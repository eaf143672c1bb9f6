//! Collector configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::collector::kubectl::DEFAULT_KUBECTL;
use crate::collector::probe::ProbeConfig;
use crate::util::node_name;

/// Settings shared by every collector in one run.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Base directory for all output.
    pub output_dir: PathBuf,
    /// kubectl binary to invoke.
    pub kubectl: String,
    /// Node name used as a path component.
    pub node_name: String,
    /// Identifier of this run, normally a UTC timestamp.
    pub run_id: String,
    /// Per-request timeout for sidecar admin queries.
    pub http_timeout: Duration,
    /// Tunnel and retry settings for the sidecar probe.
    pub probe: ProbeConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./meshscope-output"),
            kubectl: DEFAULT_KUBECTL.to_string(),
            node_name: node_name().to_string(),
            run_id: run_id(Utc::now()),
            http_timeout: Duration::from_secs(10),
            probe: ProbeConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Creates a config writing under `output_dir`, other values default.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// `<output_dir>/<run_id>/<node_name>`
    pub fn run_root(&self) -> PathBuf {
        self.output_dir.join(&self.run_id).join(&self.node_name)
    }

    /// Output directory of the named collector.
    pub fn collector_root(&self, collector: &str) -> PathBuf {
        collector_root(&self.run_root(), collector)
    }
}

fn collector_root(run_root: &Path, collector: &str) -> PathBuf {
    run_root.join("collector").join(collector)
}

/// Formats a run identifier safe for use as a directory name (no `:`).
pub fn run_id(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%SZ").to_string()
}
