//! Hand-off of a finished collector run to downstream bundling.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collector::CollectorRun;
use crate::error::CollectError;

/// File name of the manifest written into each run root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Receives the files written by a collector run.
pub trait Exporter {
    fn export(&self, run: &CollectorRun) -> Result<(), CollectError>;
}

/// Index of one collector run's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub collector: String,
    pub run_id: String,
    pub node: String,
    /// Paths relative to the collector root, in write order.
    pub files: Vec<String>,
}

impl Manifest {
    pub fn from_run(run: &CollectorRun, run_id: &str, node: &str) -> Self {
        let files = run
            .files()
            .iter()
            .map(|path| {
                path.strip_prefix(run.root())
                    .unwrap_or(path)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        Self {
            collector: run.name().to_string(),
            run_id: run_id.to_string(),
            node: node.to_string(),
            files,
        }
    }
}

/// Writes `manifest.json` next to the collected files.
#[derive(Debug, Clone)]
pub struct ManifestExporter {
    run_id: String,
    node: String,
}

impl ManifestExporter {
    pub fn new(run_id: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            node: node.into(),
        }
    }

    /// Path the manifest of `run` is written to.
    pub fn manifest_path(run: &CollectorRun) -> PathBuf {
        run.root().join(MANIFEST_FILE)
    }
}

impl Exporter for ManifestExporter {
    fn export(&self, run: &CollectorRun) -> Result<(), CollectError> {
        let manifest = Manifest::from_run(run, &self.run_id, &self.node);
        let json = serde_json::to_string_pretty(&manifest).map_err(io::Error::other)?;
        let path = Self::manifest_path(run);
        fs::write(&path, json)?;
        info!(
            "Collector {}: {} files indexed in {}",
            manifest.collector,
            manifest.files.len(),
            path.display()
        );
        Ok(())
    }
}
