//! Output directory and file bookkeeping for one collector invocation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::kubectl::{Kubectl, Query};
use crate::collector::traits::CommandRunner;
use crate::error::CollectError;

/// A named query whose stdout becomes one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name relative to the run root.
    pub name: String,
    pub query: Query,
}

impl Artifact {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            query: Query::new(args),
        }
    }
}

/// Joins file name components with `_`.
pub fn file_name(parts: &[&str]) -> String {
    parts.join("_")
}

/// State of one collector invocation.
///
/// Owns the root output directory and the append-only list of files written
/// so far. Partial results are kept: nothing is removed on failure.
#[derive(Debug)]
pub struct CollectorRun {
    name: String,
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl CollectorRun {
    /// Creates the run root directory (and its parents).
    pub fn create(name: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self, CollectError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("Collector output directory: {}", root.display());
        Ok(Self {
            name: name.into(),
            root,
            files: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files written so far, in write order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Writes `contents` to `<root>/<relative>` and records the path.
    ///
    /// Intermediate directories are created. An existing file is overwritten.
    pub fn write_file(
        &mut self,
        relative: impl AsRef<Path>,
        contents: &str,
    ) -> Result<PathBuf, CollectError> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        self.files.push(path.clone());
        Ok(path)
    }

    /// Runs `query` and writes its stdout verbatim to `file_name`.
    pub fn export<R: CommandRunner>(
        &mut self,
        kubectl: &Kubectl<R>,
        file_name: impl AsRef<Path>,
        query: &Query,
    ) -> Result<PathBuf, CollectError> {
        let streams = kubectl.run(query)?;
        self.write_file(file_name, &streams.stdout)
    }

    /// Exports every artifact in order, logging and skipping failures.
    ///
    /// # Arguments
    /// * `kubectl` - Cluster query client
    /// * `artifacts` - Ordered batch to export
    /// * `scope` - Description of where the batch comes from, for log messages
    ///
    /// # Returns
    /// Number of files written.
    pub fn export_batch<R: CommandRunner>(
        &mut self,
        kubectl: &Kubectl<R>,
        artifacts: &[Artifact],
        scope: &str,
    ) -> usize {
        let mut written = 0;
        for artifact in artifacts {
            match self.export(kubectl, &artifact.name, &artifact.query) {
                Ok(_) => written += 1,
                Err(e) => warn!("Failed to collect {} ({}): {}", artifact.name, scope, e),
            }
        }
        written
    }

    /// Consumes the run, returning the written files.
    pub fn into_files(self) -> Vec<PathBuf> {
        self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockRunner;

    #[test]
    fn test_file_name() {
        assert_eq!(
            file_name(&["mesh-a", "ns1", "pod_config", "web-1"]),
            "mesh-a_ns1_pod_config_web-1"
        );
    }

    #[test]
    fn test_create_makes_nested_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("run").join("collector").join("osm");
        let run = CollectorRun::create("osm", &root).unwrap();
        assert!(root.is_dir());
        assert_eq!(run.name(), "osm");
        assert!(run.files().is_empty());
    }

    #[test]
    fn test_write_file_records_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = CollectorRun::create("smi", dir.path()).unwrap();

        let path = run.write_file("nested/dir/a.yaml", "kind: Foo\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kind: Foo\n");
        assert_eq!(run.files(), &[path]);
    }

    #[test]
    fn test_export_writes_stdout_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::new();
        runner.respond(["get", "services", "-n", "ns1"], "NAME  TYPE\nweb   ClusterIP\n");
        let kubectl = Kubectl::new(runner);
        let mut run = CollectorRun::create("osm", dir.path()).unwrap();

        let path = run
            .export(
                &kubectl,
                "mesh-a_ns1_services_table",
                &Query::new(["get", "services", "-n", "ns1"]),
            )
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "NAME  TYPE\nweb   ClusterIP\n"
        );
    }

    #[test]
    fn test_export_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::new();
        runner.fail(["get", "ingresses"], "forbidden");
        let kubectl = Kubectl::new(runner);
        let mut run = CollectorRun::create("osm", dir.path()).unwrap();

        assert!(run
            .export(&kubectl, "ingresses", &Query::new(["get", "ingresses"]))
            .is_err());
        assert!(run.files().is_empty());
        assert!(!dir.path().join("ingresses").exists());
    }

    #[test]
    fn test_export_batch_skips_failed_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::new();
        runner.respond(["get", "a"], "a");
        runner.fail(["get", "b"], "boom");
        runner.respond(["get", "c"], "c");
        runner.respond(["get", "d"], "d");
        let kubectl = Kubectl::new(runner);
        let mut run = CollectorRun::create("osm", dir.path()).unwrap();

        let batch = vec![
            Artifact::new("file_a", ["get", "a"]),
            Artifact::new("file_b", ["get", "b"]),
            Artifact::new("file_c", ["get", "c"]),
            Artifact::new("file_d", ["get", "d"]),
        ];
        let written = run.export_batch(&kubectl, &batch, "test");

        assert_eq!(written, 3);
        let names: Vec<String> = run
            .files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["file_a", "file_c", "file_d"]);
        // Later items still ran after the failure.
        assert_eq!(kubectl.runner().calls(), vec!["get a", "get b", "get c", "get d"]);
    }
}
