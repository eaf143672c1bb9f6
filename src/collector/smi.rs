//! Service Mesh Interface collector.
//!
//! Dumps the SMI CustomResourceDefinitions installed in the cluster and every
//! custom resource of those types. Custom resources are nested per namespace:
//!
//! ```text
//! smi/
//!   <crd>_list.tsv
//!   <crd>_configs.json
//!   smi_crd_definitions/<crd>_definition.yaml
//!   smi_custom_resources/namespace_<ns>/<crd>_custom_resources/<crd>_<name>.yaml
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::collector::kubectl::{Kubectl, Query};
use crate::collector::run::{Artifact, CollectorRun};
use crate::collector::traits::CommandRunner;
use crate::collector::{CollectOutcome, Collector, CollectorType, Running};
use crate::error::CollectError;

/// API group suffix shared by all SMI CRDs.
const SMI_GROUP: &str = "smi-spec.io";

const DEFINITIONS_DIR: &str = "smi_crd_definitions";
const CUSTOM_RESOURCES_DIR: &str = "smi_custom_resources";

/// Collects SMI CRDs and custom resources across all namespaces.
pub struct SmiCollector<R: CommandRunner> {
    kubectl: Kubectl<R>,
    root: PathBuf,
    running: Running,
}

impl<R: CommandRunner> SmiCollector<R> {
    pub fn new(kubectl: Kubectl<R>, root: impl Into<PathBuf>) -> Self {
        Self {
            kubectl,
            root: root.into(),
            running: Running::new(),
        }
    }

    /// Stops between namespaces once `running` is cleared.
    pub fn with_running(mut self, running: Running) -> Self {
        self.running = running;
        self
    }

    pub fn kubectl(&self) -> &Kubectl<R> {
        &self.kubectl
    }

    fn collect_definitions(&self, run: &mut CollectorRun, crds: &[String]) {
        let artifacts: Vec<Artifact> = crds
            .iter()
            .map(|crd| {
                Artifact::new(
                    format!("{}/{}_definition.yaml", DEFINITIONS_DIR, crd),
                    ["get", "crd", crd.as_str(), "-o", "yaml"],
                )
            })
            .collect();
        run.export_batch(&self.kubectl, &artifacts, "SMI CRD definitions");
    }

    fn collect_listings(&self, run: &mut CollectorRun, crds: &[String]) {
        let artifacts: Vec<Artifact> = crds
            .iter()
            .flat_map(|crd| {
                [
                    Artifact::new(
                        format!("{}_list.tsv", crd),
                        ["get", crd.as_str(), "--all-namespaces", "-o=wide"],
                    ),
                    Artifact::new(
                        format!("{}_configs.json", crd),
                        ["get", crd.as_str(), "--all-namespaces", "-o=json"],
                    ),
                ]
            })
            .collect();
        run.export_batch(&self.kubectl, &artifacts, "SMI resource listings");
    }

    fn collect_custom_resources(
        &self,
        run: &mut CollectorRun,
        crds: &[String],
    ) -> Result<(), CollectError> {
        let namespaces = self.kubectl.list(&namespaces_query(), " ")?;

        for namespace in namespaces.non_blank() {
            if !self.running.is_running() {
                break;
            }
            let dir = Path::new(CUSTOM_RESOURCES_DIR).join(format!("namespace_{}", namespace));
            for crd in crds {
                self.collect_namespace_resources(run, &dir, crd, namespace);
            }
        }
        Ok(())
    }

    fn collect_namespace_resources(
        &self,
        run: &mut CollectorRun,
        dir: &Path,
        crd: &str,
        namespace: &str,
    ) {
        let names = match self.kubectl.list(&custom_resources_query(crd, namespace), " ") {
            Ok(names) => names,
            Err(e) if e.is_not_found() => {
                debug!("No {} in namespace {}", crd, namespace);
                return;
            }
            Err(e) => {
                warn!(
                    "Failed to list custom resources of type {} in namespace {}: {}",
                    crd, namespace, e
                );
                return;
            }
        };

        let dir = dir.join(format!("{}_custom_resources", crd));
        for name in names.non_blank() {
            let file = dir.join(format!("{}_{}.yaml", crd, name));
            let query = Query::new(["get", crd, name, "-n", namespace, "-o", "yaml"]);
            if let Err(e) = run.export(&self.kubectl, &file, &query) {
                warn!("Failed to collect {}: {}", file.display(), e);
            }
        }
    }
}

impl<R: CommandRunner> Collector for SmiCollector<R> {
    fn collector_type(&self) -> CollectorType {
        CollectorType::Smi
    }

    fn collect(&self) -> Result<CollectOutcome, CollectError> {
        let crds = self.kubectl.list(&crds_query(), " ")?;
        let smi_crds: Vec<String> = crds
            .non_blank()
            .filter(|crd| crd.contains(SMI_GROUP))
            .map(str::to_string)
            .collect();

        let run = CollectorRun::create(self.collector_type().name(), &self.root)?;
        let mut outcome = CollectOutcome::new(run);

        if smi_crds.is_empty() {
            info!("Cluster does not contain any SMI CustomResourceDefinitions");
            return Ok(outcome);
        }
        info!("Found {} SMI CRDs", smi_crds.len());

        self.collect_definitions(&mut outcome.run, &smi_crds);
        self.collect_listings(&mut outcome.run, &smi_crds);
        if let Err(e) = self.collect_custom_resources(&mut outcome.run, &smi_crds) {
            warn!("Failed to list namespaces in the cluster: {}", e);
            outcome.fail("namespaces", &e);
        }

        Ok(outcome)
    }
}

fn crds_query() -> Query {
    Query::new(["get", "crds", "-o=jsonpath={..metadata.name}"])
}

fn namespaces_query() -> Query {
    Query::new(["get", "namespaces", "-o=jsonpath={..metadata.name}"])
}

fn custom_resources_query(crd: &str, namespace: &str) -> Query {
    Query::new(["get", crd, "-n", namespace, "-o=jsonpath={..metadata.name}"])
}
