//! Open Service Mesh collector.
//!
//! Walks meshes → namespaces → pods and exports, for each unit, the resource
//! dumps, per-pod configuration, Envoy admin state and controller logs.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::collector::kubectl::{Kubectl, Query};
use crate::collector::probe::EnvoyProbe;
use crate::collector::run::{Artifact, CollectorRun, file_name};
use crate::collector::traits::{CommandRunner, HttpClient};
use crate::collector::{
    CollectOutcome, Collector, CollectorType, Running, dedup_ordered, list_or_empty,
};
use crate::error::CollectError;

/// Label carried by every OSM controller deployment and pod.
const CONTROLLER_SELECTOR: &str = "app=osm-controller";

/// Label carried by every resource installed with OSM.
const OSM_RESOURCES_SELECTOR: &str = "app.kubernetes.io/name=openservicemesh.io";

/// Namespace label naming the mesh that monitors it.
const MONITORED_BY_LABEL: &str = "openservicemesh.io/monitored-by";

/// Collects OSM state for every mesh in the cluster.
pub struct OsmCollector<R: CommandRunner, H: HttpClient> {
    kubectl: Kubectl<R>,
    probe: EnvoyProbe<H>,
    root: PathBuf,
    running: Running,
}

impl<R: CommandRunner, H: HttpClient> OsmCollector<R, H> {
    /// Creates a new OSM collector.
    ///
    /// # Arguments
    /// * `kubectl` - Cluster query client
    /// * `probe` - Envoy admin probe
    /// * `root` - Output directory for this collector
    pub fn new(kubectl: Kubectl<R>, probe: EnvoyProbe<H>, root: impl Into<PathBuf>) -> Self {
        Self {
            kubectl,
            probe,
            root: root.into(),
            running: Running::new(),
        }
    }

    /// Stops between meshes, namespaces and pods once `running` is cleared.
    pub fn with_running(mut self, running: Running) -> Self {
        self.running = running;
        self
    }

    pub fn kubectl(&self) -> &Kubectl<R> {
        &self.kubectl
    }

    pub fn probe(&self) -> &EnvoyProbe<H> {
        &self.probe
    }

    fn collect_mesh(&self, run: &mut CollectorRun, mesh: &str) -> Result<(), CollectError> {
        let namespaces = self.mesh_namespaces(mesh)?;
        info!("Mesh {}: {} namespaces", mesh, namespaces.len());

        for namespace in &namespaces {
            if !self.running.is_running() {
                return Ok(());
            }
            self.collect_namespace(run, mesh, namespace);
        }

        self.collect_controller_logs(run, mesh)
    }

    /// Monitored namespaces followed by controller namespaces not already listed.
    fn mesh_namespaces(&self, mesh: &str) -> Result<Vec<String>, CollectError> {
        let monitored = list_or_empty(self.kubectl.list(&monitored_namespaces_query(mesh), " "))?;
        let controllers =
            list_or_empty(self.kubectl.list(&controller_namespaces_query(mesh), " "))?;
        if monitored.is_empty() {
            debug!("Mesh {} does not monitor any namespace", mesh);
        }
        Ok(dedup_ordered(monitored.into_iter().chain(controllers)))
    }

    fn collect_namespace(&self, run: &mut CollectorRun, mesh: &str, namespace: &str) {
        let scope = format!("mesh {}, namespace {}", mesh, namespace);
        let written = run.export_batch(&self.kubectl, &namespace_artifacts(mesh, namespace), &scope);
        debug!("{}: {} resource files", scope, written);

        let pods = match self.kubectl.list(&pods_query(namespace), " ") {
            Ok(pods) => pods,
            Err(e) if e.is_not_found() => {
                debug!("{}: no pods", scope);
                return;
            }
            Err(e) => {
                warn!("Failed to list pods ({}): {}", scope, e);
                return;
            }
        };

        for pod in pods.non_blank() {
            if !self.running.is_running() {
                return;
            }
            let name = file_name(&[mesh, namespace, "pod_config", pod]);
            if let Err(e) = run.export(&self.kubectl, &name, &pod_config_query(namespace, pod)) {
                warn!("Failed to collect {} ({}): {}", name, scope, e);
            }
            self.probe.probe_pod(&self.kubectl, run, mesh, namespace, pod);
        }
    }

    fn collect_controller_logs(&self, run: &mut CollectorRun, mesh: &str) -> Result<(), CollectError> {
        let rows = match self.kubectl.list(&controller_pods_query(mesh), "\n") {
            Ok(rows) => rows,
            Err(e) if e.is_not_found() => {
                debug!("Mesh {}: no controller pods", mesh);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // First row is the custom-columns header.
        for row in rows.non_blank().skip(1) {
            let mut fields = row.split_whitespace();
            let (Some(pod), Some(namespace)) = (fields.next(), fields.next()) else {
                warn!("Unexpected controller row '{}'", row);
                continue;
            };
            let name = file_name(&[mesh, "controller_logs", pod]);
            let query = Query::new(["logs", "-n", namespace, pod]);
            if let Err(e) = run.export(&self.kubectl, &name, &query) {
                warn!("Failed to collect logs of controller {} in mesh {}: {}", pod, mesh, e);
            }
        }
        Ok(())
    }
}

impl<R: CommandRunner, H: HttpClient> Collector for OsmCollector<R, H> {
    fn collector_type(&self) -> CollectorType {
        CollectorType::Osm
    }

    fn collect(&self) -> Result<CollectOutcome, CollectError> {
        let meshes = self.kubectl.list(&meshes_query(), " ")?;
        let meshes = dedup_ordered(meshes.non_blank().map(str::to_string));
        info!("Found {} OSM meshes: {}", meshes.len(), meshes.join(", "));

        let run = CollectorRun::create(self.collector_type().name(), &self.root)?;
        let mut outcome = CollectOutcome::new(run);

        outcome
            .run
            .export_batch(&self.kubectl, &ground_truth_artifacts(), "OSM ground truth");

        for mesh in &meshes {
            if !self.running.is_running() {
                info!("Stop requested, skipping remaining meshes");
                break;
            }
            if let Err(e) = self.collect_mesh(&mut outcome.run, mesh) {
                warn!("Failed to collect mesh {}: {}", mesh, e);
                outcome.fail(format!("mesh {}", mesh), &e);
            }
        }

        Ok(outcome)
    }
}

fn meshes_query() -> Query {
    Query::new([
        "get",
        "deployments",
        "--all-namespaces",
        "--selector",
        CONTROLLER_SELECTOR,
        "-o=jsonpath={..meshName}",
    ])
}

fn monitored_namespaces_query(mesh: &str) -> Query {
    Query::new([
        "get".to_string(),
        "namespaces".to_string(),
        "--selector".to_string(),
        format!("{}={}", MONITORED_BY_LABEL, mesh),
        "-o=jsonpath={..name}".to_string(),
    ])
}

fn controller_namespaces_query(mesh: &str) -> Query {
    Query::new([
        "get".to_string(),
        "deployments".to_string(),
        "--all-namespaces".to_string(),
        "--selector".to_string(),
        mesh_controller_selector(mesh),
        "-o=jsonpath={..metadata.namespace}".to_string(),
    ])
}

/// Selects the controllers belonging to `mesh` only.
fn mesh_controller_selector(mesh: &str) -> String {
    format!("{},meshName={}", CONTROLLER_SELECTOR, mesh)
}

fn controller_pods_query(mesh: &str) -> Query {
    Query::new([
        "get".to_string(),
        "pods".to_string(),
        "--all-namespaces".to_string(),
        "--selector".to_string(),
        mesh_controller_selector(mesh),
        "-o=custom-columns=NAME:{..metadata.name},NAMESPACE:{..metadata.namespace}".to_string(),
    ])
}

fn pods_query(namespace: &str) -> Query {
    Query::new([
        "get",
        "pods",
        "-n",
        namespace,
        "-o=jsonpath={.items[*].metadata.name}",
    ])
}

fn pod_config_query(namespace: &str, pod: &str) -> Query {
    Query::new(["get", "pods", "-n", namespace, pod, "-o", "json"])
}

/// Cluster-wide OSM resources, independent of any mesh.
fn ground_truth_artifacts() -> Vec<Artifact> {
    let select = format!("--selector={}", OSM_RESOURCES_SELECTOR);
    vec![
        Artifact::new(
            "osm_all_resources_table",
            ["get", "all", "--all-namespaces", select.as_str(), "-o=wide"],
        ),
        Artifact::new(
            "osm_all_resources_configs",
            ["get", "all", "--all-namespaces", select.as_str(), "-o=json"],
        ),
        Artifact::new(
            "osm_mutating_webhook_configurations",
            ["get", "MutatingWebhookConfiguration", "--all-namespaces", select.as_str(), "-o=json"],
        ),
        Artifact::new(
            "osm_validating_webhook_configurations",
            ["get", "ValidatingWebhookConfiguration", "--all-namespaces", select.as_str(), "-o=json"],
        ),
    ]
}

/// Resource dumps of one namespace, in emission order.
fn namespace_artifacts(mesh: &str, namespace: &str) -> Vec<Artifact> {
    let name = |kind: &str| file_name(&[mesh, namespace, kind]);
    let mut artifacts = vec![Artifact::new(
        name("metadata"),
        ["get", "namespaces", namespace, "-o=json"],
    )];

    for (kind, resource) in [
        ("services", "services"),
        ("endpoints", "endpoints"),
        ("configmaps", "configmaps"),
        ("ingresses", "ingresses"),
        ("service_accounts", "serviceaccounts"),
    ] {
        artifacts.push(Artifact::new(
            name(&format!("{}_table", kind)),
            ["get", resource, "-n", namespace],
        ));
        artifacts.push(Artifact::new(
            name(&format!("{}_configs", kind)),
            ["get", resource, "-n", namespace, "-o", "json"],
        ));
    }

    artifacts.push(Artifact::new(
        name("pods_table"),
        ["get", "pods", "-n", namespace, "-o=wide"],
    ));
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockHttp, MockRunner};
    use crate::collector::probe::{ENVOY_QUERIES, ProbeConfig, REDACTED};
    use std::time::Duration;

    fn collector(runner: MockRunner, http: MockHttp, root: &std::path::Path) -> OsmCollector<MockRunner, MockHttp> {
        let probe = EnvoyProbe::new(http, ProbeConfig::new(15000, 15000, 2, Duration::ZERO));
        OsmCollector::new(Kubectl::new(runner), probe, root.join("osm"))
    }

    fn written(outcome: &CollectOutcome) -> Vec<String> {
        outcome
            .run
            .files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_namespace_artifacts() {
        let artifacts = namespace_artifacts("mesh-a", "ns1");
        assert_eq!(artifacts.len(), 12);
        assert_eq!(artifacts[0].name, "mesh-a_ns1_metadata");
        assert_eq!(artifacts[1].name, "mesh-a_ns1_services_table");
        assert_eq!(artifacts[1].query.to_string(), "get services -n ns1");
        assert_eq!(artifacts[10].name, "mesh-a_ns1_service_accounts_configs");
        assert_eq!(
            artifacts[10].query.to_string(),
            "get serviceaccounts -n ns1 -o json"
        );
        assert_eq!(artifacts[11].name, "mesh-a_ns1_pods_table");
    }

    #[test]
    fn test_query_selectors_preserved() {
        assert_eq!(
            meshes_query().to_string(),
            "get deployments --all-namespaces --selector app=osm-controller -o=jsonpath={..meshName}"
        );
        assert_eq!(
            monitored_namespaces_query("mesh-a").to_string(),
            "get namespaces --selector openservicemesh.io/monitored-by=mesh-a -o=jsonpath={..name}"
        );
        assert_eq!(
            controller_pods_query("mesh-a").to_string(),
            "get pods --all-namespaces --selector app=osm-controller,meshName=mesh-a -o=custom-columns=NAME:{..metadata.name},NAMESPACE:{..metadata.namespace}"
        );
    }

    #[test]
    fn test_end_to_end_single_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector(MockRunner::osm_mesh(), MockHttp::envoy_admin(15000), dir.path());

        let outcome = collector.collect().unwrap();
        assert!(outcome.failures.is_empty());

        let files = written(&outcome);
        for expected in [
            "osm_all_resources_table",
            "mesh-a_ns1_services_table",
            "mesh-a_ns1_pod_config_web-1",
            "mesh-a_osm-system_services_table",
            "mesh-a_controller_logs_osm-controller-5d8f9",
        ] {
            assert!(files.contains(&expected.to_string()), "missing {}", expected);
        }
        for query in ENVOY_QUERIES {
            let name = format!("mesh-a_ns1_envoy_{}_web-1", query);
            let path = outcome.run.root().join(&name);
            let content = std::fs::read_to_string(&path).unwrap();
            assert!(!content.contains("inline_bytes"), "{} not redacted", name);
        }
        let config_dump =
            std::fs::read_to_string(outcome.run.root().join("mesh-a_ns1_envoy_config_dump_web-1"))
                .unwrap();
        assert_eq!(config_dump.matches(REDACTED).count(), 2);

        // One tunnel per pod (web-1 and the controller), all released.
        let runner = collector.kubectl().runner();
        assert_eq!(runner.spawned().len(), 2);
        assert_eq!(runner.kills(), 2);
    }

    #[test]
    fn test_no_meshes_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::new();
        runner.respond(meshes_query().args(), "");
        let collector = collector(runner, MockHttp::new(), dir.path());

        let err = collector.collect().unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("osm").exists());
    }

    #[test]
    fn test_failed_mesh_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::osm_mesh();
        runner.respond(meshes_query().args(), "broken mesh-a");
        runner.fail(
            monitored_namespaces_query("broken").args(),
            "error: connection refused",
        );
        let collector = collector(runner, MockHttp::envoy_admin(15000), dir.path());

        let outcome = collector.collect().unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].scope, "mesh broken");
        assert!(written(&outcome).contains(&"mesh-a_ns1_pod_config_web-1".to_string()));
    }

    #[test]
    fn test_namespace_union_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::new();
        runner.respond(monitored_namespaces_query("m").args(), "ns1 osm-system");
        runner.respond(controller_namespaces_query("m").args(), "osm-system");
        let collector = collector(runner, MockHttp::new(), dir.path());

        assert_eq!(collector.mesh_namespaces("m").unwrap(), vec!["ns1", "osm-system"]);
    }

    #[test]
    fn test_namespace_union_with_nothing_monitored() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::new();
        runner.respond(monitored_namespaces_query("m").args(), "");
        runner.respond(controller_namespaces_query("m").args(), "osm-system");
        let collector = collector(runner, MockHttp::new(), dir.path());

        assert_eq!(collector.mesh_namespaces("m").unwrap(), vec!["osm-system"]);
    }

    #[test]
    fn test_stop_flag_skips_meshes() {
        let dir = tempfile::tempdir().unwrap();
        let running = Running::new();
        running.stop();
        let collector = collector(MockRunner::osm_mesh(), MockHttp::envoy_admin(15000), dir.path())
            .with_running(running);

        let outcome = collector.collect().unwrap();
        // Ground truth only.
        assert_eq!(outcome.run.files().len(), 4);
        assert!(collector.kubectl().runner().spawned().is_empty());
    }

    #[test]
    fn test_controller_rows_without_namespace_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::new();
        runner.respond(
            controller_pods_query("m").args(),
            "NAME NAMESPACE\nlonely\nctl-1 osm-system\n",
        );
        runner.respond(["logs", "-n", "osm-system", "ctl-1"], "started\n");
        let collector = collector(runner, MockHttp::new(), dir.path());
        let mut run = CollectorRun::create("osm", dir.path()).unwrap();

        collector.collect_controller_logs(&mut run, "m").unwrap();
        assert_eq!(run.files().len(), 1);
        assert!(run.files()[0].ends_with("m_controller_logs_ctl-1"));
    }

    #[test]
    fn test_controller_logs_stay_with_their_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockRunner::new();
        runner.respond(
            controller_pods_query("mesh-a").args(),
            "NAME NAMESPACE\nctl-a osm-a\n",
        );
        runner.respond(
            controller_pods_query("mesh-b").args(),
            "NAME NAMESPACE\nctl-b osm-b\n",
        );
        runner.respond(["logs", "-n", "osm-a", "ctl-a"], "a\n");
        runner.respond(["logs", "-n", "osm-b", "ctl-b"], "b\n");
        let collector = collector(runner, MockHttp::new(), dir.path());
        let mut run = CollectorRun::create("osm", dir.path()).unwrap();

        collector.collect_controller_logs(&mut run, "mesh-a").unwrap();
        collector.collect_controller_logs(&mut run, "mesh-b").unwrap();

        let names: Vec<String> = run
            .files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["mesh-a_controller_logs_ctl-a", "mesh-b_controller_logs_ctl-b"]);
    }
}
