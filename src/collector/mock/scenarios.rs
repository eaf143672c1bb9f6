//! Pre-built cluster scenarios for testing.
//!
//! These scenarios script realistic kubectl and Envoy admin responses for a
//! small cluster so collectors can be exercised end to end.

use super::http::MockHttp;
use super::runner::MockRunner;
use crate::collector::probe::ENVOY_QUERIES;

/// Envoy config dump fragment carrying an inline certificate.
const CONFIG_DUMP: &str = r#"{
 "configs": [
  {
   "@type": "type.googleapis.com/envoy.admin.v3.SecretsConfigDump",
   "dynamic_active_secrets": [
    {
     "name": "service-cert:ns1/web",
     "secret": {
      "tls_certificate": {
       "certificate_chain": {
        "inline_bytes": "LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0t"
       },
       "private_key": {
        "inline_bytes": "W3JlZGFjdGVkXQ=="
       }
      }
     }
    }
   ]
  }
 ]
}
"#;

#[allow(dead_code)]
impl MockRunner {
    /// Scripts one call per line of `command`, split on single spaces.
    fn respond_line(&mut self, command: &str, stdout: &str) {
        self.respond(command.split(' '), stdout);
    }

    /// A cluster with one OSM mesh.
    ///
    /// Mesh `mesh-a` monitors `ns1` (pod `web-1`); its controller
    /// `osm-controller-5d8f9` runs in `osm-system`.
    pub fn osm_mesh() -> Self {
        let mut runner = Self::new();

        runner.respond_line(
            "get deployments --all-namespaces --selector app=osm-controller -o=jsonpath={..meshName}",
            "mesh-a",
        );
        for (kind, format) in [
            ("all", "-o=wide"),
            ("all", "-o=json"),
            ("MutatingWebhookConfiguration", "-o=json"),
            ("ValidatingWebhookConfiguration", "-o=json"),
        ] {
            runner.respond_line(
                &format!(
                    "get {} --all-namespaces --selector=app.kubernetes.io/name=openservicemesh.io {}",
                    kind, format
                ),
                "{\"items\": []}\n",
            );
        }

        runner.respond_line(
            "get namespaces --selector openservicemesh.io/monitored-by=mesh-a -o=jsonpath={..name}",
            "ns1",
        );
        runner.respond_line(
            "get deployments --all-namespaces --selector app=osm-controller,meshName=mesh-a -o=jsonpath={..metadata.namespace}",
            "osm-system",
        );

        for (namespace, pod) in [("ns1", "web-1"), ("osm-system", "osm-controller-5d8f9")] {
            runner.respond_line(
                &format!("get namespaces {} -o=json", namespace),
                &format!("{{\"metadata\": {{\"name\": \"{}\"}}}}\n", namespace),
            );
            for resource in ["services", "endpoints", "configmaps", "ingresses", "serviceaccounts"] {
                runner.respond_line(
                    &format!("get {} -n {}", resource, namespace),
                    "NAME   AGE\nweb    3d\n",
                );
                runner.respond_line(
                    &format!("get {} -n {} -o json", resource, namespace),
                    "{\"items\": []}\n",
                );
            }
            runner.respond_line(
                &format!("get pods -n {} -o=wide", namespace),
                &format!("NAME   READY   STATUS\n{}   2/2   Running\n", pod),
            );
            runner.respond_line(
                &format!("get pods -n {} -o=jsonpath={{.items[*].metadata.name}}", namespace),
                pod,
            );
            runner.respond_line(
                &format!("get pods -n {} {} -o json", namespace, pod),
                &format!("{{\"metadata\": {{\"name\": \"{}\"}}}}\n", pod),
            );
        }

        runner.respond_line(
            "get pods --all-namespaces --selector app=osm-controller,meshName=mesh-a -o=custom-columns=NAME:{..metadata.name},NAMESPACE:{..metadata.namespace}",
            "NAME                   NAMESPACE\nosm-controller-5d8f9   osm-system\n",
        );
        runner.respond_line(
            "logs -n osm-system osm-controller-5d8f9",
            "{\"level\":\"info\",\"message\":\"Starting osm-controller\"}\n",
        );

        runner
    }

    /// A cluster with two SMI CRDs and one unrelated CRD.
    ///
    /// `trafficsplits` has `split-a` in `ns1`; `httproutegroups` has
    /// `routes` in `ns1`; namespace `default` holds no SMI resources.
    pub fn smi_cluster() -> Self {
        let mut runner = Self::new();
        let splits = "trafficsplits.split.smi-spec.io";
        let routes = "httproutegroups.specs.smi-spec.io";

        runner.respond_line(
            "get crds -o=jsonpath={..metadata.name}",
            &format!("{} meshconfigs.config.openservicemesh.io {}", routes, splits),
        );
        runner.respond_line("get namespaces -o=jsonpath={..metadata.name}", "default ns1");

        for crd in [splits, routes] {
            runner.respond_line(
                &format!("get crd {} -o yaml", crd),
                &format!("apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: {}\n", crd),
            );
            runner.respond_line(
                &format!("get {} --all-namespaces -o=wide", crd),
                "NAMESPACE   NAME\nns1         x\n",
            );
            runner.respond_line(
                &format!("get {} --all-namespaces -o=json", crd),
                "{\"items\": []}\n",
            );
            runner.respond_line(
                &format!("get {} -n default -o=jsonpath={{..metadata.name}}", crd),
                "",
            );
        }

        for (crd, name) in [(splits, "split-a"), (routes, "routes")] {
            runner.respond_line(
                &format!("get {} -n ns1 -o=jsonpath={{..metadata.name}}", crd),
                name,
            );
            runner.respond_line(
                &format!("get {} {} -n ns1 -o yaml", crd, name),
                &format!("metadata:\n  name: {}\n  namespace: ns1\n", name),
            );
        }

        runner
    }
}

#[allow(dead_code)]
impl MockHttp {
    /// An Envoy admin endpoint answering every scraped query on `port`.
    pub fn envoy_admin(port: u16) -> Self {
        let http = Self::new();
        for query in ENVOY_QUERIES {
            let body = match query {
                "config_dump" => CONFIG_DUMP.to_string(),
                "clusters" => "outbound|80||web.ns1.svc.cluster.local::default_priority::max_connections::1024\n".to_string(),
                "listeners" => "outbound-listener::0.0.0.0:15001\ninbound-listener::0.0.0.0:15003\n".to_string(),
                "ready" => "LIVE\n".to_string(),
                _ => "server.live: 1\nserver.uptime: 3600\n".to_string(),
            };
            http.respond(format!("http://localhost:{}/{}", port, query), body);
        }
        http
    }
}
