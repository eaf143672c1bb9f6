//! Running kubectl queries and parsing their output.

use std::fmt;

use tracing::debug;

use crate::collector::probe::TunnelHandle;
use crate::collector::resources::ResourceList;
use crate::collector::traits::CommandRunner;
use crate::error::CollectError;

/// Default kubectl binary, resolved through `PATH`.
pub const DEFAULT_KUBECTL: &str = "kubectl";

/// One kubectl invocation as a literal argument vector.
///
/// Output-format selectors (`-o=jsonpath=...`, `-o=custom-columns=...`,
/// `-o json`, `-o yaml`, `-o=wide`) are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    args: Vec<String>,
}

impl Query {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Resource type the query is about (`get <subject> ...`).
    pub fn subject(&self) -> &str {
        match self.args.first().map(String::as_str) {
            Some("get") => self.args.get(1).map(String::as_str).unwrap_or(""),
            Some(first) => first,
            None => "",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// Captured streams of one successful query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputStreams {
    /// Payload of interest.
    pub stdout: String,
    /// Informational only, never parsed.
    pub stderr: String,
}

/// Cluster query client that shells out to kubectl.
pub struct Kubectl<R: CommandRunner> {
    runner: R,
    binary: String,
}

impl<R: CommandRunner> Kubectl<R> {
    /// Creates a client using the default `kubectl` binary.
    pub fn new(runner: R) -> Self {
        Self::with_binary(runner, DEFAULT_KUBECTL)
    }

    /// Creates a client using a specific kubectl binary path.
    pub fn with_binary(runner: R, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs `query` and waits for it to finish.
    ///
    /// No retry happens here; a non-zero exit or a spawn failure is returned
    /// as `CollectError::Execution` with the captured stderr.
    pub fn run(&self, query: &Query) -> Result<OutputStreams, CollectError> {
        debug!("Running {} {}", self.binary, query);
        let out = self
            .runner
            .output(&self.binary, query.args())
            .map_err(|e| CollectError::Execution {
                command: self.describe(query),
                stderr: String::new(),
                cause: e.to_string(),
            })?;

        if !out.success {
            return Err(CollectError::Execution {
                command: self.describe(query),
                stderr: out.stderr,
                cause: out.status,
            });
        }

        Ok(OutputStreams {
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }

    /// Runs `query` and splits its output into resource identifiers.
    ///
    /// Empty output yields `CollectError::NotFound` rather than an empty list.
    pub fn list(&self, query: &Query, separator: &str) -> Result<ResourceList, CollectError> {
        let streams = self.run(query)?;
        ResourceList::parse(&streams.stdout, separator, query.subject())
    }

    /// Starts `kubectl port-forward` to `pod` in the background.
    pub fn port_forward(
        &self,
        namespace: &str,
        pod: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<TunnelHandle, CollectError> {
        let args = vec![
            "port-forward".to_string(),
            format!("pod/{}", pod),
            "-n".to_string(),
            namespace.to_string(),
            format!("{}:{}", local_port, remote_port),
        ];
        let target = format!("{}/{}", namespace, pod);
        let process = self
            .runner
            .spawn(&self.binary, &args)
            .map_err(|e| CollectError::Tunnel {
                target: target.clone(),
                message: format!("failed to start port-forward: {}", e),
            })?;
        Ok(TunnelHandle::new(target, process))
    }

    fn describe(&self, query: &Query) -> String {
        format!("{} {}", self.binary, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockRunner;

    #[test]
    fn test_query_subject() {
        assert_eq!(Query::new(["get", "services", "-n", "ns1"]).subject(), "services");
        assert_eq!(Query::new(["logs", "-n", "ns1", "pod"]).subject(), "logs");
        assert_eq!(Query::new(["port-forward"]).subject(), "port-forward");
        assert_eq!(Query::new(Vec::<String>::new()).subject(), "");
    }

    #[test]
    fn test_run_success() {
        let mut runner = MockRunner::new();
        runner.respond(["get", "pods"], "NAME\nweb-1\n");
        let kubectl = Kubectl::new(runner);

        let out = kubectl.run(&Query::new(["get", "pods"])).unwrap();
        assert_eq!(out.stdout, "NAME\nweb-1\n");
        assert_eq!(kubectl.runner().calls(), vec!["get pods".to_string()]);
    }

    #[test]
    fn test_run_non_zero_exit() {
        let mut runner = MockRunner::new();
        runner.fail(["get", "widgets"], "error: the server doesn't have a resource type");
        let kubectl = Kubectl::with_binary(runner, "/usr/local/bin/kubectl");

        let err = kubectl.run(&Query::new(["get", "widgets"])).unwrap_err();
        match err {
            CollectError::Execution {
                command, stderr, ..
            } => {
                assert_eq!(command, "/usr/local/bin/kubectl get widgets");
                assert!(stderr.contains("doesn't have a resource type"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_list_empty_is_not_found() {
        let mut runner = MockRunner::new();
        runner.respond(["get", "deployments", "-o=jsonpath={..meshName}"], "");
        let kubectl = Kubectl::new(runner);

        let err = kubectl
            .list(&Query::new(["get", "deployments", "-o=jsonpath={..meshName}"]), " ")
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("deployments"));
    }

    #[test]
    fn test_port_forward_args() {
        let runner = MockRunner::new();
        let kubectl = Kubectl::new(runner);

        let tunnel = kubectl.port_forward("ns1", "web-1", 15000, 15001).unwrap();
        assert_eq!(tunnel.target(), "ns1/web-1");
        tunnel.release();

        let runner = kubectl.runner();
        assert_eq!(
            runner.spawned(),
            vec!["port-forward pod/web-1 -n ns1 15000:15001".to_string()]
        );
        assert_eq!(runner.kills(), 1);
    }

    #[test]
    fn test_port_forward_spawn_failure() {
        let mut runner = MockRunner::new();
        runner.fail_spawns();
        let kubectl = Kubectl::new(runner);

        let err = kubectl.port_forward("ns1", "web-1", 15000, 15000).unwrap_err();
        assert!(matches!(err, CollectError::Tunnel { .. }));
        assert_eq!(kubectl.runner().kills(), 0);
    }
}
