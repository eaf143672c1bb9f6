//! Scoped ownership of a background port-forward process.

use std::fmt;

use tracing::{debug, warn};

use crate::collector::traits::BackgroundProcess;
use crate::error::CollectError;

/// Handle on a running `kubectl port-forward`.
///
/// The process is terminated exactly once: by `release`, or on drop if the
/// handle goes out of scope without being released.
pub struct TunnelHandle {
    target: String,
    process: Option<Box<dyn BackgroundProcess>>,
}

impl TunnelHandle {
    pub(crate) fn new(target: String, process: Box<dyn BackgroundProcess>) -> Self {
        debug!("Tunnel to {} started (pid {})", target, process.id());
        Self {
            target,
            process: Some(process),
        }
    }

    /// `namespace/pod` the tunnel points at.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// OS process id while the tunnel is alive.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.id())
    }

    /// Terminates the tunnel process.
    ///
    /// A termination failure is logged and swallowed.
    pub fn release(mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        let pid = process.id();
        match process.kill() {
            Ok(()) => debug!("Tunnel to {} stopped (pid {})", self.target, pid),
            Err(e) => {
                let err = CollectError::Tunnel {
                    target: self.target.clone(),
                    message: format!("failed to kill pid {}: {}", pid, e),
                };
                warn!("{}", err);
            }
        }
    }
}

impl fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("target", &self.target)
            .field("pid", &self.pid())
            .finish()
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockRunner;
    use crate::collector::traits::CommandRunner;

    fn open(runner: &MockRunner) -> TunnelHandle {
        let process = runner.spawn("kubectl", &[]).unwrap();
        TunnelHandle::new("ns1/web-1".to_string(), process)
    }

    #[test]
    fn test_release_kills_once() {
        let runner = MockRunner::new();
        let tunnel = open(&runner);
        assert!(tunnel.pid().is_some());
        tunnel.release();
        assert_eq!(runner.kills(), 1);
    }

    #[test]
    fn test_debug_shows_target_and_pid() {
        let runner = MockRunner::new();
        let tunnel = open(&runner);
        let pid = tunnel.pid().unwrap();
        assert_eq!(
            format!("{:?}", tunnel),
            format!("TunnelHandle {{ target: \"ns1/web-1\", pid: Some({}) }}", pid)
        );
        tunnel.release();
    }

    #[test]
    fn test_drop_kills_unreleased() {
        let runner = MockRunner::new();
        {
            let _tunnel = open(&runner);
        }
        assert_eq!(runner.kills(), 1);
    }

    #[test]
    fn test_kill_failure_is_swallowed() {
        let mut runner = MockRunner::new();
        runner.fail_kills();
        open(&runner).release();
        assert_eq!(runner.kills(), 1);
    }

    #[test]
    fn test_release_on_unwind() {
        let runner = MockRunner::new();
        let clone = runner.clone();
        let result: std::thread::Result<()> = std::panic::catch_unwind(move || {
            let _tunnel = open(&clone);
            panic!("scrape blew up");
        });
        assert!(result.is_err());
        assert_eq!(runner.kills(), 1);
    }
}
