//! Abstractions over the processes and endpoints a collector talks to.
//!
//! The `CommandRunner` trait lets collectors drive the real `kubectl` binary
//! in production and a scripted mock in tests. `HttpClient` does the same for
//! the sidecar admin endpoint reached through a port-forward tunnel.

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::debug;

/// Raw result of one finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Human-readable exit status (e.g. "exit status: 1").
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// A process running in the background until killed.
pub trait BackgroundProcess: Send {
    /// OS process identifier.
    fn id(&self) -> u32;

    /// Terminates the process and reaps it.
    fn kill(&mut self) -> io::Result<()>;
}

/// Abstraction for running external commands.
pub trait CommandRunner: Send + Sync {
    /// Runs a command to completion, capturing stdout and stderr separately.
    ///
    /// # Returns
    /// The captured output, or an I/O error if the process could not be started.
    fn output(&self, program: &str, args: &[String]) -> io::Result<ProcessOutput>;

    /// Starts a command in the background without waiting for it.
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Box<dyn BackgroundProcess>>;
}

/// Runs commands on the local system through `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealRunner;

impl RealRunner {
    /// Creates a new `RealRunner` instance.
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for RealRunner {
    fn output(&self, program: &str, args: &[String]) -> io::Result<ProcessOutput> {
        let out = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok(ProcessOutput {
            success: out.status.success(),
            status: out.status.to_string(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Box<dyn BackgroundProcess>> {
        // Output is discarded: an unread pipe would eventually block the child.
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Box::new(RealProcess { child }))
    }
}

struct RealProcess {
    child: Child,
}

impl BackgroundProcess for RealProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn kill(&mut self) -> io::Result<()> {
        // An already-exited child is not an error, it only needs reaping.
        if self.child.try_wait()?.is_none() {
            self.child.kill()?;
        }
        self.child.wait()?;
        Ok(())
    }
}

/// Abstraction for plain HTTP GET requests.
pub trait HttpClient: Send + Sync {
    /// Issues a GET and returns the response body.
    ///
    /// Any response the server sends back, whatever its status, yields its
    /// body. Only transport failures are reported as `Err`, with a
    /// description suitable for logging.
    fn get(&self, url: &str) -> Result<String, String>;
}

/// `HttpClient` backed by a blocking `ureq` agent.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str) -> Result<String, String> {
        let resp = match self.agent.get(url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                debug!("GET {} answered status {}", url, code);
                resp
            }
            Err(e) => return Err(e.to_string()),
        };
        read_body(resp).map_err(|e| format!("reading body of {}: {}", url, e))
    }
}

/// Reads the whole body. `Response::into_string` caps bodies at 10 MB, which
/// admin dumps of large meshes exceed.
fn read_body(resp: ureq::Response) -> io::Result<String> {
    let mut raw = Vec::new();
    resp.into_reader().read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_runner_captures_streams() {
        let runner = RealRunner::new();
        let args = vec!["-c".to_string(), "echo out; echo err >&2".to_string()];
        let out = runner.output("sh", &args).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[test]
    fn test_real_runner_reports_non_zero_exit() {
        let runner = RealRunner::new();
        let args = vec!["-c".to_string(), "exit 3".to_string()];
        let out = runner.output("sh", &args).unwrap();
        assert!(!out.success);
        assert!(out.status.contains('3'));
    }

    #[test]
    fn test_real_runner_missing_binary() {
        let runner = RealRunner::new();
        assert!(runner.output("/nonexistent/binary/12345", &[]).is_err());
        assert!(runner.spawn("/nonexistent/binary/12345", &[]).is_err());
    }

    #[test]
    fn test_real_process_kill_reaps() {
        let runner = RealRunner::new();
        let mut process = runner.spawn("sleep", &["30".to_string()]).unwrap();
        assert!(process.id() > 0);
        process.kill().unwrap();
    }

    /// Serves one canned HTTP response on a loopback port and returns its URL.
    fn serve_once(status: &str, body: Vec<u8>) -> (String, std::thread::JoinHandle<()>) {
        use std::io::Write;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            stream.flush().unwrap();
        });
        (format!("http://{}/ready", addr), handle)
    }

    #[test]
    fn test_ureq_client_returns_body() {
        let (url, server) = serve_once("200 OK", b"LIVE\n".to_vec());
        let client = UreqClient::new(Duration::from_secs(5));
        assert_eq!(client.get(&url).unwrap(), "LIVE\n");
        server.join().unwrap();
    }

    #[test]
    fn test_ureq_client_keeps_error_status_body() {
        let (url, server) = serve_once("503 Service Unavailable", b"PRE_INITIALIZING\n".to_vec());
        let client = UreqClient::new(Duration::from_secs(5));
        assert_eq!(client.get(&url).unwrap(), "PRE_INITIALIZING\n");
        server.join().unwrap();
    }

    #[test]
    fn test_not_ready_sidecar_body_is_not_retried() {
        let (url, server) = serve_once("503 Service Unavailable", b"DRAINING\n".to_vec());
        let client = UreqClient::new(Duration::from_secs(5));
        let body =
            crate::collector::probe::fetch_with_retries(&client, &url, 3, Duration::ZERO).unwrap();
        assert_eq!(body, "DRAINING\n");
        server.join().unwrap();
    }

    #[test]
    fn test_ureq_client_reads_large_body() {
        let size = 11 * 1024 * 1024;
        let (url, server) = serve_once("200 OK", vec![b'x'; size]);
        let client = UreqClient::new(Duration::from_secs(30));
        let body = client.get(&url).unwrap();
        assert_eq!(body.len(), size);
        server.join().unwrap();
    }

    #[test]
    fn test_ureq_client_connection_refused() {
        let client = UreqClient::new(Duration::from_millis(500));
        assert!(client.get("http://127.0.0.1:1/ready").is_err());
    }
}
