//! Live sidecar proxy scraping over a port-forward tunnel.
//!
//! For each pod the probe walks through a fixed sequence:
//!
//! ```text
//!   Idle ──spawn port-forward──▶ TunnelOpen ──▶ Scraping ──release──▶ TunnelClosed
//!     │                                          │   ▲
//!     └─ spawn failed: log, skip pod              └───┘ one retried GET per query
//! ```
//!
//! Every response is redacted before it is written. The tunnel is owned by a
//! `TunnelHandle`, so it is released on every path out of `probe_pod`.

mod redact;
mod tunnel;

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::collector::kubectl::Kubectl;
use crate::collector::run::{CollectorRun, file_name};
use crate::collector::traits::{CommandRunner, HttpClient};
use crate::error::CollectError;

pub use redact::{REDACTED, RedactionRule, redact};
pub use tunnel::TunnelHandle;

/// Envoy admin paths scraped from every pod, in scrape order.
pub const ENVOY_QUERIES: [&str; 5] = ["config_dump", "clusters", "listeners", "ready", "stats"];

/// Tunnel and retry settings for the sidecar probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Local end of the port-forward.
    pub local_port: u16,
    /// Envoy admin port inside the pod.
    pub remote_port: u16,
    /// Attempts per query, including the first one.
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            local_port: 15000,
            remote_port: 15000,
            max_attempts: 5,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl ProbeConfig {
    /// Creates a ProbeConfig with custom values.
    pub fn new(local_port: u16, remote_port: u16, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            local_port,
            remote_port,
            max_attempts,
            retry_delay,
        }
    }

    /// Admin URL for `query` on the local end of the tunnel.
    pub fn url(&self, query: &str) -> String {
        format!("http://localhost:{}/{}", self.local_port, query)
    }
}

/// Outcome of probing one pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Whether the port-forward started.
    pub tunnel_opened: bool,
    /// Responses written to disk.
    pub written: usize,
    /// Queries given up on after exhausting retries (or failing to write).
    pub skipped: usize,
}

/// Issues a GET up to `max_attempts` times, sleeping `delay` between failures.
///
/// The first success is returned immediately. When every attempt fails the
/// last error is returned once.
pub fn fetch_with_retries<H: HttpClient + ?Sized>(
    http: &H,
    url: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<String, CollectError> {
    let max_attempts = max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match http.get(url) {
            Ok(body) => return Ok(body),
            Err(e) => {
                debug!(
                    "GET {} failed: {}. {} retries remaining",
                    url,
                    e,
                    max_attempts - attempt
                );
                last_error = e;
            }
        }
        if attempt < max_attempts && !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    Err(CollectError::Http {
        url: url.to_string(),
        message: format!("{} (after {} attempts)", last_error, max_attempts),
    })
}

/// Scrapes the Envoy admin endpoint of mesh pods.
pub struct EnvoyProbe<H: HttpClient> {
    http: H,
    config: ProbeConfig,
}

impl<H: HttpClient> EnvoyProbe<H> {
    pub fn new(http: H, config: ProbeConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    /// Opens a tunnel to `pod`, scrapes every admin query and closes the tunnel.
    ///
    /// Never fails: a pod whose tunnel cannot start is skipped, and a query
    /// that keeps failing is skipped while the remaining ones still run.
    pub fn probe_pod<R: CommandRunner>(
        &self,
        kubectl: &Kubectl<R>,
        run: &mut CollectorRun,
        mesh: &str,
        namespace: &str,
        pod: &str,
    ) -> ProbeReport {
        let mut report = ProbeReport::default();

        let tunnel = match kubectl.port_forward(
            namespace,
            pod,
            self.config.local_port,
            self.config.remote_port,
        ) {
            Ok(tunnel) => tunnel,
            Err(e) => {
                warn!("Skipping Envoy probe of {} in mesh {}: {}", pod, mesh, e);
                return report;
            }
        };
        report.tunnel_opened = true;

        for query in ENVOY_QUERIES {
            let url = self.config.url(query);
            let body = match fetch_with_retries(
                &self.http,
                &url,
                self.config.max_attempts,
                self.config.retry_delay,
            ) {
                Ok(body) => body,
                Err(e) => {
                    warn!(
                        "Failed to collect Envoy {} of pod {} in {}/{}: {}",
                        query, pod, mesh, namespace, e
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            let name = file_name(&[mesh, namespace, "envoy", query, pod]);
            match run.write_file(&name, &redact(&body)) {
                Ok(_) => report.written += 1,
                Err(e) => {
                    warn!("Failed to write {}: {}", name, e);
                    report.skipped += 1;
                }
            }
        }

        tunnel.release();
        info!(
            "Envoy probe of {}/{}: {} written, {} skipped",
            namespace, pod, report.written, report.skipped
        );
        report
    }
}
