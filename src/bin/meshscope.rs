//! meshscope - service mesh diagnostic collector.
//!
//! Runs the selected collectors once against the current kubectl context and
//! writes their output, plus a manifest per collector, under the output dir.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use meshscope::CollectError;
use meshscope::collector::{
    CollectOutcome, Collector, CollectorType, EnvoyProbe, Kubectl, OsmCollector, ProbeConfig,
    RealRunner, Running, SmiCollector, UreqClient,
};
use meshscope::config::{CollectorConfig, run_id};
use meshscope::export::{Exporter, ManifestExporter};
use meshscope::util::node_name;

/// Service mesh diagnostic collector.
#[derive(Parser)]
#[command(name = "meshscope", about = "Service mesh diagnostic collector", version)]
struct Args {
    /// Collectors to run (repeatable). Defaults to all.
    #[arg(short, long = "collector", value_enum)]
    collectors: Vec<CollectorType>,

    /// Output directory for collected files.
    #[arg(short, long, env = "MESHSCOPE_OUTPUT_DIR", default_value = "./meshscope-output")]
    output_dir: PathBuf,

    /// kubectl binary to invoke.
    #[arg(long, env = "KUBECTL", default_value = "kubectl")]
    kubectl: String,

    /// Node name used in the output path. Detected when not set.
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Local port of the Envoy admin tunnel.
    #[arg(long, default_value = "15000")]
    local_port: u16,

    /// Envoy admin port inside the pod.
    #[arg(long, default_value = "15000")]
    remote_port: u16,

    /// Attempts per Envoy admin query.
    #[arg(long, default_value = "5")]
    max_attempts: u32,

    /// Seconds to wait between failed Envoy admin attempts.
    #[arg(long, default_value = "5")]
    retry_delay_secs: u64,

    /// Timeout in seconds for a single Envoy admin request.
    #[arg(long, default_value = "10")]
    http_timeout_secs: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> CollectorConfig {
        CollectorConfig {
            output_dir: self.output_dir.clone(),
            kubectl: self.kubectl.clone(),
            node_name: self
                .node_name
                .clone()
                .unwrap_or_else(|| node_name().to_string()),
            run_id: run_id(chrono::Utc::now()),
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            probe: ProbeConfig::new(
                self.local_port,
                self.remote_port,
                self.max_attempts,
                Duration::from_secs(self.retry_delay_secs),
            ),
        }
    }

    fn collector_types(&self) -> Vec<CollectorType> {
        if self.collectors.is_empty() {
            vec![CollectorType::Osm, CollectorType::Smi]
        } else {
            self.collectors.clone()
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = match format!("meshscope={}", level).parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_collector(
    kind: CollectorType,
    config: &CollectorConfig,
    running: &Running,
) -> Box<dyn Collector> {
    let kubectl = Kubectl::with_binary(RealRunner::new(), &config.kubectl);
    let root = config.collector_root(kind.name());
    match kind {
        CollectorType::Osm => {
            let probe = EnvoyProbe::new(UreqClient::new(config.http_timeout), config.probe.clone());
            Box::new(OsmCollector::new(kubectl, probe, root).with_running(running.clone()))
        }
        CollectorType::Smi => {
            Box::new(SmiCollector::new(kubectl, root).with_running(running.clone()))
        }
    }
}

fn report(kind: CollectorType, outcome: &CollectOutcome) {
    info!(
        "Collector {}: {} files in {}",
        kind,
        outcome.run.files().len(),
        outcome.run.root().display()
    );
    for failure in &outcome.failures {
        warn!("Collector {}: skipped {}: {}", kind, failure.scope, failure.reason);
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = args.config();
    info!("meshscope {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: output={}, run={}, node={}, kubectl={}",
        config.output_dir.display(),
        config.run_id,
        config.node_name,
        config.kubectl
    );

    let running = Running::new();
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal, finishing current item");
        r.stop();
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let exporter = ManifestExporter::new(&config.run_id, &config.node_name);
    let mut output_failed = false;

    for kind in args.collector_types() {
        if !running.is_running() {
            break;
        }
        info!("Running collector {}", kind);
        let collector = build_collector(kind, &config, &running);
        match collector.collect() {
            Ok(outcome) => {
                report(kind, &outcome);
                if let Err(e) = exporter.export(&outcome.run) {
                    error!("Failed to export collector {}: {}", kind, e);
                }
            }
            Err(e @ CollectError::Io(_)) => {
                error!("Collector {}: cannot create output: {}", kind, e);
                output_failed = true;
            }
            Err(e) if e.is_not_found() => {
                info!("Collector {}: nothing to collect ({})", kind, e);
            }
            Err(e) => {
                error!("Collector {} failed: {}", kind, e);
            }
        }
    }

    info!("Done");
    if output_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
