//! Telemetry Agent - periodic resource and placement reporter
//!
//! Runs next to (or inside the pod of) the reported service, sampling its
//! resource usage on a fixed interval and posting it to the collection API.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use telemetry::{
    create_sampler, CredentialWatcher, KubeLocator, KubeLocatorConfig, PodSelector, Reporter,
    ReporterConfig, StructuredLogger, TelemetryLoopBuilder,
};
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Telemetry Agent
#[derive(Parser, Debug)]
#[command(name = "telemetry-agent")]
#[command(author, version, about = "Periodic resource and placement telemetry reporter", long_about = None)]
pub struct Cli {
    /// Destination tag sent in the URL; also the pod name prefix in cluster mode
    #[arg(long, env = "TELEMETRY_SERVICE_NAME", default_value = "kubeshark-hub")]
    pub service_name: String,

    /// Resolve pod and cluster identity through the Kubernetes API
    #[arg(long)]
    pub cluster: bool,

    /// Namespace searched for the reporting pod
    #[arg(long, default_value = "default")]
    pub namespace: String,

    /// Find the pod by label selector instead of name prefix
    #[arg(long)]
    pub pod_label: Option<String>,

    /// Service whose cluster IP identifies the cluster
    #[arg(long, default_value = "kubernetes")]
    pub cluster_service: String,

    /// Namespace of the cluster service
    #[arg(long, default_value = "default")]
    pub cluster_service_namespace: String,

    /// Send a single sample and exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    fn pod_selector(&self) -> PodSelector {
        match &self.pod_label {
            Some(labels) => PodSelector::Label(labels.clone()),
            None => PodSelector::Prefix(self.service_name.clone()),
        }
    }

    fn locator_config(&self) -> KubeLocatorConfig {
        KubeLocatorConfig {
            pod_namespace: self.namespace.clone(),
            cluster_service: self.cluster_service.clone(),
            cluster_service_namespace: self.cluster_service_namespace.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = config::AgentConfig::load()?;
    let enabled = config.enabled();
    info!(
        destination = %cli.service_name,
        interval_secs = config.interval().as_secs(),
        base_url = %config.url(),
        enabled,
        "Agent configured"
    );

    let logger = StructuredLogger::new(&cli.service_name);
    logger.log_startup(AGENT_VERSION, cli.cluster);

    let reporter = build_reporter(config.reporter_config())?;

    let mut builder = TelemetryLoopBuilder::new()
        .sampler(create_sampler(config.cpu_mode()))
        .emitter(Arc::new(reporter))
        .destination(cli.service_name.clone())
        .interval(config.interval())
        .enabled(enabled)
        .started(started)
        .credential(config.initial_credential());

    if cli.cluster && enabled {
        let locator = KubeLocator::connect(cli.locator_config())
            .await
            .context("Cluster mode requires access to the Kubernetes API")?;
        builder = builder.cluster(Arc::new(locator), cli.pod_selector());
    }

    let telemetry = builder.build()?;

    if cli.once {
        let outcome = telemetry.run_once().await;
        info!(outcome = ?outcome, "Single telemetry tick finished");
        return Ok(());
    }

    // Keep the watcher alive for the lifetime of the loop
    let license_file = config.license_file().filter(|_| telemetry.is_enabled());
    let (_watcher, credentials) = match license_file {
        Some(path) => {
            let (handle, rx) = CredentialWatcher::new(&path)
                .start()
                .with_context(|| format!("Failed to watch license file {}", path.display()))?;
            (Some(handle), Some(rx))
        }
        None => (None, None),
    };

    tokio::select! {
        _ = telemetry.run(credentials) => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}

/// Build the reporter, falling back to the public endpoint if the configured URL is unusable
fn build_reporter(config: ReporterConfig) -> Result<Reporter> {
    if config.insecure_skip_verify {
        warn!(
            base_url = %config.base_url,
            "TLS certificate verification is disabled for the telemetry endpoint"
        );
    }

    match Reporter::new(config.clone()) {
        Ok(reporter) => Ok(reporter),
        Err(e) => {
            warn!(error = %e, "Invalid telemetry URL, using the default endpoint");
            let fallback = ReporterConfig {
                base_url: telemetry::report::DEFAULT_BASE_URL.to_string(),
                ..config
            };
            Reporter::new(fallback).context("Failed to create telemetry reporter")
        }
    }
}
