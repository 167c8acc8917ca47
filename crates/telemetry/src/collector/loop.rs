//! Telemetry loop
//!
//! Samples local resources on a fixed interval, optionally enriches the
//! sample with cluster placement, and hands it to an emitter. Credential
//! updates arrive on a side channel and are picked up by the next emission.

use super::ResourceSampler;
use crate::cluster::{self, ClusterLocator, PodSelector};
use crate::error::TickError;
use crate::models::Sample;
use crate::observability::StructuredLogger;
use crate::report::Emitter;
use anyhow::Result;
use std::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Interval used when none is configured or the configured one is invalid
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the telemetry loop
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Time between the end of one tick and the start of the next (default: 60 seconds)
    pub interval: Duration,
    /// Kill switch, read once when the loop starts
    pub enabled: bool,
    /// Path segment identifying the reporting service
    pub destination: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            enabled: true,
            destination: String::new(),
        }
    }
}

impl TelemetryConfig {
    /// Parse an interval given in whole seconds.
    /// Missing, malformed or zero values fall back to [`DEFAULT_INTERVAL`].
    pub fn parse_interval(raw: Option<&str>) -> Duration {
        match raw.map(str::trim).map(str::parse::<u64>) {
            Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
            Some(_) => {
                warn!(value = ?raw, "Invalid telemetry interval, using default");
                DEFAULT_INTERVAL
            }
            None => DEFAULT_INTERVAL,
        }
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The sample was accepted by the endpoint
    Emitted,
    /// Cluster lookup failed, nothing was sent
    AcquisitionFailed,
    /// The sample was built but delivery failed
    EmitFailed,
}

/// Counters kept across ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub emitted: u64,
    pub failed: u64,
}

/// Cluster lookup settings for cluster mode
struct ClusterMode {
    locator: Arc<dyn ClusterLocator>,
    selector: PodSelector,
}

/// Periodic sampler and reporter
pub struct TelemetryLoop {
    /// Local resource sampler
    sampler: Box<dyn ResourceSampler>,
    /// Cluster placement lookup, absent in local mode
    cluster: Option<ClusterMode>,
    /// Where samples go
    emitter: Arc<dyn Emitter>,
    /// Configuration
    config: TelemetryConfig,
    /// Fixed reference point for `timeFromStart`
    started: Instant,
    /// Most recent license key, empty until one is supplied
    credential: String,
    logger: StructuredLogger,
    stats: LoopStats,
}

impl TelemetryLoop {
    /// Run until the process exits.
    ///
    /// Returns immediately if telemetry is disabled. Otherwise waits one
    /// interval, ticks, and re-arms the timer after the tick completes, so a
    /// slow emission pushes the next tick back instead of queueing one.
    /// Credential updates are applied as they arrive and never trigger a tick.
    pub async fn run(mut self, mut credentials: Option<mpsc::Receiver<String>>) {
        if !self.config.enabled {
            info!("Telemetry disabled, not starting loop");
            return;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            destination = %self.config.destination,
            cluster_mode = self.cluster.is_some(),
            "Starting telemetry loop"
        );

        let timer = sleep(self.config.interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = &mut timer => {
                    let outcome = self.tick().await;
                    debug!(
                        outcome = ?outcome,
                        ticks = self.stats.ticks,
                        emitted = self.stats.emitted,
                        failed = self.stats.failed,
                        "Telemetry tick complete"
                    );
                    timer.as_mut().reset(Instant::now() + self.config.interval);
                }
                credential = next_credential(&mut credentials) => {
                    debug!(empty = credential.is_empty(), "License key updated");
                    self.credential = credential;
                }
            }
        }
    }

    /// Tick once unless telemetry is disabled
    pub async fn run_once(mut self) -> Option<TickOutcome> {
        if !self.config.enabled {
            info!("Telemetry disabled, skipping single tick");
            return None;
        }
        Some(self.tick().await)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Sample, resolve, and emit once. Errors are logged and counted.
    pub async fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;

        match self.collect_and_emit().await {
            Ok(()) => {
                self.stats.emitted += 1;
                TickOutcome::Emitted
            }
            Err(TickError::Acquisition(e)) => {
                self.stats.failed += 1;
                error!(error = %e, "Error getting cluster placement, skipping sample");
                TickOutcome::AcquisitionFailed
            }
            Err(TickError::Emit(e)) => {
                self.stats.failed += 1;
                error!(
                    error = %e,
                    destination = %self.config.destination,
                    "Emit telemetry failed"
                );
                TickOutcome::EmitFailed
            }
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    async fn collect_and_emit(&mut self) -> Result<(), TickError> {
        let snapshot = self.sampler.sample();
        let elapsed = self.started.elapsed();

        let identity = match &self.cluster {
            Some(mode) => Some(cluster::locate(mode.locator.as_ref(), &mode.selector).await?),
            None => None,
        };

        let sample = Sample::new(snapshot, elapsed, identity);
        self.logger.log_sample(&sample);

        self.emitter
            .emit(&sample, &self.config.destination, &self.credential)
            .await?;
        Ok(())
    }
}

/// Next value from the credential channel.
///
/// Pending forever when there is no channel; a closed channel is dropped so
/// the loop keeps running on the timer alone.
async fn next_credential(source: &mut Option<mpsc::Receiver<String>>) -> String {
    let Some(rx) = source.as_mut() else {
        return future::pending().await;
    };

    if let Some(credential) = rx.recv().await {
        return credential;
    }

    debug!("License key channel closed");
    *source = None;
    future::pending().await
}

/// Builder for creating the telemetry loop
pub struct TelemetryLoopBuilder {
    sampler: Option<Box<dyn ResourceSampler>>,
    cluster: Option<ClusterMode>,
    emitter: Option<Arc<dyn Emitter>>,
    config: TelemetryConfig,
    started: Option<Instant>,
    credential: String,
}

impl TelemetryLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            sampler: None,
            cluster: None,
            emitter: None,
            config: TelemetryConfig::default(),
            started: None,
            credential: String::new(),
        }
    }

    /// Set the resource sampler
    pub fn sampler(mut self, sampler: Box<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Enable cluster mode
    pub fn cluster(mut self, locator: Arc<dyn ClusterLocator>, selector: PodSelector) -> Self {
        self.cluster = Some(ClusterMode { locator, selector });
        self
    }

    /// Set the emitter
    pub fn emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Set the destination tag
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.config.destination = destination.into();
        self
    }

    /// Set the tick interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the kill switch
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the process start time (default: when `build` is called)
    pub fn started(mut self, started: Instant) -> Self {
        self.started = Some(started);
        self
    }

    /// Set the initial license key
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    /// Build the telemetry loop
    pub fn build(self) -> Result<TelemetryLoop> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let emitter = self
            .emitter
            .ok_or_else(|| anyhow::anyhow!("Emitter is required"))?;
        if self.config.destination.is_empty() {
            anyhow::bail!("Destination tag is required");
        }

        let mut config = self.config;
        if config.interval.is_zero() {
            warn!("Zero telemetry interval, using default");
            config.interval = DEFAULT_INTERVAL;
        }

        let logger = StructuredLogger::new(config.destination.clone());

        Ok(TelemetryLoop {
            sampler,
            cluster: self.cluster,
            emitter,
            config,
            started: self.started.unwrap_or_else(Instant::now),
            credential: self.credential,
            logger,
            stats: LoopStats::default(),
        })
    }
}

impl Default for TelemetryLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
