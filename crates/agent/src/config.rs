//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use telemetry::collector::TelemetryConfig;
use telemetry::credential::read_credential;
use telemetry::report::DEFAULT_BASE_URL;
use telemetry::{CpuMode, ReporterConfig};
use tracing::warn;

/// Agent configuration, read from `TELEMETRY_*` environment variables
///
/// Every field is kept as the raw string and parsed on access, so a malformed
/// value only falls back for its own setting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    /// Kill switch; the literal string "true" disables telemetry
    #[serde(default)]
    pub disabled: Option<String>,

    /// Seconds between ticks
    #[serde(default)]
    pub interval: Option<String>,

    /// Collection endpoint base URL
    #[serde(default)]
    pub url: Option<String>,

    /// Initial license key
    #[serde(default)]
    pub license_key: Option<String>,

    /// File watched for license key updates
    #[serde(default)]
    pub license_file: Option<String>,

    /// Skip TLS certificate validation for the collection endpoint
    #[serde(default)]
    pub insecure_skip_verify: Option<String>,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout: Option<String>,

    /// "cores" or "usage"
    #[serde(default)]
    pub cpu_mode: Option<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl AgentConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("TELEMETRY"))
    }

    pub fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder().add_source(environment).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Whether the telemetry loop should run
    pub fn enabled(&self) -> bool {
        self.disabled.as_deref().map(str::trim) != Some("true")
    }

    pub fn interval(&self) -> Duration {
        TelemetryConfig::parse_interval(self.interval.as_deref())
    }

    pub fn url(&self) -> String {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn license_key(&self) -> String {
        self.license_key
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }

    pub fn license_file(&self) -> Option<PathBuf> {
        self.license_file
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    /// Credential for the first emission: the license file if readable, else the key
    pub fn initial_credential(&self) -> String {
        match self.license_file() {
            Some(path) => read_credential(&path).unwrap_or_else(|e| {
                warn!(error = %e, "Could not read license file, using TELEMETRY_LICENSE_KEY");
                self.license_key()
            }),
            None => self.license_key(),
        }
    }

    pub fn insecure_skip_verify(&self) -> bool {
        match self.insecure_skip_verify.as_deref().map(str::trim) {
            None => true,
            Some(raw) => raw.parse::<bool>().unwrap_or_else(|_| {
                warn!(value = raw, "Invalid TELEMETRY_INSECURE_SKIP_VERIFY, keeping it enabled");
                true
            }),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        match self.timeout.as_deref().map(str::trim).map(str::parse::<u64>) {
            Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
            _ => default_timeout(),
        }
    }

    pub fn cpu_mode(&self) -> CpuMode {
        match self.cpu_mode.as_deref() {
            Some(raw) => raw.parse::<CpuMode>().unwrap_or_else(|e: String| {
                warn!(error = %e, "Unknown CPU mode, reporting core count");
                CpuMode::Cores
            }),
            None => CpuMode::default(),
        }
    }

    pub fn reporter_config(&self) -> ReporterConfig {
        ReporterConfig {
            base_url: self.url(),
            insecure_skip_verify: self.insecure_skip_verify(),
            request_timeout: self.request_timeout(),
        }
    }
}
