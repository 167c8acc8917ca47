//! Local resource sampling and the telemetry loop
//!
//! A sampler reads host and process counters on every tick. The loop in
//! [`TelemetryLoop`] combines those readings with optional cluster placement
//! and hands the result to an emitter.

mod r#loop;
mod system;

pub use r#loop::{
    LoopStats, TelemetryConfig, TelemetryLoop, TelemetryLoopBuilder, TickOutcome, DEFAULT_INTERVAL,
};
pub use system::SystemSampler;

use crate::models::ResourceSnapshot;
use std::str::FromStr;

/// Value reported when the process CPU usage cannot be read
pub const CPU_UNAVAILABLE: f64 = -1.0;

/// Which CPU signal a deployment reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuMode {
    /// Logical core count in `cpu`, no `cpuNum`
    #[default]
    Cores,
    /// Process CPU usage percentage in `cpu`, core count in `cpuNum`
    Usage,
}

impl FromStr for CpuMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cores" => Ok(CpuMode::Cores),
            "usage" => Ok(CpuMode::Usage),
            other => Err(format!("unknown cpu mode: {}", other)),
        }
    }
}

/// Source of local resource readings
///
/// Implementations never fail: unreadable counters are replaced with
/// degraded values so a tick always has something to report.
pub trait ResourceSampler: Send {
    fn sample(&mut self) -> ResourceSnapshot;
}

/// Create the host sampler for the given CPU mode
pub fn create_sampler(mode: CpuMode) -> Box<dyn ResourceSampler> {
    tracing::info!(cpu_mode = ?mode, "Using host resource sampler");
    Box::new(SystemSampler::new(mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_mode_parse() {
        assert_eq!("cores".parse::<CpuMode>().unwrap(), CpuMode::Cores);
        assert_eq!(" Usage ".parse::<CpuMode>().unwrap(), CpuMode::Usage);
        assert!("percent".parse::<CpuMode>().is_err());
    }

    #[test]
    fn test_cpu_mode_default() {
        assert_eq!(CpuMode::default(), CpuMode::Cores);
    }
}
