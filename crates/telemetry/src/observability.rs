//! Structured logging for agent events
//!
//! Every sample is logged as a `TELEMETRY` event before it is sent, so the
//! reported values stay visible in the logs even when emission fails.

use crate::models::Sample;
use tracing::info;

/// Structured logger for telemetry events
///
/// Provides consistent JSON-formatted logging for samples and the agent
/// lifecycle.
#[derive(Clone)]
pub struct StructuredLogger {
    destination: String,
}

impl StructuredLogger {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// Log a sample about to be emitted
    pub fn log_sample(&self, sample: &Sample) {
        info!(
            event = "telemetry_sample",
            destination = %self.destination,
            timestamp = %sample.timestamp,
            time_from_start_secs = sample.time_from_start.as_secs_f64(),
            cpu = sample.cpu,
            cpu_num = ?sample.cpu_num,
            memory = sample.memory,
            mem_usage = sample.memory_usage,
            hostname = ?sample.hostname,
            cluster_ip = ?sample.cluster_ip,
            pod_ip = ?sample.pod_ip,
            pod_namespace = ?sample.pod_namespace,
            pod_name = ?sample.pod_name,
            node_id = ?sample.node_id,
            "TELEMETRY"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, cluster_mode: bool) {
        info!(
            event = "agent_started",
            destination = %self.destination,
            agent_version = %version,
            cluster_mode = cluster_mode,
            "Telemetry agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            destination = %self.destination,
            reason = %reason,
            "Telemetry agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemoryStats, ResourceSnapshot};
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("kubeshark-hub");
        assert_eq!(logger.destination, "kubeshark-hub");
    }

    #[test]
    fn test_log_sample_without_subscriber() {
        let logger = StructuredLogger::new("kubeshark-hub");
        let sample = Sample::new(
            ResourceSnapshot {
                timestamp: Utc::now(),
                cpu: 1.0,
                cpu_num: Some(4.0),
                memory: MemoryStats {
                    allocated: 1,
                    system: 2,
                },
                hostname: None,
            },
            Duration::from_secs(1),
            None,
        );
        logger.log_sample(&sample);
        logger.log_startup("0.1.0", false);
        logger.log_shutdown("test");
    }
}
