//! Core data models for the telemetry agent

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Memory counters read at sample time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    /// Bytes currently held by this process
    pub allocated: u64,
    /// Bytes of memory available on the host
    pub system: u64,
}

impl MemoryStats {
    /// Allocated memory as a percentage of system memory.
    /// Reports 0.0 when the system total is unknown.
    pub fn usage_percent(&self) -> f64 {
        if self.system == 0 {
            return 0.0;
        }
        self.allocated as f64 / self.system as f64 * 100.0
    }
}

/// Local resource readings produced by a sampler
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub cpu_num: Option<f64>,
    pub memory: MemoryStats,
    pub hostname: Option<String>,
}

/// Where the reporting workload runs inside the cluster
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PodPlacement {
    pub name: Option<String>,
    pub internal_ip: String,
    pub namespace: String,
    pub node: Option<String>,
}

/// Cluster-level identity resolved for one tick
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterIdentity {
    pub cluster_address: String,
    pub pod: PodPlacement,
}

/// One telemetry record as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "timeFromStart", serialize_with = "fractional_secs")]
    pub time_from_start: Duration,
    pub cpu: f64,
    #[serde(rename = "cpuNum", skip_serializing_if = "Option::is_none")]
    pub cpu_num: Option<f64>,
    pub memory: u64,
    #[serde(rename = "memoryUsage")]
    pub memory_usage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "clusterIP", skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    #[serde(rename = "podIP", skip_serializing_if = "Option::is_none")]
    pub pod_ip: Option<String>,
    #[serde(rename = "podNamespace", skip_serializing_if = "Option::is_none")]
    pub pod_namespace: Option<String>,
    #[serde(rename = "podName", skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    #[serde(rename = "nodeId", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl Sample {
    /// Assemble a sample from local readings and, in cluster mode, placement data.
    ///
    /// The memory usage ratio is fixed here from the snapshot's exact counters.
    pub fn new(
        snapshot: ResourceSnapshot,
        time_from_start: Duration,
        cluster: Option<ClusterIdentity>,
    ) -> Self {
        let memory_usage = snapshot.memory.usage_percent();
        let mut sample = Self {
            timestamp: snapshot.timestamp,
            time_from_start,
            cpu: snapshot.cpu,
            cpu_num: snapshot.cpu_num,
            memory: snapshot.memory.allocated,
            memory_usage,
            hostname: snapshot.hostname,
            cluster_ip: None,
            pod_ip: None,
            pod_namespace: None,
            pod_name: None,
            node_id: None,
        };

        if let Some(identity) = cluster {
            sample.cluster_ip = Some(identity.cluster_address);
            sample.pod_ip = Some(identity.pod.internal_ip);
            sample.pod_namespace = Some(identity.pod.namespace);
            sample.pod_name = identity.pod.name;
            sample.node_id = identity.pod.node;
        }

        sample
    }
}

fn fractional_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}
