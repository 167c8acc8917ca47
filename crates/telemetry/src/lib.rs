//! Telemetry library for periodic resource and placement reporting
//!
//! This crate provides the core functionality for:
//! - Sampling local process and host counters
//! - Resolving pod and cluster identity through the Kubernetes API
//! - Posting samples to the collection endpoint
//! - Driving both on a fixed interval with runtime license key updates

pub mod cluster;
pub mod collector;
pub mod credential;
pub mod error;
pub mod models;
pub mod observability;
pub mod report;

pub use cluster::{ClusterLocator, KubeLocator, KubeLocatorConfig, PodSelector};
pub use collector::{
    create_sampler, CpuMode, ResourceSampler, TelemetryLoop, TelemetryLoopBuilder, TickOutcome,
};
pub use credential::CredentialWatcher;
pub use error::{AcquisitionError, EmitError, TickError};
pub use models::*;
pub use observability::StructuredLogger;
pub use report::{Emitter, Reporter, ReporterConfig};
