//! Delivery of samples to the collection endpoint
//!
//! This module provides:
//! - the [`Emitter`] seam used by the telemetry loop
//! - an HTTPS [`Reporter`] that posts one JSON record per call

mod client;

pub use client::{Reporter, ReporterConfig, DEFAULT_BASE_URL, LICENSE_HEADER};

use crate::error::EmitError;
use crate::models::Sample;
use async_trait::async_trait;

/// Sends a single sample somewhere
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Deliver `sample` for `destination`, attaching `credential` when it is non-empty.
    /// Exactly one attempt is made.
    async fn emit(&self, sample: &Sample, destination: &str, credential: &str)
        -> Result<(), EmitError>;
}
