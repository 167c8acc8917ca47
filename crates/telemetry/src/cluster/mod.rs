//! Cluster placement lookup
//!
//! Resolves which pod the reporting service runs in and the cluster's
//! internal service address. The production backend talks to the
//! Kubernetes API; the selection rules themselves are plain functions over
//! a pod list.

mod api;

pub use api::{KubeLocator, KubeLocatorConfig};

use crate::error::AcquisitionError;
use crate::models::{ClusterIdentity, PodPlacement};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::fmt;
use tracing::warn;

/// How the reporting workload's pod is identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodSelector {
    /// Scan every pod in the namespace, keep the last name with this prefix
    Prefix(String),
    /// Ask the API for pods matching a label selector, keep the first one
    Label(String),
}

impl fmt::Display for PodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodSelector::Prefix(prefix) => write!(f, "prefix {}", prefix),
            PodSelector::Label(selector) => write!(f, "label {}", selector),
        }
    }
}

/// Lookup capability against the cluster management API
#[async_trait]
pub trait ClusterLocator: Send + Sync {
    /// Find the pod hosting the reporting service
    async fn resolve_pod(&self, selector: &PodSelector) -> Result<PodPlacement, AcquisitionError>;

    /// Internal address of the cluster's API service
    async fn resolve_cluster_address(&self) -> Result<String, AcquisitionError>;
}

/// Resolve the full cluster identity for one tick.
///
/// The cluster address is looked up before the pod; either failure aborts
/// the lookup.
pub async fn locate(
    locator: &dyn ClusterLocator,
    selector: &PodSelector,
) -> Result<ClusterIdentity, AcquisitionError> {
    let cluster_address = locator.resolve_cluster_address().await?;
    let pod = locator.resolve_pod(selector).await?;

    Ok(ClusterIdentity {
        cluster_address,
        pod,
    })
}

/// Pick the pod whose name starts with `prefix`.
///
/// When several pods match, the last one in list order wins. List order
/// comes from the API server and is not guaranteed to be stable, so a
/// warning is logged in that case.
pub fn select_by_prefix<'a>(pods: &'a [Pod], prefix: &str) -> Option<&'a Pod> {
    let mut selected = None;
    let mut matches = 0usize;

    for pod in pods {
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        if !name.is_empty() && name.starts_with(prefix) {
            matches += 1;
            selected = Some(pod);
        }
    }

    if matches > 1 {
        let selected_name = selected.and_then(|pod| pod.metadata.name.as_deref());
        warn!(
            prefix = %prefix,
            matches = matches,
            selected = ?selected_name,
            "Multiple pods match prefix, using the last one listed"
        );
    }

    selected
}

/// Pick the first pod returned by a label query
pub fn select_first(pods: &[Pod]) -> Option<&Pod> {
    pods.first()
}

/// Apply a selector to an already fetched pod list
pub fn select_pod<'a>(pods: &'a [Pod], selector: &PodSelector) -> Option<&'a Pod> {
    match selector {
        PodSelector::Prefix(prefix) => select_by_prefix(pods, prefix),
        PodSelector::Label(_) => select_first(pods),
    }
}

/// Extract placement details from a pod object
pub fn placement_from_pod(pod: &Pod, fallback_namespace: &str) -> PodPlacement {
    PodPlacement {
        name: pod.metadata.name.clone(),
        internal_ip: pod
            .status
            .as_ref()
            .and_then(|status| status.pod_ip.clone())
            .unwrap_or_default(),
        namespace: pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| fallback_namespace.to_string()),
        node: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
    }
}
