//! Kubernetes API backed locator

use super::{placement_from_pod, select_pod, ClusterLocator, PodSelector};
use crate::error::AcquisitionError;
use crate::models::PodPlacement;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, info};

/// Where to look for pods and the cluster service
#[derive(Debug, Clone)]
pub struct KubeLocatorConfig {
    /// Namespace scanned for the reporting pod
    pub pod_namespace: String,
    /// Name of the service whose cluster IP identifies the cluster
    pub cluster_service: String,
    /// Namespace of that service
    pub cluster_service_namespace: String,
}

impl Default for KubeLocatorConfig {
    fn default() -> Self {
        Self {
            pod_namespace: "default".to_string(),
            cluster_service: "kubernetes".to_string(),
            cluster_service_namespace: "default".to_string(),
        }
    }
}

/// Cluster locator using the Kubernetes API
pub struct KubeLocator {
    client: Client,
    config: KubeLocatorConfig,
}

impl KubeLocator {
    pub fn new(client: Client, config: KubeLocatorConfig) -> Self {
        Self { client, config }
    }

    /// Connect with in-cluster configuration, falling back to the local kubeconfig
    pub async fn connect(config: KubeLocatorConfig) -> Result<Self, AcquisitionError> {
        let client = Client::try_default()
            .await
            .map_err(|e| AcquisitionError::lookup("Kubernetes client configuration", e))?;

        info!(
            namespace = %config.pod_namespace,
            cluster_service = %config.cluster_service,
            "Connected to Kubernetes API"
        );
        Ok(Self::new(client, config))
    }

    async fn list_pods(&self, selector: &PodSelector) -> Result<Vec<Pod>, AcquisitionError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.config.pod_namespace);
        let params = match selector {
            PodSelector::Prefix(_) => ListParams::default(),
            PodSelector::Label(labels) => ListParams::default().labels(labels),
        };

        let list = pods.list(&params).await.map_err(|e| {
            AcquisitionError::lookup(format!("pods in {}", self.config.pod_namespace), e)
        })?;

        debug!(
            namespace = %self.config.pod_namespace,
            count = list.items.len(),
            "Listed pods"
        );
        Ok(list.items)
    }
}

#[async_trait]
impl ClusterLocator for KubeLocator {
    async fn resolve_pod(&self, selector: &PodSelector) -> Result<PodPlacement, AcquisitionError> {
        let pods = self.list_pods(selector).await?;

        let pod = select_pod(&pods, selector).ok_or_else(|| AcquisitionError::NotFound {
            selector: selector.to_string(),
        })?;

        let placement = placement_from_pod(pod, &self.config.pod_namespace);
        debug!(
            pod = ?placement.name,
            pod_ip = %placement.internal_ip,
            namespace = %placement.namespace,
            "Resolved reporting pod"
        );
        Ok(placement)
    }

    async fn resolve_cluster_address(&self) -> Result<String, AcquisitionError> {
        let services: Api<Service> =
            Api::namespaced(self.client.clone(), &self.config.cluster_service_namespace);
        let resource = format!(
            "service {}/{}",
            self.config.cluster_service_namespace, self.config.cluster_service
        );

        let service = services
            .get(&self.config.cluster_service)
            .await
            .map_err(|e| AcquisitionError::lookup(resource, e))?;

        service
            .spec
            .and_then(|spec| spec.cluster_ip)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| AcquisitionError::NoAddress {
                service: self.config.cluster_service.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn locator_for(server: &ServerGuard) -> KubeLocator {
        let config = kube::Config::new(server.url().parse().unwrap());
        let client = Client::try_from(config).unwrap();
        KubeLocator::new(client, KubeLocatorConfig::default())
    }

    fn pod_json(name: &str, ip: &str) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": name, "namespace": "default" },
            "spec": { "containers": [], "nodeName": "node-1" },
            "status": { "podIP": ip }
        })
    }

    fn pod_list(items: Vec<serde_json::Value>) -> String {
        json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": { "resourceVersion": "1" },
            "items": items
        })
        .to_string()
    }

    fn service_json(cluster_ip: &str) -> String {
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "kubernetes", "namespace": "default" },
            "spec": { "clusterIP": cluster_ip }
        })
        .to_string()
    }

    #[test]
    fn test_locator_config_default() {
        let config = KubeLocatorConfig::default();
        assert_eq!(config.pod_namespace, "default");
        assert_eq!(config.cluster_service, "kubernetes");
        assert_eq!(config.cluster_service_namespace, "default");
    }

    #[tokio::test]
    async fn test_resolve_pod_empty_list_is_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/namespaces/default/pods")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(pod_list(vec![]))
            .create_async()
            .await;

        let locator = locator_for(&server);
        let err = locator
            .resolve_pod(&PodSelector::Prefix("hub".to_string()))
            .await
            .unwrap_err();

        match err {
            AcquisitionError::NotFound { selector } => assert_eq!(selector, "prefix hub"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_pod_prefix_keeps_last_match() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/namespaces/default/pods")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(pod_list(vec![
                pod_json("hub-a", "10.244.0.1"),
                pod_json("worker-0", "10.244.0.2"),
                pod_json("hub-b", "10.244.0.3"),
            ]))
            .create_async()
            .await;

        let locator = locator_for(&server);
        let placement = locator
            .resolve_pod(&PodSelector::Prefix("hub".to_string()))
            .await
            .unwrap();

        assert_eq!(placement.name.as_deref(), Some("hub-b"));
        assert_eq!(placement.internal_ip, "10.244.0.3");
        assert_eq!(placement.namespace, "default");
        assert_eq!(placement.node.as_deref(), Some("node-1"));
    }

    #[tokio::test]
    async fn test_resolve_pod_label_sends_selector() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/namespaces/default/pods")
            .match_query(Matcher::UrlEncoded(
                "labelSelector".to_string(),
                "app=hub".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(pod_list(vec![
                pod_json("hub-first", "10.244.1.1"),
                pod_json("hub-second", "10.244.1.2"),
            ]))
            .create_async()
            .await;

        let locator = locator_for(&server);
        let placement = locator
            .resolve_pod(&PodSelector::Label("app=hub".to_string()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(placement.name.as_deref(), Some("hub-first"));
    }

    #[tokio::test]
    async fn test_resolve_cluster_address() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/namespaces/default/services/kubernetes")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(service_json("10.96.0.1"))
            .create_async()
            .await;

        let locator = locator_for(&server);
        assert_eq!(locator.resolve_cluster_address().await.unwrap(), "10.96.0.1");
    }

    #[tokio::test]
    async fn test_missing_service_is_lookup_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/namespaces/default/services/kubernetes")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "apiVersion": "v1",
                    "kind": "Status",
                    "status": "Failure",
                    "message": "services \"kubernetes\" not found",
                    "reason": "NotFound",
                    "code": 404
                })
                .to_string(),
            )
            .create_async()
            .await;

        let locator = locator_for(&server);
        let err = locator.resolve_cluster_address().await.unwrap_err();

        match err {
            AcquisitionError::Lookup { resource, .. } => {
                assert_eq!(resource, "service default/kubernetes")
            }
            other => panic!("expected Lookup, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_service_without_cluster_ip_is_no_address() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/namespaces/default/services/kubernetes")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(service_json(""))
            .create_async()
            .await;

        let locator = locator_for(&server);
        let err = locator.resolve_cluster_address().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::NoAddress { ref service } if service == "kubernetes"));
    }
}
