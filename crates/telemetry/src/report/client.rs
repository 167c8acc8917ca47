//! HTTPS client for the telemetry collection API
//!
//! Certificate verification is disabled unless `insecure_skip_verify` is
//! turned off. Collection endpoints are often deployed with self-signed
//! certificates; with verification off the agent cannot tell whether it is
//! talking to the real endpoint, so samples and the license key may be
//! exposed to an interceptor.

use super::Emitter;
use crate::error::EmitError;
use crate::models::Sample;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Public collection endpoint used when no override is configured
pub const DEFAULT_BASE_URL: &str = "https://api.kubeshark.co";

/// Header carrying the license credential
pub const LICENSE_HEADER: &str = "License-Key";

/// Configuration for the reporter
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Base URL; samples go to `{base_url}/telemetry/{destination}`
    pub base_url: String,
    /// Skip server certificate validation
    pub insecure_skip_verify: bool,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            insecure_skip_verify: true,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Posts samples to the collection API
pub struct Reporter {
    client: Client,
    base_url: String,
}

impl Reporter {
    /// Build the reporter and its HTTP client
    pub fn new(config: ReporterConfig) -> Result<Self, EmitError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(EmitError::Client)?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|source| EmitError::InvalidUrl {
            url: base_url.clone(),
            source,
        })?;

        Ok(Self { client, base_url })
    }

    /// Endpoint for a destination tag
    pub fn endpoint(&self, destination: &str) -> Result<Url, EmitError> {
        let raw = format!("{}/telemetry/{}", self.base_url, destination);
        Url::parse(&raw).map_err(|source| EmitError::InvalidUrl { url: raw, source })
    }
}

#[async_trait]
impl Emitter for Reporter {
    async fn emit(
        &self,
        sample: &Sample,
        destination: &str,
        credential: &str,
    ) -> Result<(), EmitError> {
        let url = self.endpoint(destination)?;
        let payload = serde_json::to_vec(sample)?;

        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        if !credential.is_empty() {
            request = request.header(LICENSE_HEADER, credential);
        }

        let response = request.send().await.map_err(EmitError::Transport)?;
        let status = response.status();

        if status != StatusCode::OK {
            let body = response.text().await.ok();
            return Err(EmitError::RemoteRejection {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %url, "Telemetry sample accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemoryStats, ResourceSnapshot};
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;

    fn sample() -> Sample {
        let snapshot = ResourceSnapshot {
            timestamp: Utc::now(),
            cpu: 4.0,
            cpu_num: None,
            memory: MemoryStats {
                allocated: 2048,
                system: 8192,
            },
            hostname: Some("node-a".to_string()),
        };
        Sample::new(snapshot, Duration::from_secs(2), None)
    }

    fn reporter_for(base_url: String) -> Reporter {
        Reporter::new(ReporterConfig {
            base_url,
            insecure_skip_verify: true,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_reporter_config_default() {
        let config = ReporterConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.insecure_skip_verify);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_endpoint_joins_destination() {
        let reporter = reporter_for("https://collector.example.com/".to_string());
        let url = reporter.endpoint("kubeshark-hub").unwrap();
        assert_eq!(
            url.as_str(),
            "https://collector.example.com/telemetry/kubeshark-hub"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = Reporter::new(ReporterConfig {
            base_url: "not a url".to_string(),
            ..ReporterConfig::default()
        });
        assert!(matches!(result, Err(EmitError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_emit_posts_json_with_license() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/telemetry/hub")
            .match_header("content-type", "application/json")
            .match_header("license-key", "secret-key")
            .match_body(Matcher::PartialJson(json!({
                "cpu": 4.0,
                "memory": 2048,
                "memoryUsage": 25.0,
                "timeFromStart": 2.0,
                "hostname": "node-a"
            })))
            .with_status(200)
            .create_async()
            .await;

        let reporter = reporter_for(server.url());
        reporter.emit(&sample(), "hub", "secret-key").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_emit_without_credential_omits_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/telemetry/hub")
            .match_header("license-key", Matcher::Missing)
            .with_status(200)
            .create_async()
            .await;

        let reporter = reporter_for(server.url());
        reporter.emit(&sample(), "hub", "").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_emit_rejection_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/telemetry/hub")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let reporter = reporter_for(server.url());
        let err = reporter.emit(&sample(), "hub", "").await.unwrap_err();

        match &err {
            EmitError::RemoteRejection { status, body } => {
                assert_eq!(*status, 403);
                assert_eq!(body.as_deref(), Some("forbidden"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("403"));
        assert!(message.contains("forbidden"));
    }

    #[tokio::test]
    async fn test_non_200_success_status_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/telemetry/hub")
            .with_status(202)
            .create_async()
            .await;

        let reporter = reporter_for(server.url());
        let err = reporter.emit(&sample(), "hub", "").await.unwrap_err();
        assert!(matches!(err, EmitError::RemoteRejection { status: 202, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Port 1 is reserved and not listening in test environments
        let reporter = reporter_for("http://127.0.0.1:1".to_string());
        let err = reporter.emit(&sample(), "hub", "").await.unwrap_err();
        assert!(matches!(err, EmitError::Transport(_)));
    }
}
