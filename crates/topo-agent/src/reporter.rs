//! Publishing the topology matrix to the node object

use crate::config::{NodeConfig, ReporterConfig};
use crate::{AgentError, Result};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use topo_adapter_gpu::TopologyMatrix;
use tracing::{debug, info};

const MERGE_PATCH: &str = "application/merge-patch+json";

/// Sink for collected topology matrices
#[async_trait]
pub trait TopologyReporter: Send + Sync {
    async fn report(&self, matrix: &TopologyMatrix) -> Result<()>;
}

/// Merge patch writing `matrix` as a JSON string under `key`
pub fn annotation_patch(key: &str, matrix: &TopologyMatrix) -> Result<serde_json::Value> {
    let value = matrix.to_json()?;
    Ok(json!({
        "metadata": {
            "annotations": {
                key: value
            }
        }
    }))
}

/// Writes the matrix into a node annotation through the Kubernetes API
pub struct NodeAnnotationReporter {
    client: Client,
    api_server: String,
    token_path: PathBuf,
    node_name: String,
    annotation_key: String,
}

impl NodeAnnotationReporter {
    /// Create a reporter; falls back to the in-cluster API server address
    pub fn new(config: &ReporterConfig, node: &NodeConfig) -> Result<Self> {
        let api_server = config
            .api_server
            .clone()
            .or_else(in_cluster_api_server)
            .ok_or_else(|| {
                AgentError::Config(
                    "No API server configured and KUBERNETES_SERVICE_HOST is not set".to_string(),
                )
            })?;

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_seconds));
        if config.ca_cert_path.exists() {
            let pem = std::fs::read(&config.ca_cert_path)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
            debug!("Trusting cluster CA from {}", config.ca_cert_path.display());
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!("Reporting GPU topology to {} for node {}", api_server, node.name);

        Ok(Self {
            client,
            api_server: api_server.trim_end_matches('/').to_string(),
            token_path: config.token_path.clone(),
            node_name: node.name.clone(),
            annotation_key: node.annotation_key.clone(),
        })
    }

    pub fn node_url(&self) -> String {
        format!("{}/api/v1/nodes/{}", self.api_server, self.node_name)
    }

    /// Service account tokens rotate, so the file is read per request
    async fn bearer_token(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.token_path).await {
            Ok(token) => Ok(Some(token.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TopologyReporter for NodeAnnotationReporter {
    async fn report(&self, matrix: &TopologyMatrix) -> Result<()> {
        let patch = annotation_patch(&self.annotation_key, matrix)?;
        let url = self.node_url();

        debug!("Patching node annotation {} at {}", self.annotation_key, url);

        let mut request = self
            .client
            .patch(&url)
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(serde_json::to_vec(&patch)?);
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Report(format!(
                "Patch node {} failed: {} {}",
                self.node_name, status, error_text
            )));
        }

        info!(
            "Updated {} on node {} ({} GPUs)",
            self.annotation_key,
            self.node_name,
            matrix.size()
        );
        Ok(())
    }
}

/// Logs the matrix instead of publishing it
#[derive(Debug, Default)]
pub struct LogReporter;

#[async_trait]
impl TopologyReporter for LogReporter {
    async fn report(&self, matrix: &TopologyMatrix) -> Result<()> {
        info!("GPU topology matrix: {}", matrix.to_json()?);
        Ok(())
    }
}

fn in_cluster_api_server() -> Option<String> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").ok()?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
    if host.contains(':') {
        Some(format!("https://[{}]:{}", host, port))
    } else {
        Some(format!("https://{}:{}", host, port))
    }
}
