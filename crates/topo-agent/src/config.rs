//! Configuration management for the topology agent

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use topo_adapter_gpu::CollectorConfig;
use tracing::warn;

/// Annotation carrying the serialized topology matrix
pub const DEFAULT_ANNOTATION_KEY: &str = "gpu.topology/value";

/// Collection period used when none (or zero) is configured
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Complete configuration for the topology agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Node the matrix is published to
    pub node: NodeConfig,

    /// Collection scheduling
    pub collection: CollectionConfig,

    /// Collector strategy and provider backend
    pub collector: CollectorConfig,

    /// Node annotation reporter
    pub reporter: ReporterConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Node identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Kubernetes node name, defaults to `$NODE_NAME`
    pub name: String,

    /// Annotation key the matrix is written under
    pub annotation_key: String,
}

/// Collection scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Seconds between collection runs
    pub interval_seconds: u64,

    /// Trigger collection on node resource changes instead of a timer.
    /// Not supported yet; validation rejects it.
    pub watch: bool,
}

/// Reporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Patch the node annotation; when disabled the matrix is only logged
    pub enabled: bool,

    /// API server URL, defaults to the in-cluster service address
    pub api_server: Option<String>,

    /// Bearer token file
    pub token_path: PathBuf,

    /// Cluster CA bundle
    pub ca_cert_path: PathBuf,

    /// Request timeout (seconds)
    pub timeout_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Show target in logs
    pub show_target: bool,

    /// Show thread IDs in logs
    pub show_thread_ids: bool,

    /// Show line numbers in logs
    pub show_line_numbers: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: std::env::var("NODE_NAME").unwrap_or_default(),
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            watch: false,
        }
    }
}

impl CollectionConfig {
    /// Collection period; a zero interval falls back to the default
    pub fn effective_interval(&self) -> Duration {
        if self.interval_seconds == 0 {
            warn!(
                "Invalid collection interval 0s, using default {}s",
                DEFAULT_INTERVAL_SECONDS
            );
            Duration::from_secs(DEFAULT_INTERVAL_SECONDS)
        } else {
            Duration::from_secs(self.interval_seconds)
        }
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_server: None,
            token_path: PathBuf::from(SERVICE_ACCOUNT_DIR).join("token"),
            ca_cert_path: PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt"),
            timeout_seconds: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::AgentError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AgentConfig = serde_yaml::from_str(&content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> crate::Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| crate::AgentError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.collector
            .validate()
            .map_err(|e| crate::AgentError::Config(format!("Collector config validation failed: {}", e)))?;

        if self.node.annotation_key.is_empty() {
            return Err(crate::AgentError::Config("Annotation key cannot be empty".to_string()));
        }

        if self.collection.watch {
            return Err(crate::AgentError::Config(
                "Watch-triggered collection is not implemented, use interval_seconds".to_string(),
            ));
        }

        if self.reporter.enabled {
            if self.node.name.is_empty() {
                return Err(crate::AgentError::Config(
                    "Node name is required when the reporter is enabled (set node.name or NODE_NAME)".to_string(),
                ));
            }
            if self.reporter.timeout_seconds == 0 {
                return Err(crate::AgentError::Config("Reporter timeout must be greater than 0".to_string()));
            }
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(crate::AgentError::Config(format!("Invalid log level: {}", self.logging.level))),
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            _ => return Err(crate::AgentError::Config(format!("Invalid log format: {}", self.logging.format))),
        }

        Ok(())
    }
}
