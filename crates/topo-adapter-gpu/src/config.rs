//! Topology collector configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorKind {
    /// PCIe hierarchy and NVLink classification
    Link,
    /// Device-to-device throughput measurement
    Bandwidth,
}

/// Capability provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    /// NVIDIA Management Library
    Nvml,
    /// In-memory sample topology
    Mock,
}

/// Topology collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Collection strategy
    pub kind: CollectorKind,

    /// Provider backend to query
    pub backend: ProviderBackend,

    /// NVML library path (optional)
    pub library_path: Option<PathBuf>,

    /// Log the display-code table after every run
    pub render_table: bool,
}

impl CollectorConfig {
    /// Create a new collector configuration
    pub fn new(kind: CollectorKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: ProviderBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn with_render_table(mut self, enabled: bool) -> Self {
        self.render_table = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.library_path {
            if self.backend != ProviderBackend::Nvml {
                return Err(format!("library_path is only used by the nvml backend, got {}", self.backend));
            }
            if path.as_os_str().is_empty() {
                return Err("library_path must not be empty".to_string());
            }
        }
        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            kind: CollectorKind::Link,
            backend: ProviderBackend::Nvml,
            library_path: None,
            render_table: true,
        }
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorKind::Link => write!(f, "link"),
            CollectorKind::Bandwidth => write!(f, "bandwidth"),
        }
    }
}

impl std::str::FromStr for CollectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "link" => Ok(CollectorKind::Link),
            "bandwidth" => Ok(CollectorKind::Bandwidth),
            _ => Err(format!("Unknown collector kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderBackend::Nvml => write!(f, "nvml"),
            ProviderBackend::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for ProviderBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nvml" => Ok(ProviderBackend::Nvml),
            "mock" => Ok(ProviderBackend::Mock),
            _ => Err(format!("Unknown provider backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_config_creation() {
        let config = CollectorConfig::new(CollectorKind::Link);
        assert_eq!(config.kind, CollectorKind::Link);
        assert_eq!(config.backend, ProviderBackend::Nvml);
        assert!(config.library_path.is_none());
        assert!(config.render_table);
    }

    #[test]
    fn test_collector_config_builder() {
        let config = CollectorConfig::new(CollectorKind::Bandwidth)
            .with_backend(ProviderBackend::Mock)
            .with_render_table(false);

        assert_eq!(config.kind, CollectorKind::Bandwidth);
        assert_eq!(config.backend, ProviderBackend::Mock);
        assert!(!config.render_table);
    }

    #[test]
    fn test_config_validation() {
        let config = CollectorConfig::default().with_library_path("/usr/lib/libnvidia-ml.so.1");
        assert!(config.validate().is_ok());

        let config = config.with_backend(ProviderBackend::Mock);
        assert!(config.validate().is_err());

        let config = CollectorConfig::default().with_library_path("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("link".parse::<CollectorKind>().unwrap(), CollectorKind::Link);
        assert_eq!("Bandwidth".parse::<CollectorKind>().unwrap(), CollectorKind::Bandwidth);
        assert!("latency".parse::<CollectorKind>().is_err());

        assert_eq!("nvml".parse::<ProviderBackend>().unwrap(), ProviderBackend::Nvml);
        assert_eq!("MOCK".parse::<ProviderBackend>().unwrap(), ProviderBackend::Mock);
        assert!("dcgm".parse::<ProviderBackend>().is_err());
    }

    #[test]
    fn test_enum_display() {
        assert_eq!(CollectorKind::Link.to_string(), "link");
        assert_eq!(CollectorKind::Bandwidth.to_string(), "bandwidth");
        assert_eq!(ProviderBackend::Nvml.to_string(), "nvml");
        assert_eq!(ProviderBackend::Mock.to_string(), "mock");
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: CollectorConfig = serde_json::from_str(r#"{"backend":"mock"}"#).unwrap();
        assert_eq!(config.kind, CollectorKind::Link);
        assert_eq!(config.backend, ProviderBackend::Mock);
        assert!(config.render_table);
    }
}
