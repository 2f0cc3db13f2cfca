//! # topo-adapter-gpu
//!
//! GPU interconnect topology discovery for a single host.
//!
//! This crate provides:
//! - A capability provider abstraction over the vendor management library
//! - PCIe hierarchy and NVLink classification for every ordered GPU pair
//! - Construction of the N×N topology matrix consumed by placement layers
//! - Pluggable collection strategies (link-based, bandwidth-based)
//!
//! ## Supported Backends
//!
//! - **NVML**: NVIDIA Management Library via `nvml-wrapper` (Linux only)
//! - **Mock**: in-memory topology for tests and dry runs
//!
//! ## Example
//!
//! ```rust,no_run
//! use topo_adapter_gpu::{create_collector, CollectorConfig, CollectorKind, ProviderBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CollectorConfig::new(CollectorKind::Link)
//!         .with_backend(ProviderBackend::Nvml)
//!         .with_render_table(true);
//!
//!     let collector = create_collector(&config)?;
//!     let matrix = collector.collect().await?;
//!     println!("{}", serde_json::to_string(&matrix)?);
//!
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod bandwidth;
pub mod classify;
pub mod collector;
pub mod config;
pub mod link;
pub mod matrix;
pub mod provider;

// Backend-specific modules
#[cfg(all(feature = "nvml", target_os = "linux"))]
pub mod nvml;

// Mock implementation for testing
#[cfg(any(feature = "mock", test))]
pub mod mock;

// Re-export main types
pub use collector::{create_collector, LinkCollector, TopologyCollector};
pub use config::{CollectorConfig, CollectorKind, ProviderBackend};
pub use link::{LinkType, LINK_LABELS, MAX_NVLINKS};
pub use matrix::{LinkMatrix, MatrixBuilder, TopologyMatrix};
pub use provider::{DeviceHandle, ProviderError, SessionGuard, TopologyLevel, TopologyProvider, TopologySession};

/// Result type for topology operations
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors that abort a topology collection run
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Provider initialization failed: {0}")]
    ProviderInit(#[source] ProviderError),

    #[error("Device enumeration failed: {0}")]
    DeviceEnumeration(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Provider backend not supported: {0}")]
    UnsupportedBackend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Collection failed: {0}")]
    Collection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TopologyError {
    /// Check if a later collection cycle may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TopologyError::ProviderInit(_)
                | TopologyError::DeviceEnumeration(_)
                | TopologyError::Collection(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_error_properties() {
        let init_error = TopologyError::ProviderInit(ProviderError::Uninitialized);
        assert!(init_error.is_retryable());

        let enum_error = TopologyError::DeviceEnumeration("count".to_string());
        assert!(enum_error.is_retryable());

        let stub_error = TopologyError::NotImplemented("bandwidth".to_string());
        assert!(!stub_error.is_retryable());
        assert!(!TopologyError::UnsupportedBackend("nvml".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = TopologyError::UnsupportedBackend("rocm".to_string());
        assert_eq!(error.to_string(), "Provider backend not supported: rocm");

        let error = TopologyError::ProviderInit(ProviderError::Failed("driver not loaded".to_string()));
        assert_eq!(
            error.to_string(),
            "Provider initialization failed: provider call failed: driver not loaded"
        );
    }
}
