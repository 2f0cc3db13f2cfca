//! Topology collector contract and the link-based implementation

use crate::bandwidth::BandwidthCollector;
use crate::config::{CollectorConfig, CollectorKind, ProviderBackend};
use crate::matrix::{LinkMatrix, MatrixBuilder, TopologyMatrix};
use crate::provider::{SessionGuard, TopologyProvider};
use crate::{Result, TopologyError};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait defining the interface for topology collectors
#[async_trait]
pub trait TopologyCollector: Send + Sync {
    /// Collect the topology matrix of all GPUs on this host
    async fn collect(&self) -> Result<TopologyMatrix>;

    /// Strategy implemented by this collector
    fn kind(&self) -> CollectorKind;
}

/// Classifies PCIe hierarchy and NVLink connections between GPUs
pub struct LinkCollector {
    provider: Arc<dyn TopologyProvider>,
    render_table: bool,
}

impl LinkCollector {
    pub fn new(provider: Arc<dyn TopologyProvider>) -> Self {
        Self {
            provider,
            render_table: false,
        }
    }

    /// Log the display-code table after each run
    pub fn with_render_table(mut self, enabled: bool) -> Self {
        self.render_table = enabled;
        self
    }
}

/// One provider session: init, enumerate, classify, shutdown
fn collect_links(provider: &dyn TopologyProvider, render_table: bool) -> Result<LinkMatrix> {
    let guard = SessionGuard::open(provider)?;
    let builder = MatrixBuilder::new(guard.session());
    let links = builder.collect()?;

    info!("Collected {}x{} GPU topology matrix via {}", links.size(), links.size(), provider.name());
    if render_table {
        info!("GPU topology link type:\n{}", links.render_table());
    }
    for (i, j) in links.asymmetric_pairs() {
        warn!(
            "Provider reported asymmetric topology: GPU{}->GPU{} is {}, GPU{}->GPU{} is {}",
            i,
            j,
            links.get(i, j).unwrap_or_default(),
            j,
            i,
            links.get(j, i).unwrap_or_default()
        );
    }
    Ok(links)
}

#[async_trait]
impl TopologyCollector for LinkCollector {
    async fn collect(&self) -> Result<TopologyMatrix> {
        let provider = Arc::clone(&self.provider);
        let render_table = self.render_table;

        // Provider calls block; a started run finishes even if this future is dropped.
        let links = tokio::task::spawn_blocking(move || collect_links(provider.as_ref(), render_table))
            .await
            .map_err(|e| TopologyError::Collection(format!("collection worker failed: {}", e)))??;

        Ok(links.to_matrix())
    }

    fn kind(&self) -> CollectorKind {
        CollectorKind::Link
    }
}

/// Create a collector for the configured strategy and backend
pub fn create_collector(config: &CollectorConfig) -> Result<Box<dyn TopologyCollector>> {
    config.validate().map_err(TopologyError::Configuration)?;
    info!("Creating {} topology collector for backend: {}", config.kind, config.backend);

    match config.kind {
        CollectorKind::Link => {
            let provider = create_provider(config)?;
            Ok(Box::new(LinkCollector::new(provider).with_render_table(config.render_table)))
        }
        CollectorKind::Bandwidth => Ok(Box::new(BandwidthCollector::new())),
    }
}

/// Create a backend-specific capability provider
#[allow(unreachable_patterns)]
fn create_provider(config: &CollectorConfig) -> Result<Arc<dyn TopologyProvider>> {
    match config.backend {
        #[cfg(all(feature = "nvml", target_os = "linux"))]
        ProviderBackend::Nvml => Ok(Arc::new(crate::nvml::NvmlProvider::new(config.library_path.clone()))),

        #[cfg(any(feature = "mock", test))]
        ProviderBackend::Mock => Ok(Arc::new(crate::mock::MockProvider::sample_system())),

        _ => {
            warn!("Provider backend {} not supported or feature not enabled", config.backend);
            Err(TopologyError::UnsupportedBackend(config.backend.to_string()))
        }
    }
}
