//! Bandwidth-based topology collector

use crate::collector::TopologyCollector;
use crate::config::CollectorKind;
use crate::matrix::TopologyMatrix;
use crate::{Result, TopologyError};

use async_trait::async_trait;
use tracing::warn;

/// Device-to-device throughput collector.
///
/// Measurement is not implemented; every run fails with `NotImplemented`
/// instead of publishing an empty matrix.
#[derive(Debug, Default)]
pub struct BandwidthCollector;

impl BandwidthCollector {
    pub fn new() -> Self {
        warn!("Bandwidth topology collector is not implemented - collection runs will fail");
        Self
    }
}

#[async_trait]
impl TopologyCollector for BandwidthCollector {
    async fn collect(&self) -> Result<TopologyMatrix> {
        Err(TopologyError::NotImplemented(
            "bandwidth topology collection".to_string(),
        ))
    }

    fn kind(&self) -> CollectorKind {
        CollectorKind::Bandwidth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bandwidth_not_implemented() {
        let collector = BandwidthCollector::new();
        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, TopologyError::NotImplemented(_)));
        assert!(!err.is_retryable());
        assert_eq!(collector.kind(), CollectorKind::Bandwidth);
    }
}
