//! Capability provider interface
//!
//! The provider is the native device query surface (NVML in production). A
//! collection run opens exactly one [`TopologySession`], issues all of its
//! queries through it and shuts it down on the way out. [`SessionGuard`] owns
//! that bracketing.

use crate::{Result, TopologyError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Non-success status returned by a provider query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider not initialized")]
    Uninitialized,

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("provider call failed: {0}")]
    Failed(String),
}

/// Opaque handle to a device, valid for one provider session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceHandle {
    index: u32,
}

impl DeviceHandle {
    pub fn new(index: u32) -> Self {
        Self { index }
    }

    /// Zero-based enumeration index within the current session
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// PCIe depth at which two devices share a topological ancestor,
/// nearest to farthest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyLevel {
    /// Same board (multi-GPU card)
    Internal,
    /// Behind a single PCIe switch
    Single,
    /// Behind multiple PCIe switches without crossing the host bridge
    Multiple,
    /// Same PCIe host bridge
    HostBridge,
    /// Same NUMA node, different host bridges
    Node,
    /// Across the SMP interconnect between sockets
    System,
}

/// Entry point of a capability provider
pub trait TopologyProvider: Send + Sync {
    /// Initialize the provider and open a query session
    fn init(&self) -> std::result::Result<Box<dyn TopologySession + '_>, ProviderError>;

    /// Short backend name for logging
    fn name(&self) -> &str;
}

/// Device queries available while the provider is initialized
pub trait TopologySession {
    fn device_count(&self) -> std::result::Result<u32, ProviderError>;

    fn device_handle(&self, index: u32) -> std::result::Result<DeviceHandle, ProviderError>;

    fn device_uuid(&self, device: DeviceHandle) -> std::result::Result<String, ProviderError>;

    fn device_pci_bus_id(&self, device: DeviceHandle) -> std::result::Result<String, ProviderError>;

    fn common_ancestor_level(
        &self,
        first: DeviceHandle,
        second: DeviceHandle,
    ) -> std::result::Result<TopologyLevel, ProviderError>;

    fn link_enabled(&self, device: DeviceHandle, slot: u32) -> std::result::Result<bool, ProviderError>;

    fn link_remote_pci_bus_id(
        &self,
        device: DeviceHandle,
        slot: u32,
    ) -> std::result::Result<String, ProviderError>;

    /// Release the provider. Further queries return `Uninitialized`.
    fn shutdown(&mut self) -> std::result::Result<(), ProviderError>;
}

/// Scoped provider session, shut down when dropped
pub struct SessionGuard<'p> {
    session: Box<dyn TopologySession + 'p>,
    provider: String,
}

impl<'p> SessionGuard<'p> {
    /// Initialize `provider` and take ownership of its session
    pub fn open(provider: &'p dyn TopologyProvider) -> Result<Self> {
        let session = provider.init().map_err(TopologyError::ProviderInit)?;
        debug!("Opened {} provider session", provider.name());
        Ok(Self {
            session,
            provider: provider.name().to_string(),
        })
    }

    pub fn session(&self) -> &dyn TopologySession {
        self.session.as_ref()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        match self.session.shutdown() {
            Ok(()) => debug!("Closed {} provider session", self.provider),
            Err(e) => warn!("Unable to shut down {} provider: {}", self.provider, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn test_session_guard_shuts_down_on_drop() {
        let provider = MockProvider::with_gpus(2);
        {
            let guard = SessionGuard::open(&provider).unwrap();
            assert_eq!(guard.session().device_count().unwrap(), 2);
            assert_eq!(provider.shutdown_count(), 0);
        }
        assert_eq!(provider.init_count(), 1);
        assert_eq!(provider.shutdown_count(), 1);
    }

    #[test]
    fn test_session_guard_init_failure() {
        let provider = MockProvider::with_gpus(2).fail_init();
        let result = SessionGuard::open(&provider);
        assert!(matches!(result, Err(TopologyError::ProviderInit(_))));
        assert_eq!(provider.shutdown_count(), 0);
    }

    #[test]
    fn test_shutdown_failure_is_swallowed() {
        let provider = MockProvider::with_gpus(1).fail_shutdown();
        {
            let _guard = SessionGuard::open(&provider).unwrap();
        }
        assert_eq!(provider.shutdown_count(), 1);
    }

    #[test]
    fn test_device_handle_index() {
        let handle = DeviceHandle::new(3);
        assert_eq!(handle.index(), 3);
        assert!(DeviceHandle::new(1) < handle);
    }
}
