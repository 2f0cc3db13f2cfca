//! NVML (NVIDIA Management Library) backend

use crate::provider::{DeviceHandle, ProviderError, TopologyLevel, TopologyProvider, TopologySession};

use nvml_wrapper::enum_wrappers::device::TopologyLevel as NvmlTopologyLevel;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use std::path::PathBuf;
use tracing::{debug, info};

/// NVML capability provider
pub struct NvmlProvider {
    library_path: Option<PathBuf>,
}

impl NvmlProvider {
    /// Create a new NVML provider. The library is loaded on `init`.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        info!("Creating NVML topology provider");
        Self { library_path }
    }
}

impl TopologyProvider for NvmlProvider {
    fn init(&self) -> Result<Box<dyn TopologySession + '_>, ProviderError> {
        let nvml = match &self.library_path {
            Some(path) => {
                debug!("Loading NVML from {}", path.display());
                Nvml::builder().lib_path(path.as_os_str()).init()?
            }
            None => Nvml::init()?,
        };
        Ok(Box::new(NvmlSession { nvml: Some(nvml) }))
    }

    fn name(&self) -> &str {
        "nvml"
    }
}

/// Initialized NVML library; `None` once shut down
struct NvmlSession {
    nvml: Option<Nvml>,
}

impl NvmlSession {
    fn nvml(&self) -> Result<&Nvml, ProviderError> {
        self.nvml.as_ref().ok_or(ProviderError::Uninitialized)
    }

    /// NVML device handles borrow the library, so they are resolved per query
    fn device(&self, device: DeviceHandle) -> Result<Device<'_>, ProviderError> {
        Ok(self.nvml()?.device_by_index(device.index())?)
    }
}

impl TopologySession for NvmlSession {
    fn device_count(&self) -> Result<u32, ProviderError> {
        Ok(self.nvml()?.device_count()?)
    }

    fn device_handle(&self, index: u32) -> Result<DeviceHandle, ProviderError> {
        let handle = DeviceHandle::new(index);
        self.device(handle)?;
        Ok(handle)
    }

    fn device_uuid(&self, device: DeviceHandle) -> Result<String, ProviderError> {
        Ok(self.device(device)?.uuid()?)
    }

    fn device_pci_bus_id(&self, device: DeviceHandle) -> Result<String, ProviderError> {
        Ok(self.device(device)?.pci_info()?.bus_id)
    }

    fn common_ancestor_level(
        &self,
        first: DeviceHandle,
        second: DeviceHandle,
    ) -> Result<TopologyLevel, ProviderError> {
        let level = self
            .device(first)?
            .topology_common_ancestor(self.device(second)?)?;
        Ok(match level {
            NvmlTopologyLevel::Internal => TopologyLevel::Internal,
            NvmlTopologyLevel::Single => TopologyLevel::Single,
            NvmlTopologyLevel::Multiple => TopologyLevel::Multiple,
            NvmlTopologyLevel::HostBridge => TopologyLevel::HostBridge,
            NvmlTopologyLevel::Node => TopologyLevel::Node,
            NvmlTopologyLevel::System => TopologyLevel::System,
        })
    }

    fn link_enabled(&self, device: DeviceHandle, slot: u32) -> Result<bool, ProviderError> {
        Ok(self.device(device)?.link_wrapper_for(slot).is_active()?)
    }

    fn link_remote_pci_bus_id(&self, device: DeviceHandle, slot: u32) -> Result<String, ProviderError> {
        Ok(self.device(device)?.link_wrapper_for(slot).remote_pci_info()?.bus_id)
    }

    fn shutdown(&mut self) -> Result<(), ProviderError> {
        match self.nvml.take() {
            Some(nvml) => {
                info!("Shutting down NVML");
                Ok(nvml.shutdown()?)
            }
            None => Ok(()),
        }
    }
}

impl From<NvmlError> for ProviderError {
    fn from(e: NvmlError) -> Self {
        match e {
            NvmlError::Uninitialized => ProviderError::Uninitialized,
            NvmlError::NotSupported => ProviderError::NotSupported(e.to_string()),
            NvmlError::InvalidArg => ProviderError::InvalidArgument(e.to_string()),
            NvmlError::NotFound => ProviderError::NotFound(e.to_string()),
            NvmlError::UnexpectedVariant(raw) => {
                ProviderError::NotSupported(format!("unexpected value {} from NVML", raw))
            }
            other => ProviderError::Failed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nvml_provider_creation() {
        let provider = NvmlProvider::new(None);
        assert_eq!(provider.name(), "nvml");
    }

    #[test]
    fn test_nvml_error_mapping() {
        assert_eq!(ProviderError::from(NvmlError::Uninitialized), ProviderError::Uninitialized);
        assert!(matches!(
            ProviderError::from(NvmlError::NotSupported),
            ProviderError::NotSupported(_)
        ));
        assert!(matches!(
            ProviderError::from(NvmlError::UnexpectedVariant(60)),
            ProviderError::NotSupported(_)
        ));
        assert!(matches!(
            ProviderError::from(NvmlError::GpuLost),
            ProviderError::Failed(_)
        ));
    }

    #[test]
    fn test_missing_library_fails_init() {
        let provider = NvmlProvider::new(Some(PathBuf::from("/nonexistent/libnvidia-ml.so.1")));
        assert!(provider.init().is_err());
    }
}
