//! Mock capability provider for testing

use crate::provider::{DeviceHandle, ProviderError, TopologyLevel, TopologyProvider, TopologySession};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// A device in the mock topology
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub uuid: String,
    pub pci_bus_id: String,
    /// NVLink slots; `Some(remote bus id)` when the link is enabled
    pub slots: Vec<Option<String>>,
}

impl MockDevice {
    pub fn new(uuid: impl Into<String>, pci_bus_id: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            pci_bus_id: pci_bus_id.into(),
            slots: Vec::new(),
        }
    }

    /// Append an NVLink slot, enabled when `remote` is set
    pub fn with_slot(mut self, remote: Option<&str>) -> Self {
        self.slots.push(remote.map(str::to_string));
        self
    }
}

/// In-memory provider with failure injection
#[derive(Debug)]
pub struct MockProvider {
    devices: Vec<MockDevice>,
    levels: HashMap<(u32, u32), TopologyLevel>,
    default_level: TopologyLevel,
    fail_init: bool,
    fail_shutdown: bool,
    fail_device_count: bool,
    fail_handles: HashSet<u32>,
    fail_uuids: HashSet<u32>,
    fail_levels: HashSet<(u32, u32)>,
    fail_link_states: HashSet<(u32, u32)>,
    inits: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl MockProvider {
    /// Create a provider over `devices`; unlisted pairs meet at `System`
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            levels: HashMap::new(),
            default_level: TopologyLevel::System,
            fail_init: false,
            fail_shutdown: false,
            fail_device_count: false,
            fail_handles: HashSet::new(),
            fail_uuids: HashSet::new(),
            fail_levels: HashSet::new(),
            fail_link_states: HashSet::new(),
            inits: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// `count` GPUs without NVLink
    pub fn with_gpus(count: u32) -> Self {
        Self::new((0..count).map(create_mock_device).collect())
    }

    /// Two NVLink-bridged pairs on different sockets:
    ///
    /// ```text
    ///         GPU0  GPU1  GPU2  GPU3
    /// GPU0    N/A   NV2   SYS   SYS
    /// GPU1    NV2   N/A   SYS   SYS
    /// GPU2    SYS   SYS   N/A   NV2
    /// GPU3    SYS   SYS   NV2   N/A
    /// ```
    pub fn sample_system() -> Self {
        Self::with_gpus(4)
            .with_level(0, 1, TopologyLevel::Single)
            .with_level(2, 3, TopologyLevel::Single)
            .with_nvlinks(0, 1, 2)
            .with_nvlinks(2, 3, 2)
    }

    /// Set the common ancestor of `a` and `b`, in both directions
    pub fn with_level(mut self, a: u32, b: u32, level: TopologyLevel) -> Self {
        self.levels.insert((a, b), level);
        self.levels.insert((b, a), level);
        self
    }

    pub fn with_default_level(mut self, level: TopologyLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Bridge `a` and `b` with `count` NVLinks, visible from both ends
    pub fn with_nvlinks(mut self, a: u32, b: u32, count: usize) -> Self {
        let bus_a = self.devices[a as usize].pci_bus_id.clone();
        let bus_b = self.devices[b as usize].pci_bus_id.clone();
        for _ in 0..count {
            self.devices[a as usize].slots.push(Some(bus_b.clone()));
            self.devices[b as usize].slots.push(Some(bus_a.clone()));
        }
        self
    }

    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn fail_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub fn fail_device_count(mut self) -> Self {
        self.fail_device_count = true;
        self
    }

    pub fn fail_handle(mut self, index: u32) -> Self {
        self.fail_handles.insert(index);
        self
    }

    pub fn fail_uuid(mut self, index: u32) -> Self {
        self.fail_uuids.insert(index);
        self
    }

    /// Fail the ancestor query for the ordered pair `(a, b)` only
    pub fn fail_level(mut self, a: u32, b: u32) -> Self {
        self.fail_levels.insert((a, b));
        self
    }

    /// Fail the link state query for `slot` on `index`
    pub fn fail_link_state(mut self, index: u32, slot: u32) -> Self {
        self.fail_link_states.insert((index, slot));
        self
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl TopologyProvider for MockProvider {
    fn init(&self) -> Result<Box<dyn TopologySession + '_>, ProviderError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(ProviderError::Failed("mock driver not loaded".to_string()));
        }
        info!("Initializing mock topology provider with {} GPUs", self.devices.len());
        Ok(Box::new(MockSession {
            provider: self,
            initialized: true,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockSession<'p> {
    provider: &'p MockProvider,
    initialized: bool,
}

impl MockSession<'_> {
    fn device(&self, device: DeviceHandle) -> Result<&MockDevice, ProviderError> {
        if !self.initialized {
            return Err(ProviderError::Uninitialized);
        }
        self.provider
            .devices
            .get(device.index() as usize)
            .ok_or_else(|| ProviderError::NotFound(format!("GPU{}", device.index())))
    }
}

impl TopologySession for MockSession<'_> {
    fn device_count(&self) -> Result<u32, ProviderError> {
        if !self.initialized {
            return Err(ProviderError::Uninitialized);
        }
        if self.provider.fail_device_count {
            return Err(ProviderError::Failed("device count unavailable".to_string()));
        }
        Ok(self.provider.devices.len() as u32)
    }

    fn device_handle(&self, index: u32) -> Result<DeviceHandle, ProviderError> {
        if self.provider.fail_handles.contains(&index) {
            return Err(ProviderError::Failed(format!("handle lookup failed for GPU{}", index)));
        }
        let handle = DeviceHandle::new(index);
        self.device(handle)?;
        Ok(handle)
    }

    fn device_uuid(&self, device: DeviceHandle) -> Result<String, ProviderError> {
        if self.provider.fail_uuids.contains(&device.index()) {
            return Err(ProviderError::Failed(format!("UUID unavailable for GPU{}", device.index())));
        }
        Ok(self.device(device)?.uuid.clone())
    }

    fn device_pci_bus_id(&self, device: DeviceHandle) -> Result<String, ProviderError> {
        Ok(self.device(device)?.pci_bus_id.clone())
    }

    fn common_ancestor_level(
        &self,
        first: DeviceHandle,
        second: DeviceHandle,
    ) -> Result<TopologyLevel, ProviderError> {
        self.device(first)?;
        self.device(second)?;
        let key = (first.index(), second.index());
        if self.provider.fail_levels.contains(&key) {
            return Err(ProviderError::NotSupported("topology level".to_string()));
        }
        Ok(self
            .provider
            .levels
            .get(&key)
            .copied()
            .unwrap_or(self.provider.default_level))
    }

    fn link_enabled(&self, device: DeviceHandle, slot: u32) -> Result<bool, ProviderError> {
        let mock = self.device(device)?;
        if self.provider.fail_link_states.contains(&(device.index(), slot)) {
            return Err(ProviderError::Failed(format!("link {} state unavailable", slot)));
        }
        Ok(matches!(mock.slots.get(slot as usize), Some(Some(_))))
    }

    fn link_remote_pci_bus_id(&self, device: DeviceHandle, slot: u32) -> Result<String, ProviderError> {
        let mock = self.device(device)?;
        match mock.slots.get(slot as usize) {
            Some(Some(remote)) => Ok(remote.clone()),
            _ => Err(ProviderError::InvalidArgument(format!("link {} is not active", slot))),
        }
    }

    fn shutdown(&mut self) -> Result<(), ProviderError> {
        self.provider.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.initialized = false;
        debug!("Shutting down mock topology provider");
        if self.provider.fail_shutdown {
            return Err(ProviderError::Failed("mock shutdown failed".to_string()));
        }
        Ok(())
    }
}

/// Create mock device info
fn create_mock_device(index: u32) -> MockDevice {
    MockDevice::new(
        format!(
            "GPU-{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            0x12345678,
            0x1234,
            0x5678,
            0x9abc,
            0xdef012345678u64 + index as u64
        ),
        format!("0000:{:02x}:00.0", index + 1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SessionGuard;

    #[test]
    fn test_create_mock_device() {
        let device = create_mock_device(0);
        assert!(device.uuid.starts_with("GPU-"));
        assert_eq!(device.pci_bus_id, "0000:01:00.0");
        assert!(device.slots.is_empty());
    }

    #[test]
    fn test_mock_session_queries() {
        let provider = MockProvider::sample_system();
        let guard = SessionGuard::open(&provider).unwrap();
        let session = guard.session();

        assert_eq!(session.device_count().unwrap(), 4);
        let gpu0 = session.device_handle(0).unwrap();
        let gpu1 = session.device_handle(1).unwrap();
        assert_eq!(
            session.common_ancestor_level(gpu0, gpu1).unwrap(),
            TopologyLevel::Single
        );
        assert!(session.link_enabled(gpu0, 0).unwrap());
        assert_eq!(session.link_remote_pci_bus_id(gpu0, 1).unwrap(), "0000:02:00.0");
        assert!(!session.link_enabled(gpu0, 2).unwrap());
        assert!(session.link_remote_pci_bus_id(gpu0, 2).is_err());
        assert!(session.device_handle(9).is_err());
    }

    #[test]
    fn test_queries_after_shutdown_fail() {
        let provider = MockProvider::with_gpus(1);
        let mut session = provider.init().unwrap();
        session.shutdown().unwrap();
        assert_eq!(session.device_count(), Err(ProviderError::Uninitialized));
        assert_eq!(
            session.device_uuid(DeviceHandle::new(0)),
            Err(ProviderError::Uninitialized)
        );
    }

    #[test]
    fn test_failure_injection() {
        let provider = MockProvider::with_gpus(2)
            .fail_device_count()
            .fail_handle(1)
            .fail_level(0, 1);
        let guard = SessionGuard::open(&provider).unwrap();
        let session = guard.session();
        assert!(session.device_count().is_err());
        assert!(session.device_handle(0).is_ok());
        assert!(session.device_handle(1).is_err());
        let (a, b) = (DeviceHandle::new(0), DeviceHandle::new(1));
        assert!(session.common_ancestor_level(a, b).is_err());
        assert!(session.common_ancestor_level(b, a).is_ok());
    }
}
