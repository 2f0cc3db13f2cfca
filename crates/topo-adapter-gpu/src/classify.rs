//! Pairwise link classification
//!
//! Provider failures inside this module never abort a run. A failed UUID or
//! ancestor lookup degrades the cell to `Unknown`, and a failed NVLink query
//! counts as no links found.

use crate::link::{LinkType, MAX_NVLINKS};
use crate::provider::{DeviceHandle, TopologySession};

use tracing::debug;

/// Classify the connection from `src` to `dest`.
///
/// NVLink takes precedence over any PCIe tier. Callers handle `src == dest`.
pub fn classify(session: &dyn TopologySession, src: DeviceHandle, dest: DeviceHandle) -> LinkType {
    let src_uuid = match session.device_uuid(src) {
        Ok(uuid) => uuid,
        Err(e) => {
            debug!("UUID lookup failed for GPU{}: {}", src.index(), e);
            return LinkType::Unknown;
        }
    };
    let dest_uuid = match session.device_uuid(dest) {
        Ok(uuid) => uuid,
        Err(e) => {
            debug!("UUID lookup failed for GPU{}: {}", dest.index(), e);
            return LinkType::Unknown;
        }
    };
    if src_uuid == dest_uuid {
        debug!(
            "GPU{} and GPU{} resolve to the same device {}",
            src.index(),
            dest.index(),
            src_uuid
        );
        return LinkType::SameBoard;
    }

    let pcie = match session.common_ancestor_level(src, dest) {
        Ok(level) => LinkType::from_level(level),
        Err(e) => {
            debug!(
                "Common ancestor lookup failed for GPU{} -> GPU{}: {}",
                src.index(),
                dest.index(),
                e
            );
            LinkType::Unknown
        }
    };

    let nvlink = count_nvlinks(session, src, dest);
    if nvlink.is_nvlink() {
        nvlink
    } else {
        pcie
    }
}

/// Count the active NVLink slots on `src` whose remote endpoint is `dest`.
///
/// Returns `Unknown` when no slot matches, otherwise `OneLink`..`TwelveLinks`.
pub fn count_nvlinks(session: &dyn TopologySession, src: DeviceHandle, dest: DeviceHandle) -> LinkType {
    let dest_bus_id = match session.device_pci_bus_id(dest) {
        Ok(bus_id) => bus_id,
        Err(e) => {
            debug!("PCI info lookup failed for GPU{}: {}", dest.index(), e);
            return LinkType::Unknown;
        }
    };

    let mut link = LinkType::Unknown;
    for slot in 0..MAX_NVLINKS {
        match session.link_enabled(src, slot) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                debug!("NVLink state query failed for GPU{} slot {}: {}", src.index(), slot, e);
                return LinkType::Unknown;
            }
        }
        let remote_bus_id = match session.link_remote_pci_bus_id(src, slot) {
            Ok(bus_id) => bus_id,
            Err(e) => {
                debug!("NVLink remote PCI query failed for GPU{} slot {}: {}", src.index(), slot, e);
                return LinkType::Unknown;
            }
        };
        if same_bus_id(&remote_bus_id, &dest_bus_id) {
            link = link.next_link();
        }
    }
    // TODO: NVSwitch-attached links report the switch as the remote endpoint
    link
}

/// Compare PCI bus ids ignoring case and the domain width NVML varies on
/// (`00000000:3B:00.0` vs `0000:3b:00.0`).
fn same_bus_id(a: &str, b: &str) -> bool {
    fn normalize(id: &str) -> String {
        let id = id.trim().to_ascii_lowercase();
        match id.split_once(':') {
            Some((domain, rest)) => {
                let domain = domain.trim_start_matches('0');
                format!("{}:{}", domain, rest)
            }
            None => id,
        }
    }
    normalize(a) == normalize(b)
}
