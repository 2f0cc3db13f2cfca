//! Link classification taxonomy

use crate::provider::TopologyLevel;
use serde::{Deserialize, Serialize};

/// Hardware ceiling of NVLink slots per device
pub const MAX_NVLINKS: u32 = 12;

/// Display codes indexed by [`LinkType::code`]
pub const LINK_LABELS: [&str; LinkType::COUNT] = [
    "N/A", "SYS", "NODE", "PHB", "PXB", "PIX", "X", "NV1", "NV2", "NV3", "NV4", "NV5", "NV6",
    "NV7", "NV8", "NV9", "NV10", "NV11", "NV12",
];

/// Relationship between an ordered pair of devices.
///
/// Codes grow with proximity: the PCIe family runs from `CrossCpu` (farthest)
/// to `SameBoard` (nearest), and every NVLink class ranks above all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkType {
    /// Undetermined, or the device itself
    #[default]
    Unknown = 0,
    CrossCpu,
    SameCpu,
    HostBridge,
    MultiSwitch,
    SingleSwitch,
    SameBoard,
    OneLink,
    TwoLinks,
    ThreeLinks,
    FourLinks,
    FiveLinks,
    SixLinks,
    SevenLinks,
    EightLinks,
    NineLinks,
    TenLinks,
    ElevenLinks,
    TwelveLinks,
}

impl LinkType {
    pub const COUNT: usize = 19;

    pub const ALL: [LinkType; LinkType::COUNT] = [
        LinkType::Unknown,
        LinkType::CrossCpu,
        LinkType::SameCpu,
        LinkType::HostBridge,
        LinkType::MultiSwitch,
        LinkType::SingleSwitch,
        LinkType::SameBoard,
        LinkType::OneLink,
        LinkType::TwoLinks,
        LinkType::ThreeLinks,
        LinkType::FourLinks,
        LinkType::FiveLinks,
        LinkType::SixLinks,
        LinkType::SevenLinks,
        LinkType::EightLinks,
        LinkType::NineLinks,
        LinkType::TenLinks,
        LinkType::ElevenLinks,
        LinkType::TwelveLinks,
    ];

    /// Numeric code stored in the topology matrix
    pub fn code(self) -> u64 {
        self as u64
    }

    /// Inverse of [`LinkType::code`]
    pub fn from_code(code: u64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Short display code, e.g. `PHB` or `NV2`
    pub fn label(self) -> &'static str {
        LINK_LABELS[self as usize]
    }

    /// PCIe class for a common-ancestor level
    pub fn from_level(level: TopologyLevel) -> Self {
        match level {
            TopologyLevel::Internal => LinkType::SameBoard,
            TopologyLevel::Single => LinkType::SingleSwitch,
            TopologyLevel::Multiple => LinkType::MultiSwitch,
            TopologyLevel::HostBridge => LinkType::HostBridge,
            TopologyLevel::Node => LinkType::SameCpu,
            TopologyLevel::System => LinkType::CrossCpu,
        }
    }

    /// One more matched NVLink. `Unknown` starts the progression and
    /// `TwelveLinks` saturates it. PCIe classes do not take part.
    pub fn next_link(self) -> Self {
        match self {
            LinkType::Unknown => LinkType::OneLink,
            LinkType::OneLink => LinkType::TwoLinks,
            LinkType::TwoLinks => LinkType::ThreeLinks,
            LinkType::ThreeLinks => LinkType::FourLinks,
            LinkType::FourLinks => LinkType::FiveLinks,
            LinkType::FiveLinks => LinkType::SixLinks,
            LinkType::SixLinks => LinkType::SevenLinks,
            LinkType::SevenLinks => LinkType::EightLinks,
            LinkType::EightLinks => LinkType::NineLinks,
            LinkType::NineLinks => LinkType::TenLinks,
            LinkType::TenLinks => LinkType::ElevenLinks,
            LinkType::ElevenLinks => LinkType::TwelveLinks,
            other => other,
        }
    }

    pub fn is_nvlink(self) -> bool {
        self >= LinkType::OneLink
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
