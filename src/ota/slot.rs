//! Boot partition identity.

use core::fmt;

/// One of the fixed app partitions capable of holding a bootable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionSlot {
    Factory,
    OtaA,
    OtaB,
}

impl PartitionSlot {
    /// Every slot, in partition-table order.
    pub const ALL: [Self; 3] = [Self::Factory, Self::OtaA, Self::OtaB];

    /// Resolve a logical partition name (`factory`, `ota_0`, `ota_1`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "factory" => Some(Self::Factory),
            "ota_0" => Some(Self::OtaA),
            "ota_1" => Some(Self::OtaB),
            _ => None,
        }
    }

    /// Logical name, as used by the partition table and the HTTP API.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Factory => "factory",
            Self::OtaA => "ota_0",
            Self::OtaB => "ota_1",
        }
    }

    /// NVS key holding this slot's version record (≤ 15 bytes).
    pub const fn version_key(self) -> &'static str {
        match self {
            Self::Factory => "version_factory",
            Self::OtaA => "version_ota_0",
            Self::OtaB => "version_ota_1",
        }
    }

    /// Human-readable name for the dashboard selector.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Factory => "Factory",
            Self::OtaA => "OTA 0",
            Self::OtaB => "OTA 1",
        }
    }
}

impl fmt::Display for PartitionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
