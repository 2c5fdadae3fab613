//! BLE UUIDs.
//!
//! Attributes are identified either by a 16-bit alias of the Bluetooth base
//! UUID or by a full 128-bit UUID. The two forms compare equal when they name
//! the same UUID.

use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// The Bluetooth base UUID, `0000xxxx-0000-1000-8000-00805f9b34fb`.
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb);

/// Primary Service declaration attribute type.
pub const PRIMARY_SERVICE_UUID: u16 = 0x2800;
/// Characteristic declaration attribute type.
pub const CHARACTERISTIC_UUID: u16 = 0x2803;
/// Client Characteristic Configuration Descriptor.
pub const CCCD_UUID: u16 = 0x2902;

/// UUID of a service, characteristic or descriptor.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BleUuid {
    /// 16-bit alias of the Bluetooth base UUID.
    Short(u16),
    /// Full 128-bit UUID.
    Long(Uuid),
}

impl BleUuid {
    /// Expand to the full 128-bit form.
    pub fn to_uuid(&self) -> Uuid {
        match self {
            Self::Short(short) => {
                Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | (u128::from(*short) << 96))
            }
            Self::Long(uuid) => *uuid,
        }
    }

    /// Encoded length in bytes (2 or 16).
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Short(_) => 2,
            Self::Long(_) => 16,
        }
    }

    /// Encoded bytes, least-significant byte first as the module expects.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Short(short) => short.to_le_bytes().to_vec(),
            Self::Long(uuid) => uuid.as_u128().to_le_bytes().to_vec(),
        }
    }

    /// The 16-bit alias, if this UUID has one.
    pub fn as_short(&self) -> Option<u16> {
        match self {
            Self::Short(short) => Some(*short),
            Self::Long(uuid) => {
                let value = uuid.as_u128();
                let base = BLUETOOTH_BASE_UUID.as_u128();
                let mask = !(0xFFFF_u128 << 96);
                (value & mask == base && value >> 112 == 0).then(|| (value >> 96) as u16)
            }
        }
    }
}

impl PartialEq for BleUuid {
    fn eq(&self, other: &Self) -> bool {
        self.to_uuid() == other.to_uuid()
    }
}

impl Eq for BleUuid {}

impl Hash for BleUuid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_uuid().hash(state);
    }
}

impl From<u16> for BleUuid {
    fn from(short: u16) -> Self {
        Self::Short(short)
    }
}

impl From<Uuid> for BleUuid {
    fn from(uuid: Uuid) -> Self {
        Self::Long(uuid)
    }
}

impl std::fmt::Display for BleUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short(short) => write!(f, "0x{:04X}", short),
            Self::Long(uuid) => write!(f, "{}", uuid),
        }
    }
}
