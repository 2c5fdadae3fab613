//! Host-side GATT service model.

use bytes::Bytes;

use crate::ble::uuids::BleUuid;

/// Handle of a local characteristic value, dense in registration order.
pub type AttributeHandle = u16;

/// Characteristic property bitmask as carried by the declaration attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicProperties(u8);

impl CharacteristicProperties {
    /// Permits broadcasts of the value.
    pub const BROADCAST: Self = Self(0x01);
    /// Permits reads.
    pub const READ: Self = Self(0x02);
    /// Permits writes without response.
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    /// Permits writes with response.
    pub const WRITE: Self = Self(0x08);
    /// Permits notifications.
    pub const NOTIFY: Self = Self(0x10);
    /// Permits indications.
    pub const INDICATE: Self = Self(0x20);
    /// Permits signed writes.
    pub const AUTHENTICATED_SIGNED_WRITES: Self = Self(0x40);
    /// Extended properties descriptor present.
    pub const EXTENDED_PROPERTIES: Self = Self(0x80);

    /// No properties.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create from the raw bitmask.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check whether all bits of `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether the characteristic can notify or indicate.
    pub const fn can_notify_or_indicate(&self) -> bool {
        self.0 & (Self::NOTIFY.0 | Self::INDICATE.0) != 0
    }
}

impl std::ops::BitOr for CharacteristicProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A descriptor attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattAttribute {
    /// Attribute type.
    pub uuid: BleUuid,
    /// Current value.
    pub value: Bytes,
    /// Largest value the attribute may hold.
    pub max_len: u16,
}

impl GattAttribute {
    /// Create a descriptor with an initial value.
    pub fn new(uuid: impl Into<BleUuid>, value: impl Into<Bytes>, max_len: u16) -> Self {
        Self {
            uuid: uuid.into(),
            value: value.into(),
            max_len,
        }
    }
}

/// A characteristic with its value attribute and descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    /// Value attribute type.
    pub uuid: BleUuid,
    /// Property bitmask.
    pub properties: CharacteristicProperties,
    /// Initial value. `None` means no backing storage was supplied.
    pub value: Option<Bytes>,
    /// Largest value the characteristic may hold.
    pub max_len: u16,
    /// Explicit descriptors, in declaration order.
    pub descriptors: Vec<GattAttribute>,
}

impl GattCharacteristic {
    /// Create a characteristic without a value.
    pub fn new(uuid: impl Into<BleUuid>, properties: CharacteristicProperties) -> Self {
        Self {
            uuid: uuid.into(),
            properties,
            value: None,
            max_len: 0,
            descriptors: Vec::new(),
        }
    }

    /// Set the initial value and capacity.
    pub fn with_value(mut self, value: impl Into<Bytes>, max_len: u16) -> Self {
        self.value = Some(value.into());
        self.max_len = max_len;
        self
    }

    /// Append a descriptor.
    pub fn with_descriptor(mut self, descriptor: GattAttribute) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Check whether this is a read-only characteristic with no storage.
    ///
    /// Such characteristics are placeholders and are left out of the
    /// attribute table.
    pub fn is_placeholder(&self) -> bool {
        self.value.is_none() && self.properties == CharacteristicProperties::READ
    }
}

/// A primary service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: BleUuid,
    /// Characteristics, in declaration order.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Create an empty service.
    pub fn new(uuid: impl Into<BleUuid>) -> Self {
        Self {
            uuid: uuid.into(),
            characteristics: Vec::new(),
        }
    }

    /// Append a characteristic.
    pub fn with_characteristic(mut self, characteristic: GattCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}
