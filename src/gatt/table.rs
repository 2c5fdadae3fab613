//! Attribute table compiler.
//!
//! The radio module takes a whole service as one flat list of attribute
//! records: the primary service declaration first, then for every
//! characteristic its declaration, its value and its descriptors. A client
//! characteristic configuration descriptor is added for characteristics that
//! can notify or indicate but did not declare one.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::ble::uuids::{BleUuid, CCCD_UUID, CHARACTERISTIC_UUID, PRIMARY_SERVICE_UUID};
use crate::error::{Error, Result};
use crate::gatt::types::{CharacteristicProperties, GattCharacteristic, GattService};

/// Attribute is readable.
pub const PERMISSION_READ: u8 = 0x01;
/// Attribute is writable.
pub const PERMISSION_WRITE: u8 = 0x10;

const CCCD_LEN: u16 = 2;

/// Value of an attribute record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// A small value carried inline.
    Inline(u16),
    /// A value carried as bytes.
    Bytes(Bytes),
}

/// One entry of the table uploaded to the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    /// Attribute type.
    pub uuid: BleUuid,
    /// Largest value the attribute may hold.
    pub max_len: u16,
    /// Permission bitmask.
    pub permissions: u8,
    /// Initial value.
    pub value: AttributeValue,
    /// Length of the initial value.
    pub value_size: u16,
}

/// Host-side copy of a characteristic value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CharacteristicMirror {
    value: Bytes,
    max_len: u16,
    placeholder: bool,
}

impl CharacteristicMirror {
    /// Mirror seeded with `initial`, clamped to `max_len`.
    pub fn new(initial: &[u8], max_len: u16) -> Self {
        let len = initial.len().min(usize::from(max_len));
        Self {
            value: Bytes::copy_from_slice(&initial[..len]),
            max_len,
            placeholder: false,
        }
    }

    /// Mirror for a characteristic left out of the table.
    pub fn placeholder() -> Self {
        Self {
            value: Bytes::new(),
            max_len: 0,
            placeholder: true,
        }
    }

    /// Current value.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Capacity.
    pub fn max_len(&self) -> u16 {
        self.max_len
    }

    /// Check whether this mirror has no storage.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Replace the value, storing at most `max_len` bytes. Returns the stored length.
    pub fn store(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(usize::from(self.max_len));
        self.value = Bytes::copy_from_slice(&data[..len]);
        len
    }
}

/// Output of [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledService {
    /// Records to upload, in table order.
    pub records: Vec<AttributeRecord>,
    /// One mirror per declared characteristic, placeholders included.
    pub mirrors: Vec<CharacteristicMirror>,
}

fn has_cccd(characteristic: &GattCharacteristic) -> bool {
    characteristic
        .descriptors
        .iter()
        .any(|d| d.uuid == BleUuid::Short(CCCD_UUID))
}

fn needs_cccd(characteristic: &GattCharacteristic) -> bool {
    characteristic.properties.can_notify_or_indicate() && !has_cccd(characteristic)
}

fn len_u16(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

/// Number of records [`compile`] emits for `service`.
pub fn attribute_count(service: &GattService) -> usize {
    1 + service
        .characteristics
        .iter()
        .filter(|c| !c.is_placeholder())
        .map(|c| 2 + c.descriptors.len() + usize::from(needs_cccd(c)))
        .sum::<usize>()
}

fn value_permissions(properties: CharacteristicProperties) -> u8 {
    let mut permissions = 0;
    if properties.contains(CharacteristicProperties::READ) {
        permissions |= PERMISSION_READ;
    }
    if properties.contains(CharacteristicProperties::WRITE) {
        permissions |= PERMISSION_WRITE;
    }
    permissions
}

fn uuid_value(uuid: &BleUuid) -> AttributeValue {
    match uuid {
        BleUuid::Short(short) => AttributeValue::Inline(*short),
        BleUuid::Long(_) => AttributeValue::Bytes(Bytes::from(uuid.to_le_bytes())),
    }
}

/// Compile a service into the module's attribute table layout.
///
/// Allocation failure of either the table or the mirrors fails the whole
/// compilation with [`Error::BufferOverflow`].
pub fn compile(service: &GattService) -> Result<CompiledService> {
    let count = attribute_count(service);

    let mut mirrors = Vec::new();
    mirrors
        .try_reserve_exact(service.characteristics.len())
        .map_err(|_| Error::BufferOverflow)?;
    let mut records = Vec::new();
    records
        .try_reserve_exact(count)
        .map_err(|_| Error::BufferOverflow)?;

    let service_uuid_len = len_u16(service.uuid.encoded_len());
    records.push(AttributeRecord {
        uuid: BleUuid::Short(PRIMARY_SERVICE_UUID),
        max_len: service_uuid_len,
        permissions: PERMISSION_READ,
        value: uuid_value(&service.uuid),
        value_size: service_uuid_len,
    });

    for characteristic in &service.characteristics {
        if characteristic.is_placeholder() {
            trace!("Skipping placeholder characteristic {}", characteristic.uuid);
            mirrors.push(CharacteristicMirror::placeholder());
            continue;
        }

        records.push(AttributeRecord {
            uuid: BleUuid::Short(CHARACTERISTIC_UUID),
            max_len: 1,
            permissions: PERMISSION_READ,
            value: AttributeValue::Inline(u16::from(characteristic.properties.bits())),
            value_size: 1,
        });

        let initial = characteristic.value.clone().unwrap_or_default();
        records.push(AttributeRecord {
            uuid: characteristic.uuid,
            max_len: characteristic.max_len,
            permissions: value_permissions(characteristic.properties),
            value_size: len_u16(initial.len()),
            value: AttributeValue::Bytes(initial.clone()),
        });
        mirrors.push(CharacteristicMirror::new(&initial, characteristic.max_len));

        for descriptor in &characteristic.descriptors {
            let permissions = if descriptor.uuid == BleUuid::Short(CCCD_UUID) {
                PERMISSION_READ | PERMISSION_WRITE
            } else {
                0
            };
            records.push(AttributeRecord {
                uuid: descriptor.uuid,
                max_len: descriptor.max_len,
                permissions,
                value: AttributeValue::Bytes(descriptor.value.clone()),
                value_size: len_u16(descriptor.value.len()),
            });
        }

        if needs_cccd(characteristic) {
            records.push(AttributeRecord {
                uuid: BleUuid::Short(CCCD_UUID),
                max_len: CCCD_LEN,
                permissions: PERMISSION_READ | PERMISSION_WRITE,
                value: AttributeValue::Inline(0x0000),
                value_size: CCCD_LEN,
            });
        }
    }

    debug!(
        "Compiled service {} into {} attributes ({} characteristics)",
        service.uuid,
        records.len(),
        mirrors.len()
    );
    Ok(CompiledService { records, mirrors })
}
