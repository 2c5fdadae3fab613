//! Boundary to the AT-command radio module driver.
//!
//! The driver itself (UART framing, AT command parsing) lives outside this
//! crate. It is consumed through [`RadioModule`], whose commands block until
//! the module answers, and it reports asynchronous happenings through a
//! [`RadioNotifications`] sink that may be invoked from any context.
//!
//! All addresses crossing this boundary are in module order
//! (least-significant byte first).

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::ble::uuids::BleUuid;
use crate::gatt::table::AttributeRecord;

/// Error reported by the radio module driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// The module answered the command with an error.
    #[error("AT command failed: {command}")]
    CommandFailed {
        /// The command that failed.
        command: String,
    },

    /// The module did not answer in time.
    #[error("AT command timed out")]
    Timeout,

    /// The serial link to the module is gone.
    #[error("Radio module not reachable")]
    Unreachable,
}

/// A specialized Result type for driver commands.
pub type RadioResult<T> = std::result::Result<T, RadioError>;

/// Role the module is initialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ModuleRole {
    /// GATT client (connection initiator).
    Client = 1,
    /// GATT server (advertiser).
    #[default]
    Server = 2,
}

impl ModuleRole {
    /// Create from the raw role code reported by the module.
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::Client,
            _ => Self::Server,
        }
    }
}

/// Own address kind understood by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModuleAddressType {
    /// The module's factory public address.
    Public = 0,
    /// A random address supplied by the host.
    Random = 1,
}

/// Scan parameters in module encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleScanParams {
    /// 0 = passive, 1 = active.
    pub scan_type: u8,
    /// Own address type code.
    pub own_addr_type: u8,
    /// Scan filter policy code.
    pub filter_policy: u8,
    /// Scan interval in 0.625 ms units.
    pub interval: u16,
    /// Scan window in 0.625 ms units.
    pub window: u16,
}

/// Advertising parameters in module encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleAdvertisingParams {
    /// Minimum advertising interval in 0.625 ms units.
    pub adv_int_min: u16,
    /// Maximum advertising interval in 0.625 ms units.
    pub adv_int_max: u16,
    /// Advertising PDU type code.
    pub adv_type: u8,
    /// Own address type code.
    pub own_addr_type: u8,
    /// Channel map bitmask.
    pub channel_map: u8,
    /// Advertising filter policy code.
    pub adv_filter_policy: u8,
    /// Peer address type code.
    pub peer_addr_type: u8,
    /// Peer address, module order.
    pub peer_addr: [u8; 6],
}

/// A raw scan result as reported by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Advertiser address, module order.
    pub addr: [u8; 6],
    /// Advertiser address type code.
    pub addr_type: u8,
    /// Received signal strength in dBm.
    pub rssi: i8,
    /// Raw advertising payload.
    pub adv_data: Bytes,
}

/// A remote write to a local characteristic, as reported by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePacket {
    /// Connection index the write arrived on.
    pub conn_index: u8,
    /// Service index of the written attribute.
    pub srv_index: u8,
    /// Characteristic index of the written attribute (1-based).
    pub char_index: u16,
    /// Written bytes.
    pub data: Bytes,
}

/// A primary service found on the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryService {
    /// Module-assigned service index.
    pub index: u8,
    /// Service UUID.
    pub uuid: BleUuid,
}

/// A characteristic found on the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCharacteristic {
    /// Module-assigned characteristic index within its service.
    pub index: u8,
    /// Characteristic UUID.
    pub uuid: BleUuid,
    /// Raw property bitmask.
    pub properties: u8,
}

/// Sink for asynchronous notifications raised by the driver.
///
/// Implementations must never block: the driver may call these from its
/// receive interrupt or transport thread.
pub trait RadioNotifications: Send + Sync {
    /// New data is pending in the driver and a poll should follow.
    fn on_data_available(&self);

    /// A link was established.
    fn on_connect(&self, conn_index: u8, remote_addr: [u8; 6]);

    /// A link was closed.
    fn on_disconnect(&self, conn_index: u8);

    /// An advertising report was received.
    fn on_scan_report(&self, report: ScanReport);

    /// A peer wrote to one of the local characteristics.
    fn on_write(&self, packet: WritePacket);
}

/// Blocking command interface to the radio module.
#[cfg_attr(test, mockall::automock)]
pub trait RadioModule: Send + Sync {
    /// Register the sink that receives asynchronous notifications.
    fn register_notifications(&self, sink: Arc<dyn RadioNotifications>);

    /// Poll the transport for out-of-band data, dispatching notifications.
    fn process_oob(&self, timeout_ms: u32, all: bool);

    /// Firmware version string.
    fn version(&self) -> RadioResult<String>;

    /// Initialize the module in the given role.
    fn set_role(&self, role: ModuleRole) -> RadioResult<()>;

    /// Current role of the module.
    fn role(&self) -> RadioResult<ModuleRole>;

    /// Upload scan parameters.
    fn set_scan_params(&self, params: &ModuleScanParams) -> RadioResult<()>;

    /// Start scanning.
    fn start_scan(&self) -> RadioResult<()>;

    /// Stop scanning.
    fn stop_scan(&self) -> RadioResult<()>;

    /// Upload advertising parameters.
    fn set_advertising_params(&self, params: &ModuleAdvertisingParams) -> RadioResult<()>;

    /// Start the GATT services previously uploaded.
    fn start_services(&self) -> RadioResult<()>;

    /// Set the raw advertising payload.
    fn set_advertising_data(&self, data: &[u8]) -> RadioResult<()>;

    /// Set the raw scan response payload.
    fn set_scan_response(&self, data: &[u8]) -> RadioResult<()>;

    /// Start advertising.
    fn start_advertising(&self) -> RadioResult<()>;

    /// Stop advertising.
    fn stop_advertising(&self) -> RadioResult<()>;

    /// The module's public address, module order.
    fn address(&self) -> RadioResult<[u8; 6]>;

    /// Select the own address; random addresses carry the address bytes.
    fn set_address(&self, kind: ModuleAddressType, address: Option<[u8; 6]>) -> RadioResult<()>;

    /// Set the GAP device name.
    fn set_device_name(&self, name: &str) -> RadioResult<()>;

    /// Get the GAP device name.
    fn device_name(&self) -> RadioResult<String>;

    /// Initiate a connection to the given address.
    fn connect(&self, conn_index: u8, address: [u8; 6]) -> RadioResult<()>;

    /// Discover up to `max` primary services on the peer.
    fn discover_services(&self, conn_index: u8, max: usize) -> RadioResult<Vec<PrimaryService>>;

    /// Discover up to `max` characteristics of one peer service.
    fn discover_characteristics(
        &self,
        conn_index: u8,
        srv_index: u8,
        max: usize,
    ) -> RadioResult<Vec<ModuleCharacteristic>>;

    /// Read a peer characteristic into `buf`, returning the byte count.
    fn read_characteristic(
        &self,
        conn_index: u8,
        srv_index: u8,
        char_index: u8,
        buf: &mut [u8],
    ) -> RadioResult<usize>;

    /// Write a peer characteristic.
    fn write_characteristic(
        &self,
        conn_index: u8,
        srv_index: u8,
        char_index: u8,
        data: &[u8],
    ) -> RadioResult<()>;

    /// Update the value of a local characteristic.
    fn set_characteristic(&self, srv_index: u8, char_index: u16, data: &[u8]) -> RadioResult<()>;

    /// Notify/indicate a local characteristic value to the peer.
    fn notify_characteristic(&self, srv_index: u8, char_index: u16, data: &[u8])
        -> RadioResult<()>;

    /// Upload a compiled attribute table.
    fn set_service(&self, table: &[AttributeRecord]) -> RadioResult<()>;
}
