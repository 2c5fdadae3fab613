//! GAP events delivered to the host.
//!
//! Connection and disconnection are modelled as one canonical [`LinkEvent`].
//! The host API has two ways of receiving them, a structured event handler
//! and the legacy positional callbacks, and each is fed by its own
//! projection of the same event.

use bytes::Bytes;

use crate::ble::address::{Address, AddressType, PeerAddressType};

/// Handle of a connection.
pub type ConnectionHandle = u16;

/// Handle of an advertising set.
pub type AdvertisingHandle = u8;

/// Role of the local device in a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionRole {
    /// The local device initiated the connection.
    Central,
    /// The local device accepted the connection.
    #[default]
    Peripheral,
}

/// Reason code for a disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DisconnectionReason {
    /// Authentication failure.
    AuthenticationFailure = 0x05,
    /// Supervision timeout.
    ConnectionTimeout = 0x08,
    /// The remote user terminated the connection.
    RemoteUserTerminatedConnection = 0x13,
    /// The local host terminated the connection.
    LocalHostTerminatedConnection = 0x16,
}

/// Physical layer of an advertising report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phy {
    /// Not used / unsupported.
    None,
    /// LE 1M.
    Le1M,
    /// LE 2M.
    Le2M,
    /// LE Coded.
    LeCoded,
}

/// Largest connection interval, in 1.25 ms units.
pub const CONN_INTERVAL_MAX: u16 = 0x0C80;
/// Largest supervision timeout, in 10 ms units.
pub const SUPERVISION_TIMEOUT_MAX: u16 = 0x0C80;
/// Legacy advertising event type: connectable, scannable, undirected, legacy PDU.
pub const LEGACY_ADV_IND_EVENT_TYPE: u8 = 0x1B;
/// Advertising SID used when the PDU carries no ADI field.
pub const SID_NOT_AVAILABLE: u8 = 0xFF;
/// TX power value used when the report carries none.
pub const TX_POWER_NOT_AVAILABLE: i8 = 127;

/// A connection was established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCompleteEvent {
    /// Connection handle.
    pub connection_handle: ConnectionHandle,
    /// Local role.
    pub own_role: ConnectionRole,
    /// Peer address type.
    pub peer_address_type: PeerAddressType,
    /// Peer address.
    pub peer_address: Address,
    /// Local resolvable private address (unused).
    pub local_resolvable_private_address: Address,
    /// Peer resolvable private address (unused).
    pub peer_resolvable_private_address: Address,
    /// Connection interval, 1.25 ms units.
    pub connection_interval: u16,
    /// Peripheral latency.
    pub peripheral_latency: u16,
    /// Supervision timeout, 10 ms units.
    pub supervision_timeout: u16,
    /// Central clock accuracy.
    pub central_clock_accuracy: u8,
}

/// A connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectionCompleteEvent {
    /// Connection handle.
    pub connection_handle: ConnectionHandle,
    /// Reason for the disconnection.
    pub reason: DisconnectionReason,
}

/// An advertising report received while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingReportEvent {
    /// Advertising event type bitfield.
    pub event_type: u8,
    /// Advertiser address type.
    pub peer_address_type: PeerAddressType,
    /// Advertiser address.
    pub peer_address: Address,
    /// Primary PHY.
    pub primary_phy: Phy,
    /// Secondary PHY.
    pub secondary_phy: Phy,
    /// Advertising SID.
    pub sid: u8,
    /// TX power.
    pub tx_power: i8,
    /// RSSI in dBm.
    pub rssi: i8,
    /// Periodic advertising interval (0 = none).
    pub periodic_interval: u16,
    /// Direct address type.
    pub direct_address_type: PeerAddressType,
    /// Direct address.
    pub direct_address: Address,
    /// Raw advertising payload.
    pub payload: Bytes,
}

/// A scan ended because its duration elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanTimeoutEvent;

/// Advertising ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingEndEvent {
    /// Advertising set that ended.
    pub adv_handle: AdvertisingHandle,
    /// Connection created by the advertising, if any.
    pub connection_handle: ConnectionHandle,
    /// Number of completed advertising events.
    pub completed_events: u8,
    /// Whether a connection was live when advertising ended.
    pub connected: bool,
}

/// Structured GAP event handler. All methods default to doing nothing.
pub trait GapEventHandler: Send + Sync {
    /// A connection was established.
    fn on_connection_complete(&self, _event: &ConnectionCompleteEvent) {}

    /// A connection was closed.
    fn on_disconnection_complete(&self, _event: &DisconnectionCompleteEvent) {}

    /// An advertising report was received.
    fn on_advertising_report(&self, _event: &AdvertisingReportEvent) {}

    /// A bounded scan ran out.
    fn on_scan_timeout(&self, _event: &ScanTimeoutEvent) {}

    /// Advertising ended.
    fn on_advertising_end(&self, _event: &AdvertisingEndEvent) {}
}

/// Role as reported through the legacy callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyRole {
    /// Peripheral.
    Peripheral,
    /// Central.
    Central,
}

/// Connection parameters reported through the legacy callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyConnectionParams {
    /// Minimum connection interval.
    pub min_connection_interval: u16,
    /// Maximum connection interval.
    pub max_connection_interval: u16,
    /// Slave latency.
    pub slave_latency: u16,
    /// Supervision timeout.
    pub connection_supervision_timeout: u16,
}

impl Default for LegacyConnectionParams {
    fn default() -> Self {
        // The module does not report link parameters.
        Self {
            min_connection_interval: 10,
            max_connection_interval: 10,
            slave_latency: 10,
            connection_supervision_timeout: 10,
        }
    }
}

/// Legacy positional-argument connection callbacks.
pub trait LegacyGapEventHandler: Send + Sync {
    /// A connection was established.
    #[allow(clippy::too_many_arguments)]
    fn on_connection(
        &self,
        _handle: ConnectionHandle,
        _role: LegacyRole,
        _peer_address_type: PeerAddressType,
        _peer_address: &Address,
        _own_address_type: AddressType,
        _own_address: &Address,
        _params: &LegacyConnectionParams,
    ) {
    }

    /// A connection was closed.
    fn on_disconnection(&self, _handle: ConnectionHandle, _reason: DisconnectionReason) {}
}

/// Canonical connection lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A link came up.
    Connected {
        /// Connection handle.
        handle: ConnectionHandle,
        /// Local role.
        role: ConnectionRole,
        /// Peer address, host order.
        peer_address: Address,
        /// Local address type at connection time.
        own_address_type: AddressType,
        /// Local address at connection time.
        own_address: Address,
    },
    /// A link went down.
    Disconnected {
        /// Connection handle.
        handle: ConnectionHandle,
        /// Reason for the disconnection.
        reason: DisconnectionReason,
    },
}

impl LinkEvent {
    /// Project onto the structured event handler.
    pub fn deliver_structured(&self, handler: &dyn GapEventHandler) {
        match self {
            Self::Connected {
                handle,
                role,
                peer_address,
                ..
            } => handler.on_connection_complete(&ConnectionCompleteEvent {
                connection_handle: *handle,
                own_role: *role,
                peer_address_type: PeerAddressType::Anonymous,
                peer_address: *peer_address,
                local_resolvable_private_address: Address::default(),
                peer_resolvable_private_address: Address::default(),
                connection_interval: CONN_INTERVAL_MAX,
                peripheral_latency: 0,
                supervision_timeout: SUPERVISION_TIMEOUT_MAX,
                central_clock_accuracy: 0,
            }),
            Self::Disconnected { handle, reason } => {
                handler.on_disconnection_complete(&DisconnectionCompleteEvent {
                    connection_handle: *handle,
                    reason: *reason,
                })
            }
        }
    }

    /// Project onto the legacy positional callbacks.
    pub fn deliver_legacy(&self, handler: &dyn LegacyGapEventHandler) {
        match self {
            Self::Connected {
                handle,
                role,
                peer_address,
                own_address_type,
                own_address,
            } => {
                let legacy_role = match role {
                    ConnectionRole::Central => LegacyRole::Central,
                    ConnectionRole::Peripheral => LegacyRole::Peripheral,
                };
                handler.on_connection(
                    *handle,
                    legacy_role,
                    PeerAddressType::Anonymous,
                    peer_address,
                    *own_address_type,
                    own_address,
                    &LegacyConnectionParams::default(),
                );
            }
            Self::Disconnected { handle, reason } => handler.on_disconnection(*handle, *reason),
        }
    }
}
