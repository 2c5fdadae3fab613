//! GAP layer.
//!
//! This module provides addressing, scan and advertising parameters, the
//! events delivered to the host and the [`GapController`] that drives them.

pub mod address;
pub mod events;
pub mod gap;
pub mod params;
pub mod timeout;
pub mod uuids;

pub use address::{Address, AddressType, OwnAddressType, PeerAddressType};
pub use events::{
    AdvertisingEndEvent, AdvertisingHandle, AdvertisingReportEvent, ConnectionCompleteEvent,
    ConnectionHandle, ConnectionRole, DisconnectionCompleteEvent, DisconnectionReason,
    GapEventHandler, LegacyGapEventHandler, LinkEvent, ScanTimeoutEvent,
};
pub use gap::{ConnectionState, GapController, GapEvent};
pub use params::{AdvertisingParameters, AdvertisingType, DuplicatesFilter, ScanParameters};
pub use uuids::BleUuid;
