//! Scan and advertising parameters and their module encoding.

use crate::ble::address::{Address, OwnAddressType};
use crate::error::{Error, Result};
use crate::radio::{ModuleAddressType, ModuleAdvertisingParams, ModuleScanParams};

/// Smallest connectable advertising interval, 0.625 ms units.
pub const ADV_INTERVAL_MIN: u16 = 0x0020;
/// Smallest non-connectable advertising interval, 0.625 ms units.
pub const ADV_INTERVAL_MIN_NONCONNECTABLE: u16 = 0x00A0;
/// Largest advertising interval, 0.625 ms units.
pub const ADV_INTERVAL_MAX: u16 = 0x4000;

// Module encodings.
const ADV_TYPE_IND: u8 = 0;
const ADV_TYPE_SCAN_IND: u8 = 2;
const ADV_TYPE_NONCONN_IND: u8 = 3;
const ADV_CHNL_37: u8 = 0x01;
const ADV_CHNL_38: u8 = 0x02;
const ADV_CHNL_39: u8 = 0x04;

/// Advertising PDU type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdvertisingType {
    /// Connectable and scannable undirected.
    #[default]
    ConnectableUndirected,
    /// Connectable high duty cycle directed.
    ConnectableDirected,
    /// Scannable undirected.
    ScannableUndirected,
    /// Non-connectable undirected.
    NonConnectableUndirected,
    /// Connectable low duty cycle directed.
    ConnectableDirectedLowDuty,
}

/// Which requests an advertiser accepts from which peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdvertisingFilterPolicy {
    /// Accept scan and connection requests from anyone.
    #[default]
    NoFilter,
    /// Scan requests from the filter accept list only.
    FilterScanRequests,
    /// Connection requests from the filter accept list only.
    FilterConnectionRequests,
    /// Both from the filter accept list only.
    FilterScanAndConnectionRequests,
}

/// Address type of a directed advertising target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetPeerAddressType {
    /// Public address.
    #[default]
    Public,
    /// Random address.
    Random,
}

/// Advertising parameters as set by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParameters {
    /// PDU type.
    pub adv_type: AdvertisingType,
    /// Minimum primary interval, 0.625 ms units.
    pub min_interval: u16,
    /// Maximum primary interval, 0.625 ms units.
    pub max_interval: u16,
    /// Own address type.
    pub own_address_type: OwnAddressType,
    /// Advertise on channel 37.
    pub channel37: bool,
    /// Advertise on channel 38.
    pub channel38: bool,
    /// Advertise on channel 39.
    pub channel39: bool,
    /// Filter policy.
    pub filter: AdvertisingFilterPolicy,
    /// Target address type for directed advertising.
    pub peer_address_type: TargetPeerAddressType,
    /// Target address for directed advertising.
    pub peer_address: Address,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self {
            adv_type: AdvertisingType::default(),
            min_interval: 0x0400,
            max_interval: 0x0400,
            own_address_type: OwnAddressType::Random,
            channel37: true,
            channel38: true,
            channel39: true,
            filter: AdvertisingFilterPolicy::default(),
            peer_address_type: TargetPeerAddressType::default(),
            peer_address: Address::default(),
        }
    }
}

/// Own address selection derived from [`AdvertisingParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnAddressSelection {
    /// Kind handed to the module.
    pub kind: ModuleAddressType,
    /// Address bytes (module order) for random addresses.
    pub address: Option<[u8; 6]>,
}

impl AdvertisingParameters {
    /// Validate and encode for the module.
    ///
    /// Nothing is sent to the module here, so a rejected parameter set
    /// leaves the module untouched.
    pub fn to_module(
        &self,
        random_address: &Address,
    ) -> Result<(ModuleAdvertisingParams, OwnAddressSelection)> {
        let in_range = |v: u16| (ADV_INTERVAL_MIN..=ADV_INTERVAL_MAX).contains(&v);
        if !in_range(self.min_interval) {
            return Err(Error::invalid_param("min_interval", self.min_interval));
        }
        if !in_range(self.max_interval) {
            return Err(Error::invalid_param("max_interval", self.max_interval));
        }
        if self.min_interval > self.max_interval {
            return Err(Error::invalid_param(
                "min_interval",
                format!("{} > max_interval {}", self.min_interval, self.max_interval),
            ));
        }

        let adv_type = match self.adv_type {
            AdvertisingType::ConnectableUndirected => ADV_TYPE_IND,
            AdvertisingType::ScannableUndirected => ADV_TYPE_SCAN_IND,
            AdvertisingType::NonConnectableUndirected => ADV_TYPE_NONCONN_IND,
            other => return Err(Error::invalid_param("adv_type", format!("{:?}", other))),
        };

        let own = match self.own_address_type {
            OwnAddressType::Public => OwnAddressSelection {
                kind: ModuleAddressType::Public,
                address: None,
            },
            OwnAddressType::Random => OwnAddressSelection {
                kind: ModuleAddressType::Random,
                address: Some(random_address.to_module_order()),
            },
            other => {
                return Err(Error::invalid_param(
                    "own_address_type",
                    format!("{:?}", other),
                ))
            }
        };

        let mut channel_map = 0;
        if self.channel37 {
            channel_map |= ADV_CHNL_37;
        }
        if self.channel38 {
            channel_map |= ADV_CHNL_38;
        }
        if self.channel39 {
            channel_map |= ADV_CHNL_39;
        }

        let adv_filter_policy = match self.filter {
            AdvertisingFilterPolicy::NoFilter => 0,
            AdvertisingFilterPolicy::FilterScanRequests => 1,
            AdvertisingFilterPolicy::FilterConnectionRequests => 2,
            AdvertisingFilterPolicy::FilterScanAndConnectionRequests => 3,
        };

        let peer_addr_type = match self.peer_address_type {
            TargetPeerAddressType::Public => ModuleAddressType::Public as u8,
            TargetPeerAddressType::Random => ModuleAddressType::Random as u8,
        };

        Ok((
            ModuleAdvertisingParams {
                adv_int_min: self.min_interval,
                adv_int_max: self.max_interval,
                adv_type,
                own_addr_type: own.kind as u8,
                channel_map,
                adv_filter_policy,
                peer_addr_type,
                peer_addr: self.peer_address.to_module_order(),
            },
            own,
        ))
    }
}

/// Scan filter policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ScanFilterPolicy {
    /// Accept all advertisements.
    #[default]
    NoFilter = 0,
    /// Accept only filter accept list advertisers.
    FilterAdvertising = 1,
    /// Accept all, including directed to a resolvable address.
    NoFilterIncludeUnresolvableDirected = 2,
    /// Filter accept list, including directed to a resolvable address.
    FilterAdvertisingIncludeUnresolvableDirected = 3,
}

/// Scan parameters as set by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParameters {
    /// Own address type.
    pub own_address_type: OwnAddressType,
    /// Filter policy.
    pub filter: ScanFilterPolicy,
    /// Active scanning (send scan requests).
    pub active_scanning: bool,
    /// Scan interval, 0.625 ms units.
    pub interval: u16,
    /// Scan window, 0.625 ms units.
    pub window: u16,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            own_address_type: OwnAddressType::Public,
            filter: ScanFilterPolicy::default(),
            active_scanning: false,
            interval: 0x0004,
            window: 0x0004,
        }
    }
}

impl ScanParameters {
    /// Encode for the module.
    pub fn to_module(&self) -> ModuleScanParams {
        ModuleScanParams {
            scan_type: u8::from(self.active_scanning),
            own_addr_type: self.own_address_type as u8,
            filter_policy: self.filter as u8,
            interval: self.interval,
            window: self.window,
        }
    }
}

/// Duplicate advertisement filtering while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DuplicatesFilter {
    /// Report every advertisement.
    #[default]
    Disable,
    /// Report each advertiser once.
    Enable,
    /// Report each advertiser once per scan period.
    PeriodicReset,
}
