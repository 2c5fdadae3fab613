//! GAP controller.
//!
//! Owns the local address, the scan and advertising sessions with their
//! timeout timers, and the single connection state. Radio notifications and
//! timer expirations reach it as [`GapEvent`]s on the dispatch thread; host
//! calls arrive directly and issue blocking module commands.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::ble::address::{
    generate_static_random, Address, AddressType, NoiseSource, OwnAddressType, PeerAddressType,
};
use crate::ble::events::{
    AdvertisingEndEvent, AdvertisingHandle, AdvertisingReportEvent, ConnectionHandle,
    ConnectionRole, DisconnectionReason, GapEventHandler, LegacyGapEventHandler, LinkEvent, Phy,
    ScanTimeoutEvent, LEGACY_ADV_IND_EVENT_TYPE, SID_NOT_AVAILABLE, TX_POWER_NOT_AVAILABLE,
};
use crate::ble::params::{
    AdvertisingParameters, DuplicatesFilter, ScanParameters, ADV_INTERVAL_MAX, ADV_INTERVAL_MIN,
    ADV_INTERVAL_MIN_NONCONNECTABLE,
};
use crate::ble::timeout::Timeout;
use crate::config::BleConfig;
use crate::error::{Error, Result};
use crate::event::{BleEvent, EventHandler, EventQueue};
use crate::radio::{ModuleRole, RadioModule, ScanReport};

/// GAP events processed on the dispatch thread.
#[derive(Debug)]
pub enum GapEvent {
    /// The module reported a new link.
    Connected {
        /// Module connection index.
        conn_index: u8,
        /// Peer address, module order.
        remote_addr: [u8; 6],
    },
    /// The module reported a closed link.
    Disconnected {
        /// Module connection index.
        conn_index: u8,
    },
    /// The module reported an advertisement.
    AdvertisingReport(ScanReport),
    /// The scan duration timer fired.
    ScanTimeout {
        /// Scan session the timer was armed for.
        generation: u64,
    },
    /// The advertising duration timer fired.
    AdvertisingTimeout {
        /// Advertising session the timer was armed for.
        generation: u64,
    },
}

impl GapEvent {
    /// Event identifier within the GAP category.
    pub fn id(&self) -> u32 {
        match self {
            Self::Connected { .. } => 1,
            Self::Disconnected { .. } => 2,
            Self::AdvertisingReport(_) => 3,
            Self::ScanTimeout { .. } => 4,
            Self::AdvertisingTimeout { .. } => 5,
        }
    }
}

/// State of the single supported connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    /// Whether a link is up.
    pub connected: bool,
    /// Connection handle of the link.
    pub handle: ConnectionHandle,
    /// Local role on the link.
    pub role: ConnectionRole,
    /// Peer address, host order.
    pub peer_address: Address,
}

struct ScanSession {
    active: bool,
    generation: u64,
    timeout: Timeout,
}

struct AdvertisingSession {
    active: bool,
    handle: AdvertisingHandle,
    generation: u64,
    timeout: Timeout,
}

struct GapState {
    own_address_type: OwnAddressType,
    random_address: Address,
    scan: ScanSession,
    advertising: AdvertisingSession,
    connection: ConnectionState,
}

/// GAP role management on top of the radio module.
pub struct GapController {
    radio: Arc<dyn RadioModule>,
    queue: Arc<EventQueue>,
    state: Mutex<GapState>,
    event_handler: RwLock<Option<Arc<dyn GapEventHandler>>>,
    legacy_handler: RwLock<Option<Arc<dyn LegacyGapEventHandler>>>,
    extended_api: AtomicBool,
}

impl GapController {
    /// Create the controller and generate the static random address.
    pub fn new(
        radio: Arc<dyn RadioModule>,
        queue: Arc<EventQueue>,
        runtime: Handle,
        config: &BleConfig,
        noise: &mut dyn NoiseSource,
    ) -> Self {
        let random_address = generate_static_random(config.prefer_hardware_rng, noise);

        Self {
            radio,
            queue,
            state: Mutex::new(GapState {
                own_address_type: OwnAddressType::Random,
                random_address,
                scan: ScanSession {
                    active: false,
                    generation: 0,
                    timeout: Timeout::new(runtime.clone()),
                },
                advertising: AdvertisingSession {
                    active: false,
                    handle: 0,
                    generation: 0,
                    timeout: Timeout::new(runtime),
                },
                connection: ConnectionState::default(),
            }),
            event_handler: RwLock::new(None),
            legacy_handler: RwLock::new(None),
            extended_api: AtomicBool::new(false),
        }
    }

    /// Install the structured event handler.
    pub fn set_event_handler(&self, handler: Arc<dyn GapEventHandler>) {
        *self.event_handler.write() = Some(handler);
    }

    /// Install the legacy connection callbacks.
    pub fn set_legacy_event_handler(&self, handler: Arc<dyn LegacyGapEventHandler>) {
        *self.legacy_handler.write() = Some(handler);
    }

    /// Check whether an extended (version two) API call has been made.
    pub fn uses_extended_api(&self) -> bool {
        self.extended_api.load(Ordering::SeqCst)
    }

    /// The local address and its type.
    ///
    /// The random static address is held locally; the public address is
    /// queried from the module.
    pub fn address(&self) -> Result<(AddressType, Address)> {
        let (own_type, random) = {
            let state = self.state.lock();
            (state.own_address_type, state.random_address)
        };

        if own_type == OwnAddressType::Public {
            let bytes = self.radio.address().map_err(|e| {
                warn!("Failed to read public address: {}", e);
                Error::invalid_state("get address")
            })?;
            Ok((AddressType::Public, Address::from_module_order(bytes)))
        } else {
            Ok((AddressType::RandomStatic, random))
        }
    }

    /// The generated (or replaced) static random address.
    pub fn random_static_address(&self) -> Address {
        self.state.lock().random_address
    }

    /// Replace the static random address used when advertising with a random own address.
    pub fn set_random_static_address(&self, address: Address) -> Result<()> {
        if !address.is_static_random() {
            return Err(Error::invalid_param("address", address));
        }
        self.state.lock().random_address = address;
        debug!("Static random address set to {}", address);
        Ok(())
    }

    /// Smallest connectable advertising interval.
    pub fn min_advertising_interval(&self) -> u16 {
        ADV_INTERVAL_MIN
    }

    /// Smallest non-connectable advertising interval.
    pub fn min_non_connectable_advertising_interval(&self) -> u16 {
        ADV_INTERVAL_MIN_NONCONNECTABLE
    }

    /// Largest advertising interval.
    pub fn max_advertising_interval(&self) -> u16 {
        ADV_INTERVAL_MAX
    }

    /// Upload scan parameters.
    pub fn set_scan_parameters(&self, params: &ScanParameters) -> Result<()> {
        self.extended_api.store(true, Ordering::SeqCst);
        self.radio.set_scan_params(&params.to_module()).map_err(|e| {
            warn!("Failed to set scan parameters: {}", e);
            Error::invalid_state("set scan parameters")
        })
    }

    /// Start scanning.
    ///
    /// A non-zero `duration` arms a one-shot timer that stops the scan and
    /// raises a scan timeout. Filtering and period are handled by the module
    /// configuration and only logged here.
    pub fn start_scan(
        &self,
        duration: Duration,
        filtering: DuplicatesFilter,
        period: Duration,
    ) -> Result<()> {
        self.extended_api.store(true, Ordering::SeqCst);

        self.radio.start_scan().map_err(|e| {
            warn!("Failed to start scan: {}", e);
            Error::invalid_state("start scan")
        })?;

        let mut state = self.state.lock();
        let scan = &mut state.scan;
        scan.active = true;
        scan.generation += 1;

        if duration.is_zero() {
            scan.timeout.detach();
        } else {
            let queue = self.queue.clone();
            let generation = scan.generation;
            scan.timeout.attach(duration, move || {
                if queue
                    .enqueue(BleEvent::Gap(GapEvent::ScanTimeout { generation }))
                    .is_err()
                {
                    warn!("Dropped scan timeout, event queue full");
                }
            });
        }

        info!(
            "Scan started (duration {:?}, filtering {:?}, period {:?})",
            duration, filtering, period
        );
        Ok(())
    }

    /// Stop scanning.
    ///
    /// The timer is cancelled and the session cleared before the module is
    /// told to stop, so the session is inactive even if the command fails.
    pub fn stop_scan(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.scan.active = false;
            state.scan.generation += 1;
            state.scan.timeout.detach();
        }

        info!("Scan stopped");
        self.radio.stop_scan().map_err(|e| {
            warn!("Failed to stop scan: {}", e);
            Error::invalid_state("stop scan")
        })
    }

    /// Check whether a scan session is active.
    pub fn is_scanning(&self) -> bool {
        self.state.lock().scan.active
    }

    /// Validate and upload advertising parameters, then start services.
    pub fn set_advertising_parameters(
        &self,
        handle: AdvertisingHandle,
        params: &AdvertisingParameters,
    ) -> Result<()> {
        let random_address = self.state.lock().random_address;
        let (module_params, own) = params.to_module(&random_address)?;

        self.state.lock().own_address_type = params.own_address_type;

        self.radio.set_address(own.kind, own.address).map_err(|e| {
            warn!("Failed to select own address: {}", e);
            Error::invalid_state("set address")
        })?;
        self.radio
            .set_advertising_params(&module_params)
            .map_err(|e| {
                warn!("Failed to set advertising parameters: {}", e);
                Error::invalid_state("set advertising parameters")
            })?;
        self.radio.start_services().map_err(|e| {
            warn!("Failed to start services: {}", e);
            Error::invalid_state("start services")
        })?;

        debug!("Advertising parameters applied to set {}", handle);
        Ok(())
    }

    /// Set the raw advertising payload.
    pub fn set_advertising_payload(&self, handle: AdvertisingHandle, payload: &[u8]) -> Result<()> {
        trace!("Advertising payload for set {}: {} bytes", handle, payload.len());
        self.radio.set_advertising_data(payload).map_err(|e| {
            warn!("Failed to set advertising payload: {}", e);
            Error::invalid_state("set advertising payload")
        })
    }

    /// Set the raw scan response payload.
    pub fn set_advertising_scan_response(
        &self,
        handle: AdvertisingHandle,
        response: &[u8],
    ) -> Result<()> {
        trace!("Scan response for set {}: {} bytes", handle, response.len());
        self.radio.set_scan_response(response).map_err(|e| {
            warn!("Failed to set scan response: {}", e);
            Error::invalid_state("set scan response")
        })
    }

    /// Start advertising.
    ///
    /// A non-zero `max_duration` arms a one-shot timer that stops advertising
    /// and raises an advertising end event. `max_events` is not supported by
    /// the module and only logged.
    pub fn start_advertising(
        &self,
        handle: AdvertisingHandle,
        max_duration: Duration,
        max_events: u8,
    ) -> Result<()> {
        self.radio.start_advertising().map_err(|e| {
            warn!("Failed to start advertising: {}", e);
            Error::invalid_state("start advertising")
        })?;

        let mut state = self.state.lock();
        let advertising = &mut state.advertising;
        advertising.active = true;
        advertising.handle = handle;
        advertising.generation += 1;

        if max_duration.is_zero() {
            advertising.timeout.detach();
        } else {
            let queue = self.queue.clone();
            let generation = advertising.generation;
            advertising.timeout.attach(max_duration, move || {
                if queue
                    .enqueue(BleEvent::Gap(GapEvent::AdvertisingTimeout { generation }))
                    .is_err()
                {
                    warn!("Dropped advertising timeout, event queue full");
                }
            });
        }

        info!(
            "Advertising set {} started (duration {:?}, max events {})",
            handle, max_duration, max_events
        );
        Ok(())
    }

    /// Stop advertising.
    pub fn stop_advertising(&self, handle: AdvertisingHandle) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.advertising.active = false;
            state.advertising.generation += 1;
            state.advertising.timeout.detach();
        }

        info!("Advertising set {} stopped", handle);
        self.radio.stop_advertising().map_err(|e| {
            warn!("Failed to stop advertising: {}", e);
            Error::invalid_state("stop advertising")
        })
    }

    /// Check whether the given advertising set is active.
    pub fn is_advertising_active(&self, handle: AdvertisingHandle) -> bool {
        let state = self.state.lock();
        state.advertising.active && state.advertising.handle == handle
    }

    /// Initiate a connection to a peer.
    pub fn connect(&self, peer_address_type: PeerAddressType, peer_address: &Address) -> Result<()> {
        debug!("Connecting to {} ({:?})", peer_address, peer_address_type);
        self.radio
            .connect(0, peer_address.to_module_order())
            .map_err(|e| {
                warn!("Failed to connect to {}: {}", peer_address, e);
                Error::invalid_state("connect")
            })
    }

    /// Disconnection is not supported by the module command set.
    pub fn disconnect(
        &self,
        _handle: ConnectionHandle,
        _reason: DisconnectionReason,
    ) -> Result<()> {
        Err(Error::not_implemented("disconnect"))
    }

    /// Legacy advertising data setter, superseded by [`Self::set_advertising_payload`].
    pub fn set_advertising_data_legacy(&self, _data: &[u8], _scan_response: &[u8]) -> Result<()> {
        Err(Error::not_implemented("legacy set advertising data"))
    }

    /// Legacy advertising start, superseded by [`Self::start_advertising`].
    pub fn start_advertising_legacy(&self, _params: &AdvertisingParameters) -> Result<()> {
        Err(Error::not_implemented("legacy start advertising"))
    }

    /// Set the GAP device name.
    pub fn set_device_name(&self, name: &str) -> Result<()> {
        self.radio.set_device_name(name).map_err(|e| {
            warn!("Failed to set device name: {}", e);
            Error::out_of_range("device_name", name)
        })
    }

    /// Copy the GAP device name into `buffer`, returning its length.
    pub fn device_name(&self, buffer: &mut [u8]) -> Result<usize> {
        let name = self.radio.device_name().map_err(|e| {
            warn!("Failed to read device name: {}", e);
            Error::out_of_range("device_name", "unavailable")
        })?;

        let bytes = name.as_bytes();
        if bytes.len() > buffer.len() {
            return Err(Error::out_of_range("length", buffer.len()));
        }
        buffer[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Snapshot of the connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    fn handle_connect(&self, conn_index: u8, remote_addr: [u8; 6]) {
        let role = match self.radio.role() {
            Ok(ModuleRole::Client) => ConnectionRole::Central,
            Ok(ModuleRole::Server) => ConnectionRole::Peripheral,
            Err(e) => {
                warn!("Failed to read module role: {}", e);
                ConnectionRole::Peripheral
            }
        };
        let peer_address = Address::from_module_order(remote_addr);
        let handle = ConnectionHandle::from(conn_index);

        self.state.lock().connection = ConnectionState {
            connected: true,
            handle,
            role,
            peer_address,
        };
        info!("Connected to {} as {:?}", peer_address, role);

        let (own_address_type, own_address) = self.address().unwrap_or_else(|e| {
            warn!("Own address unavailable for connection event: {}", e);
            (AddressType::Public, Address::default())
        });

        self.deliver_link_event(LinkEvent::Connected {
            handle,
            role,
            peer_address,
            own_address_type,
            own_address,
        });
    }

    fn handle_disconnect(&self, conn_index: u8) {
        self.state.lock().connection.connected = false;
        info!("Disconnected (connection {})", conn_index);

        self.deliver_link_event(LinkEvent::Disconnected {
            handle: ConnectionHandle::from(conn_index),
            reason: DisconnectionReason::RemoteUserTerminatedConnection,
        });
    }

    fn deliver_link_event(&self, event: LinkEvent) {
        if let Some(handler) = self.event_handler.read().clone() {
            event.deliver_structured(handler.as_ref());
        }
        if let Some(handler) = self.legacy_handler.read().clone() {
            event.deliver_legacy(handler.as_ref());
        }
    }

    fn handle_scan_report(&self, report: ScanReport) {
        if !self.state.lock().scan.active {
            trace!("Ignoring advertising report, no scan active");
            return;
        }

        let Some(handler) = self.event_handler.read().clone() else {
            return;
        };

        handler.on_advertising_report(&AdvertisingReportEvent {
            event_type: LEGACY_ADV_IND_EVENT_TYPE,
            peer_address_type: PeerAddressType::from_raw(report.addr_type),
            peer_address: Address::from_module_order(report.addr),
            primary_phy: Phy::Le1M,
            secondary_phy: Phy::None,
            sid: SID_NOT_AVAILABLE,
            tx_power: TX_POWER_NOT_AVAILABLE,
            rssi: report.rssi,
            periodic_interval: 0,
            direct_address_type: PeerAddressType::Anonymous,
            direct_address: Address::default(),
            payload: report.adv_data,
        });
    }

    fn handle_scan_timeout(&self, generation: u64) {
        {
            let state = self.state.lock();
            if !state.scan.active || state.scan.generation != generation {
                trace!("Ignoring stale scan timeout");
                return;
            }
        }

        if let Err(e) = self.stop_scan() {
            warn!("Stopping scan on timeout failed: {}", e);
        }
        info!("Scan timed out");

        if let Some(handler) = self.event_handler.read().clone() {
            handler.on_scan_timeout(&ScanTimeoutEvent);
        }
    }

    fn handle_advertising_timeout(&self, generation: u64) {
        let (adv_handle, connected) = {
            let mut state = self.state.lock();
            if !state.advertising.active || state.advertising.generation != generation {
                trace!("Ignoring stale advertising timeout");
                return;
            }
            state.advertising.active = false;
            (state.advertising.handle, state.connection.connected)
        };

        if let Err(e) = self.radio.stop_advertising() {
            warn!("Stopping advertising on timeout failed: {}", e);
        }
        info!("Advertising set {} timed out", adv_handle);

        if let Some(handler) = self.event_handler.read().clone() {
            handler.on_advertising_end(&AdvertisingEndEvent {
                adv_handle,
                connection_handle: 0,
                completed_events: 0,
                connected,
            });
        }
    }
}

impl EventHandler for GapController {
    type Event = GapEvent;

    fn do_event(&self, event: GapEvent) {
        match event {
            GapEvent::Connected {
                conn_index,
                remote_addr,
            } => self.handle_connect(conn_index, remote_addr),
            GapEvent::Disconnected { conn_index } => self.handle_disconnect(conn_index),
            GapEvent::AdvertisingReport(report) => self.handle_scan_report(report),
            GapEvent::ScanTimeout { generation } => self.handle_scan_timeout(generation),
            GapEvent::AdvertisingTimeout { generation } => {
                self.handle_advertising_timeout(generation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::events::LegacyRole;
    use crate::radio::{MockRadioModule, ModuleAddressType, RadioError};
    use crate::testing::{FakeRadio, RecordingGapHandler};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn controller(radio: Arc<dyn RadioModule>) -> (GapController, Arc<EventQueue>) {
        let queue = Arc::new(EventQueue::new());
        let config = BleConfig::default().with_hardware_rng(false);
        let mut noise = || 0x5A5Au16;
        let gap = GapController::new(radio, queue.clone(), Handle::current(), &config, &mut noise);
        (gap, queue)
    }

    fn drain(gap: &GapController, queue: &EventQueue) -> usize {
        let mut count = 0;
        while let Some(event) = queue.pop() {
            match event {
                BleEvent::Gap(event) => gap.do_event(event),
                other => panic!("unexpected event {:?}", other),
            }
            count += 1;
        }
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_times_out_once() {
        let radio = FakeRadio::new();
        let (gap, queue) = controller(radio.clone());
        let handler = Arc::new(RecordingGapHandler::default());
        gap.set_event_handler(handler.clone());

        gap.start_scan(
            Duration::from_millis(2000),
            DuplicatesFilter::Disable,
            Duration::ZERO,
        )
        .unwrap();
        assert!(gap.is_scanning());
        assert!(gap.uses_extended_api());

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(drain(&gap, &queue), 0);
        assert!(gap.is_scanning());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(drain(&gap, &queue), 1);
        assert!(!gap.is_scanning());
        assert_eq!(handler.scan_timeouts(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        drain(&gap, &queue);
        assert_eq!(handler.scan_timeouts(), 1);
        assert_eq!(radio.count_calls("stop_scan"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_scan_never_times_out() {
        let radio = FakeRadio::new();
        let (gap, queue) = controller(radio);
        gap.start_scan(Duration::ZERO, DuplicatesFilter::Enable, Duration::ZERO)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(drain(&gap, &queue), 0);
        assert!(gap.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_timeout_suppresses_event() {
        let radio = FakeRadio::new();
        let (gap, queue) = controller(radio);
        let handler = Arc::new(RecordingGapHandler::default());
        gap.set_event_handler(handler.clone());

        gap.start_scan(Duration::from_millis(500), DuplicatesFilter::Disable, Duration::ZERO)
            .unwrap();
        gap.stop_scan().unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        drain(&gap, &queue);
        assert_eq!(handler.scan_timeouts(), 0);
    }

    #[tokio::test]
    async fn test_stop_scan_clears_state_even_on_failure() {
        let radio = FakeRadio::new();
        radio.fail("stop_scan");
        let (gap, _queue) = controller(radio);

        gap.start_scan(Duration::from_secs(5), DuplicatesFilter::Disable, Duration::ZERO)
            .unwrap();
        let result = gap.stop_scan();

        assert!(matches!(result, Err(Error::InvalidState { .. })));
        assert!(!gap.is_scanning());
    }

    #[tokio::test]
    async fn test_start_scan_failure_leaves_scan_inactive() {
        let radio = FakeRadio::new();
        radio.fail("start_scan");
        let (gap, _queue) = controller(radio);

        assert!(gap
            .start_scan(Duration::ZERO, DuplicatesFilter::Disable, Duration::ZERO)
            .is_err());
        assert!(!gap.is_scanning());
    }

    #[tokio::test]
    async fn test_scan_report_ignored_without_active_scan() {
        let radio = FakeRadio::new();
        let (gap, _queue) = controller(radio);
        let handler = Arc::new(RecordingGapHandler::default());
        gap.set_event_handler(handler.clone());

        let report = ScanReport {
            addr: [6, 5, 4, 3, 2, 1],
            addr_type: 1,
            rssi: -60,
            adv_data: Bytes::from_static(&[0x02, 0x01, 0x06]),
        };

        gap.do_event(GapEvent::AdvertisingReport(report.clone()));
        assert!(handler.reports().is_empty());

        gap.start_scan(Duration::ZERO, DuplicatesFilter::Disable, Duration::ZERO)
            .unwrap();
        gap.do_event(GapEvent::AdvertisingReport(report));

        let reports = handler.reports();
        assert_eq!(reports.len(), 1);
        let accepted = &reports[0];
        assert_eq!(accepted.peer_address, Address::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(accepted.peer_address_type, PeerAddressType::Random);
        assert_eq!(accepted.secondary_phy, Phy::None);
        assert_eq!(accepted.sid, SID_NOT_AVAILABLE);
        assert_eq!(accepted.payload, Bytes::from_static(&[0x02, 0x01, 0x06]));

        gap.stop_scan().unwrap();
        gap.do_event(GapEvent::AdvertisingReport(ScanReport {
            addr: [0; 6],
            addr_type: 0,
            rssi: -70,
            adv_data: Bytes::new(),
        }));
        assert_eq!(handler.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_emits_structured_and_legacy_events() {
        let radio = FakeRadio::new();
        radio.with_state(|s| s.role = ModuleRole::Client);
        let (gap, _queue) = controller(radio);
        let handler = Arc::new(RecordingGapHandler::default());
        gap.set_event_handler(handler.clone());
        gap.set_legacy_event_handler(handler.clone());

        gap.do_event(GapEvent::Connected {
            conn_index: 0,
            remote_addr: [0x66, 0x55, 0x44, 0x33, 0x22, 0x11],
        });

        let connections = handler.connections();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].own_role, ConnectionRole::Central);
        assert_eq!(
            connections[0].peer_address,
            Address::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
        );

        let legacy = handler.legacy_connections();
        assert_eq!(legacy.len(), 1);
        assert_eq!(legacy[0].0, LegacyRole::Central);
        assert_eq!(legacy[0].1, connections[0].peer_address);
        assert_eq!(legacy[0].2, AddressType::RandomStatic);

        let state = gap.connection_state();
        assert!(state.connected);
        assert_eq!(state.role, ConnectionRole::Central);

        gap.do_event(GapEvent::Disconnected { conn_index: 0 });
        assert!(!gap.connection_state().connected);
        assert_eq!(
            handler.disconnections(),
            vec![DisconnectionReason::RemoteUserTerminatedConnection]
        );
        assert_eq!(
            handler.legacy_disconnections(),
            vec![DisconnectionReason::RemoteUserTerminatedConnection]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_advertising_timeout_reports_connection_state() {
        let radio = FakeRadio::new();
        let (gap, queue) = controller(radio.clone());
        let handler = Arc::new(RecordingGapHandler::default());
        gap.set_event_handler(handler.clone());

        gap.start_advertising(3, Duration::from_millis(1000), 0).unwrap();
        assert!(gap.is_advertising_active(3));
        gap.do_event(GapEvent::Connected {
            conn_index: 0,
            remote_addr: [1, 2, 3, 4, 5, 6],
        });

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(drain(&gap, &queue), 1);

        let ends = handler.advertising_ends();
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].adv_handle, 3);
        assert!(ends[0].connected);
        assert!(!gap.is_advertising_active(3));
        assert_eq!(radio.count_calls("stop_advertising"), 1);
    }

    #[tokio::test]
    async fn test_random_address_round_trip() {
        let radio = FakeRadio::new();
        let (gap, _queue) = controller(radio);

        let (kind, generated) = gap.address().unwrap();
        assert_eq!(kind, AddressType::RandomStatic);
        assert!(generated.is_static_random());

        let address = Address::new([0xC5, 0x10, 0x20, 0x30, 0x40, 0x50]);
        gap.set_random_static_address(address).unwrap();
        assert_eq!(gap.address().unwrap(), (AddressType::RandomStatic, address));

        assert!(gap
            .set_random_static_address(Address::new([0x05, 0, 0, 0, 0, 0]))
            .is_err());
    }

    #[tokio::test]
    async fn test_public_address_round_trip() {
        let radio = FakeRadio::new();
        radio.with_state(|s| s.public_address = [0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        let (gap, _queue) = controller(radio.clone());

        let params = AdvertisingParameters {
            own_address_type: OwnAddressType::Public,
            ..Default::default()
        };
        gap.set_advertising_parameters(0, &params).unwrap();

        let (kind, address) = gap.address().unwrap();
        assert_eq!(kind, AddressType::Public);
        assert_eq!(address, Address::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(address.to_module_order(), [0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(
            radio.with_state(|s| s.address_selection),
            Some((ModuleAddressType::Public, None))
        );
    }

    #[tokio::test]
    async fn test_invalid_advertising_parameters_touch_nothing() {
        let radio = FakeRadio::new();
        let (gap, _queue) = controller(radio.clone());

        let params = AdvertisingParameters {
            min_interval: 0x0001,
            ..Default::default()
        };
        assert!(matches!(
            gap.set_advertising_parameters(0, &params),
            Err(Error::InvalidParam { .. })
        ));
        assert!(radio.calls().is_empty());
    }

    #[tokio::test]
    async fn test_device_name() {
        let radio = FakeRadio::new();
        let (gap, _queue) = controller(radio);

        gap.set_device_name("esp32-ble").unwrap();
        let mut buffer = [0u8; 32];
        let len = gap.device_name(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], b"esp32-ble");

        let mut small = [0u8; 4];
        assert!(matches!(
            gap.device_name(&mut small),
            Err(Error::ParamOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_legacy_entry_points_not_implemented() {
        let radio = FakeRadio::new();
        let (gap, _queue) = controller(radio);

        assert!(matches!(
            gap.set_advertising_data_legacy(&[], &[]),
            Err(Error::NotImplemented { .. })
        ));
        assert!(matches!(
            gap.start_advertising_legacy(&AdvertisingParameters::default()),
            Err(Error::NotImplemented { .. })
        ));
        assert!(matches!(
            gap.disconnect(0, DisconnectionReason::LocalHostTerminatedConnection),
            Err(Error::NotImplemented { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_reverses_address() {
        let mut mock = MockRadioModule::new();
        mock.expect_connect()
            .withf(|index, addr| *index == 0 && *addr == [6, 5, 4, 3, 2, 1])
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_connect()
            .returning(|_, _| Err(RadioError::Timeout));
        let (gap, _queue) = controller(Arc::new(mock));

        gap.connect(PeerAddressType::Public, &Address::new([1, 2, 3, 4, 5, 6]))
            .unwrap();
        assert!(matches!(
            gap.connect(PeerAddressType::Public, &Address::new([1, 2, 3, 4, 5, 6])),
            Err(Error::InvalidState { .. })
        ));
    }
}
