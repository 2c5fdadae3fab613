//! Test doubles shared by the unit tests.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ble::address::{Address, AddressType, PeerAddressType};
use crate::ble::events::{
    AdvertisingEndEvent, AdvertisingReportEvent, ConnectionCompleteEvent, ConnectionHandle,
    DisconnectionCompleteEvent, DisconnectionReason, GapEventHandler, LegacyConnectionParams,
    LegacyGapEventHandler, LegacyRole, ScanTimeoutEvent,
};
use crate::gatt::table::AttributeRecord;
use crate::radio::{
    ModuleAddressType, ModuleAdvertisingParams, ModuleCharacteristic, ModuleRole,
    ModuleScanParams, PrimaryService, RadioError, RadioModule, RadioNotifications, RadioResult,
};

/// Install a log subscriber once per test binary.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("esp32at_ble=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

/// Mutable state of a [`FakeRadio`].
#[derive(Default)]
pub(crate) struct FakeState {
    pub calls: Vec<String>,
    pub failing: HashSet<&'static str>,
    pub sink: Option<Arc<dyn RadioNotifications>>,
    pub role: ModuleRole,
    pub public_address: [u8; 6],
    pub address_selection: Option<(ModuleAddressType, Option<[u8; 6]>)>,
    pub device_name: String,
    pub scan_params: Option<ModuleScanParams>,
    pub adv_params: Option<ModuleAdvertisingParams>,
    pub adv_data: Vec<u8>,
    pub scan_response: Vec<u8>,
    pub services: Vec<PrimaryService>,
    pub characteristics: HashMap<u8, Vec<ModuleCharacteristic>>,
    pub read_data: Vec<u8>,
    pub written: Vec<(u8, u8, u8, Vec<u8>)>,
    pub tables: Vec<Vec<AttributeRecord>>,
    pub set_values: Vec<(u8, u16, Vec<u8>)>,
    pub notified: Vec<(u8, u16, Vec<u8>)>,
    pub on_discover_services: Option<Box<dyn Fn() + Send>>,
}

/// A radio module that records every command and answers from [`FakeState`].
#[derive(Default)]
pub(crate) struct FakeRadio {
    state: Mutex<FakeState>,
}

impl FakeRadio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every later `command` fail.
    pub fn fail(&self, command: &'static str) {
        self.state.lock().failing.insert(command);
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of `command`, whatever their arguments.
    pub fn count_calls(&self, command: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(command))
            .count()
    }

    /// The registered notification sink.
    pub fn sink(&self) -> Arc<dyn RadioNotifications> {
        self.state
            .lock()
            .sink
            .clone()
            .expect("no notification sink registered")
    }

    fn record(&self, state: &mut FakeState, command: &'static str, call: String) -> RadioResult<()> {
        state.calls.push(call);
        if state.failing.contains(command) {
            Err(RadioError::CommandFailed {
                command: command.to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn command(&self, command: &'static str) -> RadioResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, command, command.to_string())
    }
}

impl RadioModule for FakeRadio {
    fn register_notifications(&self, sink: Arc<dyn RadioNotifications>) {
        self.state.lock().sink = Some(sink);
    }

    fn process_oob(&self, _timeout_ms: u32, _all: bool) {
        self.state.lock().calls.push("process_oob".to_string());
    }

    fn version(&self) -> RadioResult<String> {
        self.command("version")?;
        Ok("fake".to_string())
    }

    fn set_role(&self, role: ModuleRole) -> RadioResult<()> {
        self.command("set_role")?;
        self.state.lock().role = role;
        Ok(())
    }

    fn role(&self) -> RadioResult<ModuleRole> {
        self.command("role")?;
        Ok(self.state.lock().role)
    }

    fn set_scan_params(&self, params: &ModuleScanParams) -> RadioResult<()> {
        self.command("set_scan_params")?;
        self.state.lock().scan_params = Some(*params);
        Ok(())
    }

    fn start_scan(&self) -> RadioResult<()> {
        self.command("start_scan")
    }

    fn stop_scan(&self) -> RadioResult<()> {
        self.command("stop_scan")
    }

    fn set_advertising_params(&self, params: &ModuleAdvertisingParams) -> RadioResult<()> {
        self.command("set_advertising_params")?;
        self.state.lock().adv_params = Some(*params);
        Ok(())
    }

    fn start_services(&self) -> RadioResult<()> {
        self.command("start_services")
    }

    fn set_advertising_data(&self, data: &[u8]) -> RadioResult<()> {
        self.command("set_advertising_data")?;
        self.state.lock().adv_data = data.to_vec();
        Ok(())
    }

    fn set_scan_response(&self, data: &[u8]) -> RadioResult<()> {
        self.command("set_scan_response")?;
        self.state.lock().scan_response = data.to_vec();
        Ok(())
    }

    fn start_advertising(&self) -> RadioResult<()> {
        self.command("start_advertising")
    }

    fn stop_advertising(&self) -> RadioResult<()> {
        self.command("stop_advertising")
    }

    fn address(&self) -> RadioResult<[u8; 6]> {
        self.command("address")?;
        Ok(self.state.lock().public_address)
    }

    fn set_address(&self, kind: ModuleAddressType, address: Option<[u8; 6]>) -> RadioResult<()> {
        self.command("set_address")?;
        self.state.lock().address_selection = Some((kind, address));
        Ok(())
    }

    fn set_device_name(&self, name: &str) -> RadioResult<()> {
        self.command("set_device_name")?;
        self.state.lock().device_name = name.to_string();
        Ok(())
    }

    fn device_name(&self) -> RadioResult<String> {
        self.command("device_name")?;
        Ok(self.state.lock().device_name.clone())
    }

    fn connect(&self, conn_index: u8, address: [u8; 6]) -> RadioResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, "connect", format!("connect {} {:02x?}", conn_index, address))
    }

    fn discover_services(&self, _conn_index: u8, max: usize) -> RadioResult<Vec<PrimaryService>> {
        self.command("discover_services")?;
        let hook = self.state.lock().on_discover_services.take();
        if let Some(hook) = hook {
            hook();
            self.state.lock().on_discover_services = Some(hook);
        }

        let state = self.state.lock();
        Ok(state.services.iter().take(max).cloned().collect())
    }

    fn discover_characteristics(
        &self,
        conn_index: u8,
        srv_index: u8,
        max: usize,
    ) -> RadioResult<Vec<ModuleCharacteristic>> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            "discover_characteristics",
            format!("discover_characteristics {} {}", conn_index, srv_index),
        )?;
        Ok(state
            .characteristics
            .get(&srv_index)
            .map(|list| list.iter().take(max).cloned().collect())
            .unwrap_or_default())
    }

    fn read_characteristic(
        &self,
        conn_index: u8,
        srv_index: u8,
        char_index: u8,
        buf: &mut [u8],
    ) -> RadioResult<usize> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            "read_characteristic",
            format!("read_characteristic {} {} {}", conn_index, srv_index, char_index),
        )?;
        let len = state.read_data.len().min(buf.len());
        buf[..len].copy_from_slice(&state.read_data[..len]);
        Ok(len)
    }

    fn write_characteristic(
        &self,
        conn_index: u8,
        srv_index: u8,
        char_index: u8,
        data: &[u8],
    ) -> RadioResult<()> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            "write_characteristic",
            format!("write_characteristic {} {} {}", conn_index, srv_index, char_index),
        )?;
        state
            .written
            .push((conn_index, srv_index, char_index, data.to_vec()));
        Ok(())
    }

    fn set_characteristic(&self, srv_index: u8, char_index: u16, data: &[u8]) -> RadioResult<()> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            "set_characteristic",
            format!("set_characteristic {} {}", srv_index, char_index),
        )?;
        state.set_values.push((srv_index, char_index, data.to_vec()));
        Ok(())
    }

    fn notify_characteristic(
        &self,
        srv_index: u8,
        char_index: u16,
        data: &[u8],
    ) -> RadioResult<()> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            "notify_characteristic",
            format!("notify_characteristic {} {}", srv_index, char_index),
        )?;
        state.notified.push((srv_index, char_index, data.to_vec()));
        Ok(())
    }

    fn set_service(&self, table: &[AttributeRecord]) -> RadioResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, "set_service", "set_service".to_string())?;
        state.tables.push(table.to_vec());
        Ok(())
    }
}

/// GAP handler that records everything it receives.
#[derive(Default)]
pub(crate) struct RecordingGapHandler {
    connections: Mutex<Vec<ConnectionCompleteEvent>>,
    disconnections: Mutex<Vec<DisconnectionReason>>,
    reports: Mutex<Vec<AdvertisingReportEvent>>,
    scan_timeouts: Mutex<usize>,
    advertising_ends: Mutex<Vec<AdvertisingEndEvent>>,
    legacy_connections: Mutex<Vec<(LegacyRole, Address, AddressType)>>,
    legacy_disconnections: Mutex<Vec<DisconnectionReason>>,
}

impl RecordingGapHandler {
    pub fn connections(&self) -> Vec<ConnectionCompleteEvent> {
        self.connections.lock().clone()
    }

    pub fn disconnections(&self) -> Vec<DisconnectionReason> {
        self.disconnections.lock().clone()
    }

    pub fn reports(&self) -> Vec<AdvertisingReportEvent> {
        self.reports.lock().clone()
    }

    pub fn scan_timeouts(&self) -> usize {
        *self.scan_timeouts.lock()
    }

    pub fn advertising_ends(&self) -> Vec<AdvertisingEndEvent> {
        self.advertising_ends.lock().clone()
    }

    pub fn legacy_connections(&self) -> Vec<(LegacyRole, Address, AddressType)> {
        self.legacy_connections.lock().clone()
    }

    pub fn legacy_disconnections(&self) -> Vec<DisconnectionReason> {
        self.legacy_disconnections.lock().clone()
    }
}

impl GapEventHandler for RecordingGapHandler {
    fn on_connection_complete(&self, event: &ConnectionCompleteEvent) {
        self.connections.lock().push(event.clone());
    }

    fn on_disconnection_complete(&self, event: &DisconnectionCompleteEvent) {
        self.disconnections.lock().push(event.reason);
    }

    fn on_advertising_report(&self, event: &AdvertisingReportEvent) {
        self.reports.lock().push(event.clone());
    }

    fn on_scan_timeout(&self, _event: &ScanTimeoutEvent) {
        *self.scan_timeouts.lock() += 1;
    }

    fn on_advertising_end(&self, event: &AdvertisingEndEvent) {
        self.advertising_ends.lock().push(*event);
    }
}

impl LegacyGapEventHandler for RecordingGapHandler {
    fn on_connection(
        &self,
        _handle: ConnectionHandle,
        role: LegacyRole,
        _peer_address_type: PeerAddressType,
        peer_address: &Address,
        own_address_type: AddressType,
        _own_address: &Address,
        _params: &LegacyConnectionParams,
    ) {
        self.legacy_connections
            .lock()
            .push((role, *peer_address, own_address_type));
    }

    fn on_disconnection(&self, _handle: ConnectionHandle, reason: DisconnectionReason) {
        self.legacy_disconnections.lock().push(reason);
    }
}
