//! The BLE instance: process-wide context and event dispatcher.
//!
//! A [`BleInstance`] owns the event queue and every component fed by it. It
//! is built once at startup and shared by reference; nothing in this crate
//! is reachable through globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::ble::address::ClockNoise;
use crate::ble::gap::{GapController, GapEvent};
use crate::config::BleConfig;
use crate::error::{Error, Result};
use crate::event::{BleEvent, EventHandler, EventQueue};
use crate::gatt::client::GattClient;
use crate::gatt::server::{GattServer, ServerEvent};
use crate::radio::{RadioModule, RadioNotifications, ScanReport, WritePacket};

const UNKNOWN_VERSION: &str = "unknown";

/// Turns driver notifications into queued events.
///
/// Every method only enqueues, so it is safe to call from the driver's
/// receive context.
pub struct NotificationRouter {
    queue: Arc<EventQueue>,
}

impl NotificationRouter {
    /// Create a router feeding `queue`.
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    fn post(&self, event: BleEvent) {
        if let Err(dropped) = self.queue.enqueue(event) {
            warn!("Dropped radio notification {:?}", dropped);
        }
    }
}

impl RadioNotifications for NotificationRouter {
    fn on_data_available(&self) {
        self.queue.signal();
    }

    fn on_connect(&self, conn_index: u8, remote_addr: [u8; 6]) {
        self.post(BleEvent::Gap(GapEvent::Connected {
            conn_index,
            remote_addr,
        }));
    }

    fn on_disconnect(&self, conn_index: u8) {
        self.post(BleEvent::Gap(GapEvent::Disconnected { conn_index }));
    }

    fn on_scan_report(&self, report: ScanReport) {
        self.post(BleEvent::Gap(GapEvent::AdvertisingReport(report)));
    }

    fn on_write(&self, packet: WritePacket) {
        self.post(BleEvent::Server(ServerEvent::DataWritten(packet)));
    }
}

/// The BLE instance.
pub struct BleInstance {
    config: BleConfig,
    radio: Arc<dyn RadioModule>,
    queue: Arc<EventQueue>,
    gap: GapController,
    server: GattServer,
    client: GattClient,
    initialized: AtomicBool,
}

impl BleInstance {
    /// Create an instance whose timers run on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuntimeUnavailable`] outside a tokio runtime.
    pub fn new(radio: Arc<dyn RadioModule>, config: BleConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::RuntimeUnavailable)?;
        Ok(Self::with_runtime(radio, config, runtime))
    }

    /// Create an instance whose timers run on `runtime`.
    pub fn with_runtime(radio: Arc<dyn RadioModule>, config: BleConfig, runtime: Handle) -> Self {
        let queue = Arc::new(EventQueue::new());
        radio.register_notifications(Arc::new(NotificationRouter::new(queue.clone())));

        let gap = GapController::new(
            radio.clone(),
            queue.clone(),
            runtime,
            &config,
            &mut ClockNoise,
        );
        let server = GattServer::new(radio.clone());
        let client = GattClient::new(radio.clone(), queue.clone(), &config);

        debug!("BLE instance created with {:?}", config);
        Self {
            config,
            radio,
            queue,
            gap,
            server,
            client,
            initialized: AtomicBool::new(false),
        }
    }

    /// Initialize the module in the configured role.
    ///
    /// `on_complete` receives the outcome before this call returns.
    pub fn init<F>(&self, on_complete: F) -> Result<()>
    where
        F: FnOnce(&Result<()>),
    {
        let result = self.radio.set_role(self.config.module_role).map_err(|e| {
            warn!("Failed to set module role: {}", e);
            Error::invalid_state("set role")
        });

        on_complete(&result);
        if result.is_ok() {
            self.initialized.store(true, Ordering::SeqCst);
            info!("BLE initialized as {:?}", self.config.module_role);
        }
        result
    }

    /// Check whether [`Self::init`] succeeded.
    pub fn has_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Shutting down is not supported.
    pub fn shutdown(&self) -> Result<()> {
        Err(Error::not_implemented("shutdown"))
    }

    /// Module firmware version, or `"unknown"`.
    pub fn version(&self) -> String {
        self.radio.version().unwrap_or_else(|e| {
            debug!("Version query failed: {}", e);
            UNKNOWN_VERSION.to_string()
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    /// The GAP controller.
    pub fn gap(&self) -> &GapController {
        &self.gap
    }

    /// The GATT server.
    pub fn gatt_server(&self) -> &GattServer {
        &self.server
    }

    /// The GATT client.
    pub fn gatt_client(&self) -> &GattClient {
        &self.client
    }

    /// The event queue.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Wake the dispatch thread.
    pub fn signal_events_to_process(&self) {
        self.queue.signal();
    }

    /// Inject an event.
    pub fn post_event(&self, event: BleEvent) -> Result<()> {
        self.queue.enqueue(event).map_err(|_| Error::NoMemory)
    }

    /// Poll the driver, then dispatch at most one event.
    ///
    /// Returns whether an event was dispatched. Never blocks beyond the
    /// driver poll timeout.
    pub fn process_events(&self) -> bool {
        self.radio
            .process_oob(self.config.poll_timeout_ms, self.config.poll_all);

        let Some(event) = self.queue.pop() else {
            return false;
        };

        trace!("Dispatching {:?}/{}", event.category(), event.id());
        match event {
            BleEvent::Gap(event) => self.gap.do_event(event),
            BleEvent::Server(event) => self.server.do_event(event),
            BleEvent::Client(request) => self.client.do_event(request),
        }
        true
    }

    /// Dispatch one event, then sleep until signalled if there was none.
    ///
    /// Must only be called from the dispatch thread.
    pub fn wait_for_event(&self) {
        let flag = self.queue.wait_flag();
        if !self.process_events() {
            flag.wait();
        }
    }
}
