//! Remote GATT client.
//!
//! Module commands block, so every client operation is queued as a
//! [`ClientRequest`] and carried out later on the dispatch thread. The only
//! failure reported to the caller directly is a full event queue.

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ble::events::ConnectionHandle;
use crate::ble::uuids::BleUuid;
use crate::callback::{CallbackHandle, CallbackRegistry};
use crate::config::BleConfig;
use crate::error::{Error, Result};
use crate::event::{BleEvent, EventHandler, EventQueue};
use crate::gatt::server::WriteOp;
use crate::gatt::types::AttributeHandle;
use crate::radio::{ModuleCharacteristic, PrimaryService, RadioModule};

/// Error code reported with a failed read or write.
pub const ATT_ERROR_UNLIKELY: u8 = 0xFF;

/// Property flags of a discovered characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscoveredProperties {
    /// Broadcast permitted.
    pub broadcast: bool,
    /// Read permitted.
    pub read: bool,
    /// Write without response permitted.
    pub write_without_response: bool,
    /// Write permitted.
    pub write: bool,
    /// Notify permitted.
    pub notify: bool,
    /// Indicate permitted.
    pub indicate: bool,
    /// Authenticated signed writes permitted.
    pub authenticated_signed_writes: bool,
}

impl DiscoveredProperties {
    /// Decode the raw property bitmask.
    pub fn from_bits(bits: u8) -> Self {
        let bit = |n: u8| bits & (1 << n) != 0;
        Self {
            broadcast: bit(0),
            read: bit(1),
            write_without_response: bit(2),
            write: bit(3),
            notify: bit(4),
            indicate: bit(5),
            authenticated_signed_writes: bit(6),
        }
    }
}

/// A service found on the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    /// Service UUID.
    pub uuid: BleUuid,
    /// First attribute handle of the service.
    pub start_handle: AttributeHandle,
    /// Last attribute handle of the service.
    pub end_handle: AttributeHandle,
}

/// A characteristic found on the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    /// Connection the characteristic was found on.
    pub connection_handle: ConnectionHandle,
    /// Characteristic UUID.
    pub uuid: BleUuid,
    /// Decoded properties.
    pub properties: DiscoveredProperties,
    /// Declaration handle (not reported by the module).
    pub declaration_handle: AttributeHandle,
    /// Value handle, `(service index << 8) | characteristic index`.
    pub value_handle: AttributeHandle,
    /// Last handle (not reported by the module).
    pub last_handle: AttributeHandle,
}

/// Result of a remote read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    /// Connection the read ran on.
    pub connection_handle: ConnectionHandle,
    /// Attribute that was read.
    pub handle: AttributeHandle,
    /// Bytes from the requested offset on; empty on failure.
    pub data: Bytes,
    /// Zero on success.
    pub error_code: u8,
}

impl ReadResponse {
    /// Check whether the read produced data.
    pub fn is_ok(&self) -> bool {
        self.error_code == 0
    }
}

/// Result of a remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    /// Connection the write ran on.
    pub connection_handle: ConnectionHandle,
    /// Attribute that was written.
    pub handle: AttributeHandle,
    /// Kind of write requested.
    pub op: WriteOp,
    /// Failure, if any.
    pub error: Option<Error>,
    /// Zero on success.
    pub error_code: u8,
}

/// Called with the matching service.
pub type ServiceCallback = Box<dyn FnMut(&DiscoveredService) + Send>;
/// Called with the matching characteristic.
pub type CharacteristicCallback = Box<dyn FnMut(&DiscoveredCharacteristic) + Send>;
/// Called when a discovery ends, whatever its outcome.
pub type TerminationCallback = Arc<dyn Fn(ConnectionHandle) + Send + Sync>;

type ReadCallback = dyn Fn(&ReadResponse) + Send + Sync;
type WriteCallback = dyn Fn(&WriteResponse) + Send + Sync;

/// A queued service discovery.
pub struct DiscoveryRequest {
    connection_handle: ConnectionHandle,
    service_callback: Option<ServiceCallback>,
    characteristic_callback: Option<CharacteristicCallback>,
    service_uuid: BleUuid,
    characteristic_uuid: BleUuid,
}

impl std::fmt::Debug for DiscoveryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryRequest")
            .field("connection_handle", &self.connection_handle)
            .field("service_uuid", &self.service_uuid)
            .field("characteristic_uuid", &self.characteristic_uuid)
            .finish_non_exhaustive()
    }
}

/// GATT client requests processed on the dispatch thread.
#[derive(Debug)]
pub enum ClientRequest {
    /// Discover one service and one of its characteristics.
    LaunchServiceDiscovery(DiscoveryRequest),
    /// Read a remote attribute.
    Read {
        /// Connection to read on.
        connection_handle: ConnectionHandle,
        /// Attribute to read.
        attribute_handle: AttributeHandle,
        /// Offset into the value.
        offset: u16,
    },
    /// Write a remote attribute.
    Write {
        /// Kind of write.
        op: WriteOp,
        /// Connection to write on.
        connection_handle: ConnectionHandle,
        /// Attribute to write.
        attribute_handle: AttributeHandle,
        /// Value to write.
        value: Bytes,
    },
}

impl ClientRequest {
    /// Event identifier within the client category.
    pub fn id(&self) -> u32 {
        match self {
            Self::LaunchServiceDiscovery(_) => 1,
            Self::Read { .. } => 2,
            Self::Write { .. } => 3,
        }
    }
}

fn split_handle(handle: AttributeHandle) -> (u8, u8) {
    let [srv_index, char_index] = handle.to_be_bytes();
    (srv_index, char_index)
}

/// Module connection index of a connection handle.
fn module_connection(handle: ConnectionHandle) -> Option<u8> {
    u8::try_from(handle).ok()
}

/// GATT client proxy.
pub struct GattClient {
    radio: Arc<dyn RadioModule>,
    queue: Arc<EventQueue>,
    max_services: usize,
    max_characteristics: usize,
    read_buffer_size: usize,
    discovery_active: AtomicBool,
    termination_callback: RwLock<Option<TerminationCallback>>,
    read_callbacks: CallbackRegistry<ReadCallback>,
    write_callbacks: CallbackRegistry<WriteCallback>,
}

impl GattClient {
    /// Create a client posting its requests to `queue`.
    pub fn new(radio: Arc<dyn RadioModule>, queue: Arc<EventQueue>, config: &BleConfig) -> Self {
        Self {
            radio,
            queue,
            max_services: config.max_discovered_services,
            max_characteristics: config.max_discovered_characteristics,
            read_buffer_size: config.read_buffer_size,
            discovery_active: AtomicBool::new(false),
            termination_callback: RwLock::new(None),
            read_callbacks: CallbackRegistry::new(),
            write_callbacks: CallbackRegistry::new(),
        }
    }

    fn post(&self, request: ClientRequest) -> Result<()> {
        self.queue
            .enqueue(BleEvent::Client(request))
            .map_err(|rejected| {
                warn!("Dropping client request {:?}", rejected);
                Error::NoMemory
            })
    }

    /// Queue a discovery of `service_uuid` and, within it, `characteristic_uuid`.
    ///
    /// At most one service and one characteristic are reported.
    pub fn launch_service_discovery(
        &self,
        connection_handle: ConnectionHandle,
        service_callback: Option<ServiceCallback>,
        characteristic_callback: Option<CharacteristicCallback>,
        service_uuid: BleUuid,
        characteristic_uuid: BleUuid,
    ) -> Result<()> {
        self.post(ClientRequest::LaunchServiceDiscovery(DiscoveryRequest {
            connection_handle,
            service_callback,
            characteristic_callback,
            service_uuid,
            characteristic_uuid,
        }))
    }

    /// Check whether a discovery is running.
    pub fn is_service_discovery_active(&self) -> bool {
        self.discovery_active.load(Ordering::SeqCst)
    }

    /// Ask a running discovery to stop before examining the next service.
    pub fn terminate_service_discovery(&self) {
        self.discovery_active.store(false, Ordering::SeqCst);
    }

    /// Set the callback run at the end of every discovery.
    pub fn on_service_discovery_termination<F>(&self, callback: F)
    where
        F: Fn(ConnectionHandle) + Send + Sync + 'static,
    {
        *self.termination_callback.write() = Some(Arc::new(callback));
    }

    /// Queue a read of a remote attribute.
    pub fn read(
        &self,
        connection_handle: ConnectionHandle,
        attribute_handle: AttributeHandle,
        offset: u16,
    ) -> Result<()> {
        self.post(ClientRequest::Read {
            connection_handle,
            attribute_handle,
            offset,
        })
    }

    /// Queue a write of a remote attribute.
    pub fn write(
        &self,
        op: WriteOp,
        connection_handle: ConnectionHandle,
        attribute_handle: AttributeHandle,
        value: impl Into<Bytes>,
    ) -> Result<()> {
        self.post(ClientRequest::Write {
            op,
            connection_handle,
            attribute_handle,
            value: value.into(),
        })
    }

    /// Register a callback for read results.
    pub fn on_data_read<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&ReadResponse) + Send + Sync + 'static,
    {
        self.read_callbacks.register(Arc::new(callback))
    }

    /// Register a callback for write results.
    pub fn on_data_written<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&WriteResponse) + Send + Sync + 'static,
    {
        self.write_callbacks.register(Arc::new(callback))
    }

    fn run_discovery(&self, mut request: DiscoveryRequest) {
        self.discovery_active.store(true, Ordering::SeqCst);

        match module_connection(request.connection_handle) {
            Some(conn_index) => self.discover(&mut request, conn_index),
            None => warn!(
                "Service discovery on unknown connection {}",
                request.connection_handle
            ),
        }

        self.discovery_active.store(false, Ordering::SeqCst);
        let termination = self.termination_callback.read().clone();
        if let Some(callback) = termination {
            callback(request.connection_handle);
        }
    }

    fn discover(&self, request: &mut DiscoveryRequest, conn_index: u8) {
        let services = self
            .radio
            .discover_services(conn_index, self.max_services)
            .unwrap_or_else(|e| {
                warn!("Service discovery failed: {}", e);
                Vec::new()
            });
        debug!("Discovered {} services", services.len());

        for service in services.iter().take(self.max_services) {
            if !self.discovery_active.load(Ordering::SeqCst) {
                info!("Service discovery terminated");
                break;
            }
            if service.uuid != request.service_uuid {
                continue;
            }
            self.report_service(request, conn_index, service);
            break;
        }
    }

    fn report_service(&self, request: &mut DiscoveryRequest, conn_index: u8, service: &PrimaryService) {
        let characteristics: Vec<ModuleCharacteristic> = self
            .radio
            .discover_characteristics(conn_index, service.index, self.max_characteristics)
            .unwrap_or_else(|e| {
                warn!("Characteristic discovery failed: {}", e);
                Vec::new()
            })
            .into_iter()
            .take(self.max_characteristics)
            .collect();

        let base = AttributeHandle::from(service.index) << 8;
        if let Some(callback) = request.service_callback.as_mut() {
            let count = AttributeHandle::try_from(characteristics.len()).unwrap_or(AttributeHandle::MAX);
            callback(&DiscoveredService {
                uuid: service.uuid,
                start_handle: base + 1,
                end_handle: base.saturating_add(count),
            });
        }

        let Some(callback) = request.characteristic_callback.as_mut() else {
            return;
        };
        if let Some(found) = characteristics
            .iter()
            .find(|c| c.uuid == request.characteristic_uuid)
        {
            callback(&DiscoveredCharacteristic {
                connection_handle: request.connection_handle,
                uuid: found.uuid,
                properties: DiscoveredProperties::from_bits(found.properties),
                declaration_handle: 0,
                value_handle: base + AttributeHandle::from(found.index),
                last_handle: 0,
            });
        }
    }

    fn run_read(
        &self,
        connection_handle: ConnectionHandle,
        attribute_handle: AttributeHandle,
        offset: u16,
    ) {
        let (srv_index, char_index) = split_handle(attribute_handle);
        let mut buffer = vec![0u8; self.read_buffer_size];

        let received = match module_connection(connection_handle) {
            Some(conn_index) => self
                .radio
                .read_characteristic(conn_index, srv_index, char_index, &mut buffer)
                .map(|n| n.min(buffer.len()))
                .unwrap_or_else(|e| {
                    warn!("Read of {:#06x} failed: {}", attribute_handle, e);
                    0
                }),
            None => {
                warn!("Read on unknown connection {}", connection_handle);
                0
            }
        };

        let offset = usize::from(offset);
        let response = if received > 0 && offset < received {
            ReadResponse {
                connection_handle,
                handle: attribute_handle,
                data: Bytes::copy_from_slice(&buffer[offset..received]),
                error_code: 0,
            }
        } else {
            debug!(
                "Read of {:#06x} produced no data ({} bytes, offset {})",
                attribute_handle, received, offset
            );
            ReadResponse {
                connection_handle,
                handle: attribute_handle,
                data: Bytes::new(),
                error_code: ATT_ERROR_UNLIKELY,
            }
        };

        for callback in self.read_callbacks.snapshot() {
            callback(&response);
        }
    }

    fn run_write(
        &self,
        op: WriteOp,
        connection_handle: ConnectionHandle,
        attribute_handle: AttributeHandle,
        value: Bytes,
    ) {
        let (srv_index, char_index) = split_handle(attribute_handle);

        let result = match module_connection(connection_handle) {
            Some(conn_index) => self
                .radio
                .write_characteristic(conn_index, srv_index, char_index, &value)
                .map_err(|e| {
                    warn!("Write of {:#06x} failed: {}", attribute_handle, e);
                    Error::invalid_state("write characteristic")
                }),
            None => Err(Error::out_of_range("connection handle", connection_handle)),
        };
        let (error, error_code) = match result {
            Ok(()) => (None, 0),
            Err(e) => (Some(e), ATT_ERROR_UNLIKELY),
        };

        let response = WriteResponse {
            connection_handle,
            handle: attribute_handle,
            op,
            error,
            error_code,
        };
        for callback in self.write_callbacks.snapshot() {
            callback(&response);
        }
    }
}

impl EventHandler for GattClient {
    type Event = ClientRequest;

    fn do_event(&self, request: ClientRequest) {
        match request {
            ClientRequest::LaunchServiceDiscovery(request) => self.run_discovery(request),
            ClientRequest::Read {
                connection_handle,
                attribute_handle,
                offset,
            } => self.run_read(connection_handle, attribute_handle, offset),
            ClientRequest::Write {
                op,
                connection_handle,
                attribute_handle,
                value,
            } => self.run_write(op, connection_handle, attribute_handle, value),
        }
    }
}
