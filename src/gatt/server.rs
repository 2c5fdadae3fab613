//! Local GATT server.
//!
//! Characteristic values live in host-side mirrors indexed by a dense handle
//! assigned in registration order. Reads are served from the mirrors; writes
//! update the mirror first and are then pushed to the module.
//!
//! The module numbers services from 1 in upload order and characteristics
//! from 1 within each service. Every registered service keeps its handle
//! range so both directions resolve through the same slot.

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::ble::events::ConnectionHandle;
use crate::callback::{CallbackHandle, CallbackRegistry};
use crate::error::{Error, Result};
use crate::event::EventHandler;
use crate::gatt::table::{self, CharacteristicMirror};
use crate::gatt::types::{AttributeHandle, GattService};
use crate::radio::{RadioModule, WritePacket};

/// Handle range of one registered service.
#[derive(Debug, Clone, Copy)]
struct ServiceSlot {
    base: AttributeHandle,
    len: AttributeHandle,
}

#[derive(Default)]
struct ServerState {
    mirrors: Vec<CharacteristicMirror>,
    services: Vec<ServiceSlot>,
}

impl ServerState {
    /// Module `(service index, characteristic index)` of a handle.
    fn module_index(&self, handle: AttributeHandle) -> Option<(u8, u16)> {
        self.services
            .iter()
            .enumerate()
            .find(|(_, slot)| handle >= slot.base && handle - slot.base < slot.len)
            .and_then(|(position, slot)| {
                let srv_index = u8::try_from(position + 1).ok()?;
                Some((srv_index, handle - slot.base + 1))
            })
    }

    /// Handle addressed by a module `(service index, characteristic index)`.
    fn handle_of(&self, srv_index: u8, char_index: u16) -> Option<AttributeHandle> {
        let slot = self.services.get(usize::from(srv_index).checked_sub(1)?)?;
        let offset = char_index.checked_sub(1)?;
        (offset < slot.len).then_some(slot.base + offset)
    }
}

/// GATT server events processed on the dispatch thread.
#[derive(Debug)]
pub enum ServerEvent {
    /// A peer wrote to a local characteristic.
    DataWritten(WritePacket),
}

impl ServerEvent {
    /// Event identifier within the server category.
    pub fn id(&self) -> u32 {
        match self {
            Self::DataWritten(_) => 1,
        }
    }
}

/// Kind of write performed by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    /// Write request (acknowledged).
    WriteRequest,
    /// Write command (unacknowledged).
    WriteCommand,
}

/// A peer write to a local characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattWriteEvent {
    /// Connection the write arrived on.
    pub connection_handle: ConnectionHandle,
    /// Handle of the written characteristic.
    pub handle: AttributeHandle,
    /// Kind of write.
    pub op: WriteOp,
    /// Offset of the write.
    pub offset: u16,
    /// Written value, as stored in the mirror.
    pub data: Bytes,
}

type WriteCallback = dyn Fn(&GattWriteEvent) + Send + Sync;

/// GATT server proxy.
pub struct GattServer {
    radio: Arc<dyn RadioModule>,
    state: RwLock<ServerState>,
    write_callbacks: CallbackRegistry<WriteCallback>,
}

impl GattServer {
    /// Create a server with no registered services.
    pub fn new(radio: Arc<dyn RadioModule>) -> Self {
        Self {
            radio,
            state: RwLock::new(ServerState::default()),
            write_callbacks: CallbackRegistry::new(),
        }
    }

    /// Compile `service`, upload it and create its mirrors.
    ///
    /// Returns the handle assigned to each characteristic, in declaration
    /// order. Nothing is kept when the compilation or the upload fails.
    pub fn add_service(&self, service: &GattService) -> Result<Vec<AttributeHandle>> {
        let compiled = table::compile(service)?;

        // Held across the upload: module service indices follow slot order.
        let mut state = self.state.write();
        if state.services.len() >= usize::from(u8::MAX) {
            return Err(Error::BufferOverflow);
        }
        let base = state.mirrors.len();
        let end = base + compiled.mirrors.len();
        let (Ok(base_handle), Ok(end_handle)) =
            (AttributeHandle::try_from(base), AttributeHandle::try_from(end))
        else {
            return Err(Error::BufferOverflow);
        };
        state
            .mirrors
            .try_reserve(compiled.mirrors.len())
            .map_err(|_| Error::BufferOverflow)?;
        state
            .services
            .try_reserve(1)
            .map_err(|_| Error::BufferOverflow)?;

        self.radio.set_service(&compiled.records).map_err(|e| {
            warn!("Failed to upload service {}: {}", service.uuid, e);
            Error::invalid_state("set service")
        })?;

        state.mirrors.extend(compiled.mirrors);
        state.services.push(ServiceSlot {
            base: base_handle,
            len: end_handle - base_handle,
        });

        debug!(
            "Registered service {} as module service {} with handles {}..{}",
            service.uuid,
            state.services.len(),
            base,
            end
        );
        Ok((base_handle..end_handle).collect())
    }

    /// Number of registered characteristics.
    pub fn characteristic_count(&self) -> usize {
        self.state.read().mirrors.len()
    }

    /// Copy a characteristic value into `buffer`.
    ///
    /// The copy is truncated to the buffer; the returned length is the number
    /// of bytes actually written.
    pub fn read(&self, handle: AttributeHandle, buffer: &mut [u8]) -> Result<usize> {
        let state = self.state.read();
        let mirror = state
            .mirrors
            .get(usize::from(handle))
            .ok_or_else(|| Error::out_of_range("handle", handle))?;

        let value = mirror.value();
        let len = value.len().min(buffer.len());
        buffer[..len].copy_from_slice(&value[..len]);
        Ok(len)
    }

    /// Read on behalf of a connection. There is only one connection.
    pub fn read_for_connection(
        &self,
        _connection: ConnectionHandle,
        handle: AttributeHandle,
        buffer: &mut [u8],
    ) -> Result<usize> {
        self.read(handle, buffer)
    }

    /// Update a characteristic value.
    ///
    /// The mirror keeps at most its capacity. Unless `local_only` is set the
    /// peer is also notified. A module failure is reported even though the
    /// mirror has already been updated.
    pub fn write(&self, handle: AttributeHandle, data: &[u8], local_only: bool) -> Result<()> {
        let (srv_index, char_index, stored) = {
            let mut state = self.state.write();
            let (srv_index, char_index) = state
                .module_index(handle)
                .ok_or_else(|| Error::out_of_range("handle", handle))?;
            let mirror = state
                .mirrors
                .get_mut(usize::from(handle))
                .ok_or_else(|| Error::out_of_range("handle", handle))?;
            mirror.store(data);
            (srv_index, char_index, mirror.value().clone())
        };

        self.radio
            .set_characteristic(srv_index, char_index, &stored)
            .map_err(|e| {
                warn!("Failed to set characteristic {}: {}", handle, e);
                Error::invalid_state("set characteristic")
            })?;

        if !local_only {
            self.radio
                .notify_characteristic(srv_index, char_index, &stored)
                .map_err(|e| {
                    warn!("Failed to notify characteristic {}: {}", handle, e);
                    Error::invalid_state("notify characteristic")
                })?;
        }

        trace!("Characteristic {} updated ({} bytes)", handle, stored.len());
        Ok(())
    }

    /// Write on behalf of a connection. There is only one connection.
    pub fn write_for_connection(
        &self,
        _connection: ConnectionHandle,
        handle: AttributeHandle,
        data: &[u8],
        local_only: bool,
    ) -> Result<()> {
        self.write(handle, data, local_only)
    }

    /// Register a callback for peer writes.
    ///
    /// Returns a handle that unregisters the callback when dropped.
    pub fn on_data_written<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&GattWriteEvent) + Send + Sync + 'static,
    {
        self.write_callbacks.register(Arc::new(callback))
    }

    fn handle_write(&self, packet: WritePacket) {
        let (handle, data) = {
            let mut state = self.state.write();
            let Some(handle) = state.handle_of(packet.srv_index, packet.char_index) else {
                warn!(
                    "Write to unknown characteristic {}/{}",
                    packet.srv_index, packet.char_index
                );
                return;
            };
            match state.mirrors.get_mut(usize::from(handle)) {
                Some(mirror) if !mirror.is_placeholder() => {
                    mirror.store(&packet.data);
                    (handle, mirror.value().clone())
                }
                Some(_) => (handle, packet.data),
                None => {
                    warn!("Write to unknown characteristic {}", handle);
                    return;
                }
            }
        };

        let event = GattWriteEvent {
            connection_handle: ConnectionHandle::from(packet.conn_index),
            handle,
            op: WriteOp::WriteRequest,
            offset: 0,
            data,
        };
        debug!("Peer wrote {} bytes to characteristic {}", event.data.len(), handle);

        for callback in self.write_callbacks.snapshot() {
            callback(&event);
        }
    }
}

impl EventHandler for GattServer {
    type Event = ServerEvent;

    fn do_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::DataWritten(packet) => self.handle_write(packet),
        }
    }
}
