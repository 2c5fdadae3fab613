//! GATT layer.
//!
//! This module contains:
//! - The host-side service model
//! - The attribute table compiler
//! - The local server and remote client proxies

pub mod client;
pub mod server;
pub mod table;
pub mod types;

pub use client::{
    DiscoveredCharacteristic, DiscoveredProperties, DiscoveredService, GattClient, ReadResponse,
    WriteResponse,
};
pub use server::{GattServer, GattWriteEvent, WriteOp};
pub use table::{compile, AttributeRecord, AttributeValue, CompiledService};
pub use types::{
    AttributeHandle, CharacteristicProperties, GattAttribute, GattCharacteristic, GattService,
};
