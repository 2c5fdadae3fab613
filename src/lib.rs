// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # esp32at-ble
//!
//! Host-side BLE stack core for radio modules driven over AT commands.
//!
//! The module answers commands synchronously and reports connections,
//! advertising reports and peer writes asynchronously, possibly from an
//! interrupt-like context. This crate turns those notifications into queued
//! events processed by a single dispatch thread, and builds the GAP and GATT
//! roles on top of that pipeline.
//!
//! ## Features
//!
//! - **Event pipeline**: fixed-capacity, critical-section guarded FIFO with a
//!   binary wake-up flag
//! - **GAP**: static random address generation, scanning and advertising with
//!   duration timers, connection tracking
//! - **GATT server**: attribute table compilation and host-side value mirrors
//! - **GATT client**: deferred discovery, reads and writes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use esp32at_ble::{BleConfig, BleInstance, DuplicatesFilter, RadioModule, Result};
//!
//! fn run(radio: Arc<dyn RadioModule>) -> Result<()> {
//!     let ble = BleInstance::new(radio, BleConfig::default())?;
//!     ble.init(|result| println!("init: {:?}", result))?;
//!
//!     ble.gap()
//!         .start_scan(Duration::from_secs(2), DuplicatesFilter::Disable, Duration::ZERO)?;
//!     while ble.gap().is_scanning() {
//!         ble.wait_for_event();
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration and UUIDs

// Public modules
pub mod ble;
pub mod callback;
pub mod config;
pub mod error;
pub mod event;
pub mod gatt;
pub mod instance;
pub mod radio;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use callback::CallbackHandle;
pub use config::BleConfig;
pub use error::{Error, Result};
pub use event::{BleEvent, EventQueue};
pub use instance::{BleInstance, NotificationRouter};
pub use radio::{ModuleRole, RadioError, RadioModule, RadioNotifications};

// Re-export commonly used types from submodules
pub use ble::{
    Address, AddressType, AdvertisingParameters, BleUuid, ConnectionState, DuplicatesFilter,
    GapController, GapEventHandler, LegacyGapEventHandler, ScanParameters,
};
pub use gatt::{
    CharacteristicProperties, GattCharacteristic, GattClient, GattServer, GattService, WriteOp,
};
