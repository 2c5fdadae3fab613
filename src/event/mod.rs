//! Deferred event pipeline.
//!
//! Radio notifications and timer expirations are turned into [`BleEvent`]
//! records and parked in the [`EventQueue`]. A single dispatch thread drains
//! them one at a time and hands each to the component owning its category.

pub mod flag;
pub mod queue;

pub use flag::EventFlag;
pub use queue::{EventQueue, QueueStats, EVENT_QUEUE_CAPACITY};

use crate::ble::gap::GapEvent;
use crate::gatt::client::ClientRequest;
use crate::gatt::server::ServerEvent;

/// Routing category of an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventCategory {
    /// GAP events (connection, scanning, advertising).
    Common = 0,
    /// GATT server events.
    Server = 1,
    /// GATT client requests.
    Client = 2,
}

/// A pending event record.
///
/// The payload type is fixed by the variant, so producer and consumer can
/// never disagree about it.
#[derive(Debug)]
pub enum BleEvent {
    /// Routed to the GAP controller.
    Gap(GapEvent),
    /// Routed to the GATT server.
    Server(ServerEvent),
    /// Routed to the GATT client.
    Client(ClientRequest),
}

impl BleEvent {
    /// Routing category of this record.
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Gap(_) => EventCategory::Common,
            Self::Server(_) => EventCategory::Server,
            Self::Client(_) => EventCategory::Client,
        }
    }

    /// Event identifier within the category.
    pub fn id(&self) -> u32 {
        match self {
            Self::Gap(event) => event.id(),
            Self::Server(event) => event.id(),
            Self::Client(request) => request.id(),
        }
    }
}

/// A component that consumes events of one category on the dispatch thread.
pub trait EventHandler {
    /// Payload type handled by this component.
    type Event;

    /// Process one event. Called only from the dispatch thread.
    fn do_event(&self, event: Self::Event);
}
