//! Fixed-capacity event ring shared by producers and the dispatch thread.

use core::cell::RefCell;
use critical_section::Mutex;
use heapless::Deque;
use std::sync::OnceLock;
use tracing::{trace, warn};

use super::{BleEvent, EventFlag};

/// Number of event records the ring can hold.
pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Snapshot of the queue accounting counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Records accepted since creation.
    pub enqueued: u64,
    /// Records handed to the dispatcher since creation.
    pub dequeued: u64,
    /// Records currently waiting.
    pub pending: usize,
}

struct Ring {
    records: Deque<BleEvent, EVENT_QUEUE_CAPACITY>,
    enqueued: u64,
    dequeued: u64,
}

/// FIFO of pending [`BleEvent`] records.
///
/// Storage is preallocated; all mutation happens inside a critical section
/// so producers never block on a lock held by the consumer.
pub struct EventQueue {
    ring: Mutex<RefCell<Ring>>,
    flag: OnceLock<EventFlag>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Ring {
                records: Deque::new(),
                enqueued: 0,
                dequeued: 0,
            })),
            flag: OnceLock::new(),
        }
    }

    /// Append a record at the tail and wake the consumer.
    ///
    /// When the ring is full the record is handed back untouched.
    pub fn enqueue(&self, event: BleEvent) -> std::result::Result<(), BleEvent> {
        let category = event.category();
        let id = event.id();

        let result = critical_section::with(|cs| -> std::result::Result<(), BleEvent> {
            let mut ring = self.ring.borrow_ref_mut(cs);
            ring.records.push_back(event)?;
            ring.enqueued += 1;
            Ok(())
        });

        match result {
            Ok(()) => {
                trace!("Queued event {:?}/{}", category, id);
                self.signal();
                Ok(())
            }
            Err(event) => {
                warn!("Event queue full, rejecting {:?}/{}", category, id);
                Err(event)
            }
        }
    }

    /// Remove the head record, if any. Never blocks.
    pub fn pop(&self) -> Option<BleEvent> {
        critical_section::with(|cs| {
            let mut ring = self.ring.borrow_ref_mut(cs);
            let event = ring.records.pop_front();
            if event.is_some() {
                ring.dequeued += 1;
            }
            event
        })
    }

    /// Number of records waiting.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.ring.borrow_ref(cs).records.len())
    }

    /// Check whether no record is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent snapshot of the accounting counters.
    pub fn stats(&self) -> QueueStats {
        critical_section::with(|cs| {
            let ring = self.ring.borrow_ref(cs);
            QueueStats {
                enqueued: ring.enqueued,
                dequeued: ring.dequeued,
                pending: ring.records.len(),
            }
        })
    }

    /// Set the consumer's wake-up flag, if the consumer has created it yet.
    pub fn signal(&self) {
        if let Some(flag) = self.flag.get() {
            flag.set();
        }
    }

    /// The consumer's wake-up flag, created on first use.
    pub(crate) fn wait_flag(&self) -> &EventFlag {
        self.flag.get_or_init(EventFlag::new)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::gap::GapEvent;
    use proptest::prelude::*;

    fn disconnect(conn_index: u8) -> BleEvent {
        BleEvent::Gap(GapEvent::Disconnected { conn_index })
    }

    fn conn_index_of(event: BleEvent) -> u8 {
        match event {
            BleEvent::Gap(GapEvent::Disconnected { conn_index }) => conn_index,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new();
        for i in 0..5 {
            queue.enqueue(disconnect(i)).unwrap();
        }

        let order: Vec<u8> = std::iter::from_fn(|| queue.pop()).map(conn_index_of).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let queue = EventQueue::new();
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
        assert_eq!(queue.stats(), QueueStats::default());
    }

    #[test]
    fn test_full_queue_returns_event() {
        let queue = EventQueue::new();
        for i in 0..EVENT_QUEUE_CAPACITY {
            queue.enqueue(disconnect(i as u8)).unwrap();
        }

        let rejected = queue.enqueue(disconnect(0xAA)).unwrap_err();
        assert_eq!(conn_index_of(rejected), 0xAA);
        assert_eq!(queue.len(), EVENT_QUEUE_CAPACITY);
        assert_eq!(queue.stats().enqueued, EVENT_QUEUE_CAPACITY as u64);
    }

    #[test]
    fn test_signal_before_flag_creation_is_dropped() {
        let queue = EventQueue::new();
        queue.enqueue(disconnect(1)).unwrap();

        let flag = queue.wait_flag();
        assert!(!flag.is_set());

        queue.enqueue(disconnect(2)).unwrap();
        assert!(flag.is_set());
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        use std::sync::Arc;

        let queue = Arc::new(EventQueue::new());
        let producers: Vec<_> = (0..2u8)
            .map(|p| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..10u8 {
                        queue.enqueue(disconnect(p * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let drained: Vec<u8> = std::iter::from_fn(|| queue.pop()).map(conn_index_of).collect();
        assert_eq!(drained.len(), 20);
        for p in 0..2u8 {
            let mine: Vec<u8> = drained
                .iter()
                .copied()
                .filter(|v| v / 100 == p)
                .collect();
            let expected: Vec<u8> = (0..10u8).map(|i| p * 100 + i).collect();
            assert_eq!(mine, expected);
        }
    }

    proptest! {
        #[test]
        fn prop_interleaving_preserves_fifo_and_accounting(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let queue = EventQueue::new();
            let mut next = 0u8;
            let mut expected = std::collections::VecDeque::new();

            for push in ops {
                if push {
                    match queue.enqueue(disconnect(next)) {
                        Ok(()) => expected.push_back(next),
                        Err(event) => prop_assert_eq!(conn_index_of(event), next),
                    }
                    next = next.wrapping_add(1);
                } else {
                    let got = queue.pop().map(conn_index_of);
                    prop_assert_eq!(got, expected.pop_front());
                }

                let stats = queue.stats();
                prop_assert_eq!(stats.enqueued, stats.dequeued + stats.pending as u64);
                prop_assert_eq!(stats.pending, expected.len());
            }
        }
    }
}
