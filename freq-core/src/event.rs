//! Interrupt-to-engine event channel.
//!
//! Interrupt handlers own the [`EventSender`], the engine owns the
//! [`EventReceiver`]. The underlying queue is single-producer: handlers that
//! can preempt each other must share the sender behind a lock.

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::spsc::{Consumer, Producer, Queue};

use crate::hal::Edge;

/// A hardware notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The signal counter wrapped.
    SignalOverflow,
    /// The reference counter (or the capture unit's counter) wrapped.
    ReferenceOverflow,
    /// The capture unit latched a timestamp.
    Captured(u16),
    /// The synchronization input saw the armed edge.
    SyncEdge(Edge),
    /// The gate timer elapsed.
    GateExpired,
}

/// Statically allocatable storage for the channel. Holds `N - 1` events.
pub struct EventQueue<const N: usize> {
    queue: Queue<Event, N>,
    dropped: AtomicBool,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            dropped: AtomicBool::new(false),
        }
    }

    /// Split into the interrupt side and the engine side.
    pub fn split(&mut self) -> (EventSender<'_, N>, EventReceiver<'_, N>) {
        let Self { queue, dropped } = self;
        let dropped: &AtomicBool = dropped;
        let (producer, consumer) = queue.split();
        (
            EventSender { producer, dropped },
            EventReceiver { consumer, dropped },
        )
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt side of the channel.
pub struct EventSender<'q, const N: usize> {
    producer: Producer<'q, Event, N>,
    dropped: &'q AtomicBool,
}

impl<const N: usize> EventSender<'_, N> {
    /// Never blocks. A full queue drops the event and marks the channel.
    pub fn post(&mut self, event: Event) {
        if self.producer.enqueue(event).is_err() {
            self.dropped.store(true, Ordering::Relaxed);
        }
    }
}

/// Engine side of the channel.
pub struct EventReceiver<'q, const N: usize> {
    consumer: Consumer<'q, Event, N>,
    dropped: &'q AtomicBool,
}

impl<const N: usize> EventReceiver<'_, N> {
    pub fn next(&mut self) -> Option<Event> {
        self.consumer.dequeue()
    }

    pub fn is_pending(&self) -> bool {
        self.consumer.ready()
    }

    /// Number of queued events.
    pub fn queued(&self) -> usize {
        self.consumer.len()
    }

    /// Discard queued events, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let mut stale = 0;
        while self.consumer.dequeue().is_some() {
            stale += 1;
        }
        stale
    }

    /// Whether an event was dropped since the last call.
    pub fn take_dropped(&self) -> bool {
        self.dropped.swap(false, Ordering::Relaxed)
    }
}

/// Events for one capture-unit interrupt, in the order they happened.
///
/// When the overflow flag is pending together with a capture, the overflow
/// came first if the latched value is in the lower half of the range: the
/// counter had just wrapped when the edge arrived.
pub fn capture_interrupt(captured: Option<u16>, overflowed: bool) -> [Option<Event>; 2] {
    match captured {
        Some(stamp) if overflowed && stamp < 0x8000 => {
            [Some(Event::ReferenceOverflow), Some(Event::Captured(stamp))]
        }
        Some(stamp) => [
            Some(Event::Captured(stamp)),
            overflowed.then_some(Event::ReferenceOverflow),
        ],
        None => [overflowed.then_some(Event::ReferenceOverflow), None],
    }
}
