//! Hardware capabilities the engine drives.
//!
//! Only commands go through these traits. The matching notifications
//! (overflow, capture, sync edge, gate expiry) are posted by interrupt
//! handlers as [`Event`](crate::Event)s.

use fugit::MillisDurationU32;

/// Signal edge polarity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    Rising,
    Falling,
}

/// Clock feeding a [`Counter`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// The stable reference clock.
    Reference,
    /// The synchronized unknown signal.
    External,
}

/// A free-running 16-bit counter that raises an overflow event when it wraps.
pub trait Counter {
    /// Select the clock source. Leaves the counter stopped.
    fn init(&mut self, source: ClockSource);
    fn start(&mut self);
    fn stop(&mut self);
    /// Zero the native register.
    fn clear(&mut self);
    /// Native register value. Only stable while the counter is stopped.
    fn value(&self) -> u16;
}

/// A free-running 16-bit counter that latches its value on an input edge.
pub trait Capture {
    /// Select the capture edge. Leaves the unit stopped.
    fn init(&mut self, edge: Edge);
    /// Clear the counter and enable capture and overflow events.
    fn start(&mut self);
    /// Disable capture and overflow events and stop counting.
    fn stop(&mut self);
}

/// The output of the synchronization flip-flop and its data input.
pub trait SyncInput {
    /// Enable the edge interrupt for `edge` only.
    fn arm(&mut self, edge: Edge);
    fn disarm(&mut self);
    /// Drive the flip-flop data input. The output follows on the next
    /// signal edge.
    fn request(&mut self, open: bool);
}

/// One-shot timer that raises an expiry event.
pub trait GateTimer {
    /// (Re)start the timer from zero.
    fn start(&mut self, duration: MillisDurationU32);
    fn stop(&mut self);
}

/// Suspends the measuring thread until an interrupt arrives.
pub trait Wait {
    /// Sleep unless `pending` reports queued events.
    ///
    /// The check and the sleep must be atomic with respect to interrupts,
    /// otherwise an event posted in between is not noticed until the next
    /// unrelated interrupt.
    fn wait(&mut self, pending: &dyn Fn() -> bool);
}
