#![cfg_attr(not(test), no_std)]

//! Adaptive dual-algorithm frequency measurement.
//!
//! Two strategies are used depending on the last result:
//!
//! - synchronous (equal-precision) counting, where the unknown signal and a
//!   reference clock are counted over a gate window whose edges are
//!   synchronized to the signal by an external flip-flop, and
//! - period capture, where two consecutive rising edges of the signal are
//!   timestamped against the reference clock.
//!
//! Hardware interrupt handlers only post [`Event`]s into an [`EventQueue`].
//! The [`Engine`] consumes them in arrival order on the thread that called
//! [`Engine::run_session`], suspending through a [`Wait`] implementation
//! between events. The [`calc`] module turns the raw session output into a
//! [`MeasurementResult`] and picks the mode for the next session.
//!
//! Usage:
//! ```ignore
//! let mut queue = EventQueue::<32>::new();
//! let (sender, receiver) = queue.split();
//! // hand `sender` to the interrupt handlers
//! let engine = Engine::new(peripherals, receiver, sleep, Config::default());
//! let mut meter = FrequencyMeter::new(engine);
//! loop {
//!     meter.measure_once(&mut display)?;
//! }
//! ```

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod calc;
pub mod config;
pub mod count;
pub mod display;
pub mod engine;
pub mod error;
pub mod event;
pub mod hal;
pub mod meter;
pub mod mode;
pub mod session;

#[cfg(test)]
pub(crate) mod sim;

pub use calc::{calculate, next_mode, Calculation, ClockCount, MeasurementResult};
pub use config::{Calibration, Config, NoSignalPolicy};
pub use count::{CaptureSample, ExtendedCount};
pub use display::{show, show_error, DisplaySink, PanelError, Readout, TextPanel};
pub use engine::{Engine, Peripherals, SessionRunner};
pub use error::{MeasurementError, MeterError};
pub use event::{Event, EventQueue, EventReceiver, EventSender};
pub use hal::{Capture, ClockSource, Counter, Edge, GateTimer, SyncInput, Wait};
pub use meter::FrequencyMeter;
pub use mode::MeasurementMode;
pub use session::RawSessionOutput;
