/// Errors that end a measurement session without a result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum MeasurementError {
    /// No signal edge arrived before the watchdog gave up.
    NoSignal,
    /// The synchronized window opened but never closed.
    NotSynchronized,
    /// An interrupt could not post an event because the queue was full.
    EventsDropped,
}

impl MeasurementError {
    /// Short description shown on the display.
    pub const fn describe(self) -> &'static str {
        match self {
            MeasurementError::NoSignal => "no signal",
            MeasurementError::NotSynchronized => "no sync",
            MeasurementError::EventsDropped => "overrun",
        }
    }
}

/// Errors returned by [`FrequencyMeter::measure_once`](crate::FrequencyMeter::measure_once).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MeterError<E> {
    /// The session failed.
    Measurement(MeasurementError),
    /// The display rejected the readout.
    Display(E),
}
