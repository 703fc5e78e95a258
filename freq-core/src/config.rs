//! Measurement configuration.

use fugit::{HertzU32, MillisDurationU32};

use crate::count::ExtendedCount;
use crate::mode::MeasurementMode;

/// Multiplicative correction factors, applied as `count + count * factor`.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Factor for the signal count.
    pub signal: f64,
    /// Factor for the reference count.
    pub reference: f64,
}

impl Calibration {
    /// Factors measured on the reference board.
    pub const BOARD: Self = Self {
        signal: 0.000_066_6,
        reference: 0.000_051_5,
    };

    /// Corrected signal count.
    pub fn signal(&self, count: ExtendedCount) -> f64 {
        correct(count, self.signal)
    }

    /// Corrected reference count.
    pub fn reference(&self, count: ExtendedCount) -> f64 {
        correct(count, self.reference)
    }
}

fn correct(count: ExtendedCount, factor: f64) -> f64 {
    let count = count.as_f64();
    count + count * factor
}

impl Default for Calibration {
    fn default() -> Self {
        Self::BOARD
    }
}

/// What a session does when its terminal event never arrives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NoSignalPolicy {
    /// Keep waiting forever.
    Block,
    /// Use the gate timer as a watchdog while waiting on a signal edge and
    /// give up after `gates` consecutive expiries.
    ///
    /// A value of 0 is treated as 1.
    Report { gates: u8 },
}

/// Measurement configuration.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// Frequency of the clock driving the reference counter and the capture unit.
    pub reference: HertzU32,
    /// Length of the synchronous gate window.
    pub gate: MillisDurationU32,
    /// Count correction factors.
    pub calibration: Calibration,
    /// Results below this frequency select period capture for the next session.
    pub switch_threshold_hz: f64,
    /// Mode of the first session, and the fallback after a failed one.
    pub initial_mode: MeasurementMode,
    /// Behavior when the signal disappears mid-session.
    pub no_signal: NoSignalPolicy,
}

impl Config {
    /// Reference frequency in Hz as a float.
    pub fn reference_hz(&self) -> f64 {
        f64::from(self.reference.to_Hz())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference: HertzU32::MHz(4),
            gate: MillisDurationU32::millis(500),
            calibration: Calibration::BOARD,
            switch_threshold_hz: 10_001.0,
            initial_mode: MeasurementMode::PeriodCapture,
            no_signal: NoSignalPolicy::Block,
        }
    }
}
