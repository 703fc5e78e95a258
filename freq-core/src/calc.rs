//! Frequency calculation and next-mode selection.

use crate::config::{Calibration, Config};
use crate::count::{CaptureSample, ExtendedCount};
use crate::mode::MeasurementMode;
use crate::session::RawSessionOutput;

/// Reference-side count of a result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockCount {
    /// Reference counter over the synchronized window.
    Extended(ExtendedCount),
    /// Reference cycles in one signal period.
    PeriodCycles(u64),
}

impl ClockCount {
    pub fn total(&self) -> u64 {
        match self {
            ClockCount::Extended(count) => count.total(),
            ClockCount::PeriodCycles(cycles) => *cycles,
        }
    }
}

/// The outcome of one session.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MeasurementResult {
    /// Signal counter over the synchronized window. Synchronous mode only.
    pub signal_count: Option<ExtendedCount>,
    pub clock_count: ClockCount,
    pub frequency_hz: f64,
    pub mode_used: MeasurementMode,
}

/// A result together with the mode its value selects.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calculation {
    pub result: MeasurementResult,
    pub next_mode: MeasurementMode,
}

/// Convert a raw session output into a result and choose the next mode.
pub fn calculate(raw: &RawSessionOutput, config: &Config) -> Calculation {
    let reference_hz = config.reference_hz();
    let result = match *raw {
        RawSessionOutput::Synchronous { signal, reference } => MeasurementResult {
            signal_count: Some(signal),
            clock_count: ClockCount::Extended(reference),
            frequency_hz: synchronous_frequency(
                signal,
                reference,
                &config.calibration,
                reference_hz,
            ),
            mode_used: raw.mode(),
        },
        RawSessionOutput::PeriodCapture(sample) => MeasurementResult {
            signal_count: None,
            clock_count: ClockCount::PeriodCycles(sample.cycles()),
            frequency_hz: period_frequency(&sample, reference_hz),
            mode_used: raw.mode(),
        },
    };

    Calculation {
        next_mode: next_mode(result.frequency_hz, config.switch_threshold_hz),
        result,
    }
}

/// Equal-precision result. A zero reference count yields 0 Hz.
pub fn synchronous_frequency(
    signal: ExtendedCount,
    reference: ExtendedCount,
    calibration: &Calibration,
    reference_hz: f64,
) -> f64 {
    let signal = calibration.signal(signal);
    let reference = calibration.reference(reference);
    if reference == 0.0 {
        return 0.0;
    }
    signal / reference * reference_hz
}

/// Period-capture result.
pub fn period_frequency(sample: &CaptureSample, reference_hz: f64) -> f64 {
    match sample.cycles() {
        0 => 0.0,
        cycles => reference_hz / cycles as f64,
    }
}

/// Low frequencies are measured by period capture, the rest synchronously.
pub fn next_mode(frequency_hz: f64, threshold_hz: f64) -> MeasurementMode {
    if frequency_hz < threshold_hz {
        MeasurementMode::PeriodCapture
    } else {
        MeasurementMode::Synchronous
    }
}
