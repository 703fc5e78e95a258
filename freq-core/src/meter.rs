//! The measure, compute, display cycle.

use crate::calc::{calculate, Calculation, MeasurementResult};
use crate::display::{show, show_error, DisplaySink, Readout};
use crate::engine::SessionRunner;
use crate::error::MeterError;
use crate::mode::MeasurementMode;

/// Threads the measurement mode from one session to the next.
pub struct FrequencyMeter<E> {
    engine: E,
    next_mode: MeasurementMode,
}

impl<E: SessionRunner> FrequencyMeter<E> {
    pub fn new(engine: E) -> Self {
        let next_mode = engine.config().initial_mode;
        Self { engine, next_mode }
    }

    /// Mode the next session will use.
    pub fn next_mode(&self) -> MeasurementMode {
        self.next_mode
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one session, compute the result and show it.
    ///
    /// A failed session is shown as a status line and resets the mode to
    /// the configured initial one.
    pub fn measure_once<D: DisplaySink>(
        &mut self,
        display: &mut D,
    ) -> Result<MeasurementResult, MeterError<D::Error>> {
        let raw = match self.engine.run_session(self.next_mode) {
            Ok(raw) => raw,
            Err(error) => {
                self.next_mode = self.engine.config().initial_mode;
                show_error(display, error).map_err(MeterError::Display)?;
                return Err(MeterError::Measurement(error));
            }
        };

        let Calculation { result, next_mode } = calculate(&raw, self.engine.config());
        if next_mode != self.next_mode {
            debug!("switching to {} mode", next_mode);
        }
        self.next_mode = next_mode;
        info!("{} Hz by {}", result.frequency_hz, result.mode_used);

        show(display, &Readout::new(&result)).map_err(MeterError::Display)?;
        Ok(result)
    }
}
