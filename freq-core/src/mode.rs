/// Measurement strategy for one session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MeasurementMode {
    /// Equal-precision counting over a synchronized gate window.
    Synchronous,
    /// Timestamping two consecutive rising edges of the signal.
    PeriodCapture,
}

impl MeasurementMode {
    /// Short name shown on the display.
    pub const fn name(self) -> &'static str {
        match self {
            MeasurementMode::Synchronous => "synchro",
            MeasurementMode::PeriodCapture => "period",
        }
    }
}
