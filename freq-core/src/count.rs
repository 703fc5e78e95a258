//! Counter values extended past the native 16-bit register width.

/// Width of the hardware counters.
pub const NATIVE_BITS: u32 = 16;

/// A native register value plus the number of times the register wrapped.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtendedCount {
    pub overflows: u32,
    pub native: u16,
}

impl ExtendedCount {
    pub const fn new(overflows: u32, native: u16) -> Self {
        Self { overflows, native }
    }

    /// `overflows * 2^16 + native`.
    pub const fn total(self) -> u64 {
        ((self.overflows as u64) << NATIVE_BITS) | self.native as u64
    }

    /// Exact for totals below 2^53.
    pub fn as_f64(self) -> f64 {
        self.total() as f64
    }
}

/// Two rising-edge timestamps and the overflows seen between them.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureSample {
    pub first: u16,
    pub second: u16,
    pub overflows: u32,
}

impl CaptureSample {
    /// Reference clock cycles in one signal period.
    ///
    /// An overflow that raced the second capture and was not attributed to
    /// the window leaves `second < first` with too few overflows. The span is
    /// then taken in the native register width.
    pub fn cycles(&self) -> u64 {
        let end = (u64::from(self.overflows) << NATIVE_BITS) + u64::from(self.second);
        end.checked_sub(u64::from(self.first))
            .unwrap_or_else(|| u64::from(self.second.wrapping_sub(self.first)))
    }
}
