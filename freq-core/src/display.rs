//! Readout formatting and the display sink.

use core::fmt::Write;

use embedded_graphics::{
    mono_font::{ascii::FONT_8X13, MonoTextStyle, MonoTextStyleBuilder},
    prelude::*,
    text::{Baseline, Text},
};
use heapless::String;

use crate::calc::MeasurementResult;
use crate::error::MeasurementError;

/// Text columns addressable on the display. Each column is two glyphs wide.
pub const COLUMNS: u8 = 8;
/// Text rows addressable on the display.
pub const ROWS: u8 = 4;

const GLYPH_WIDTH: i32 = 8;
const CELL_WIDTH: i32 = 2 * GLYPH_WIDTH;
const ROW_HEIGHT: i32 = 16;

/// One rendered display line.
pub type Line = String<32>;

/// Something that can show positioned text.
pub trait DisplaySink {
    type Error;

    fn clear_graphics(&mut self) -> Result<(), Self::Error>;

    /// `column` is 1 to [`COLUMNS`], `row` is 1 to [`ROWS`].
    fn write_text(&mut self, text: &str, column: u8, row: u8) -> Result<(), Self::Error>;
}

/// Errors from [`TextPanel`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PanelError<E> {
    /// Column or row out of range.
    Position,
    /// The draw target failed.
    Target(E),
}

/// A [`DisplaySink`] on top of any embedded-graphics draw target.
///
/// Glyphs are drawn with an opaque background, so rewriting a row replaces
/// the text that was there.
pub struct TextPanel<D: DrawTarget> {
    target: D,
    style: MonoTextStyle<'static, D::Color>,
    background: D::Color,
}

impl<D: DrawTarget> TextPanel<D> {
    pub fn new(target: D, foreground: D::Color, background: D::Color) -> Self {
        let style = MonoTextStyleBuilder::new()
            .font(&FONT_8X13)
            .text_color(foreground)
            .background_color(background)
            .build();

        Self {
            target,
            style,
            background,
        }
    }

    pub fn release(self) -> D {
        self.target
    }
}

impl<D: DrawTarget> DisplaySink for TextPanel<D> {
    type Error = PanelError<D::Error>;

    fn clear_graphics(&mut self) -> Result<(), Self::Error> {
        self.target.clear(self.background).map_err(PanelError::Target)
    }

    fn write_text(&mut self, text: &str, column: u8, row: u8) -> Result<(), Self::Error> {
        if !(1..=COLUMNS).contains(&column) || !(1..=ROWS).contains(&row) {
            return Err(PanelError::Position);
        }

        let origin = Point::new(
            i32::from(column - 1) * CELL_WIDTH,
            i32::from(row - 1) * ROW_HEIGHT,
        );
        Text::with_baseline(text, origin, self.style, Baseline::Top)
            .draw(&mut self.target)
            .map_err(PanelError::Target)?;
        Ok(())
    }
}

/// The four display lines for one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readout {
    pub signal: Line,
    pub clock: Line,
    pub frequency: Line,
    pub mode: Line,
}

impl Readout {
    pub fn new(result: &MeasurementResult) -> Self {
        let signal_total = result.signal_count.map_or(0, |count| count.total());

        // A u64 has at most 20 digits, so none of these can overflow a line.
        let mut signal = Line::new();
        let written = write!(signal, "sig:{:<12}", signal_total);
        debug_assert!(written.is_ok());

        let mut clock = Line::new();
        let written = write!(clock, "clk:{:<12}", result.clock_count.total());
        debug_assert!(written.is_ok());

        let mut mode = Line::new();
        let written = write!(mode, "mode:{:<7}", result.mode_used.name());
        debug_assert!(written.is_ok());

        Self {
            signal,
            clock,
            frequency: frequency_line(result.frequency_hz),
            mode,
        }
    }
}

/// `freq:` followed by the value in Hz, kHz or MHz.
///
/// The unit is chosen so the value stays below 1000 (Hz is kept up to
/// 1 kHz), and the decimal places shrink as the integer part grows.
/// A value too wide for a line shows as `freq:overrange`.
pub fn frequency_line(hz: f64) -> Line {
    let mut line = Line::new();
    let written = if hz < 10.0 {
        write!(line, "freq:{:<9.7}Hz", hz)
    } else if hz < 100.0 {
        write!(line, "freq:{:<9.6}Hz", hz)
    } else if hz < 1_000.0 {
        write!(line, "freq:{:<9.5}Hz", hz)
    } else if hz < 10_000.0 {
        write!(line, "freq:{:<8.6}kHz", hz / 1e3)
    } else if hz < 100_000.0 {
        write!(line, "freq:{:<8.5}kHz", hz / 1e3)
    } else if hz < 1_000_000.0 {
        write!(line, "freq:{:<8.4}kHz", hz / 1e3)
    } else {
        write!(line, "freq:{:<8.6}MHz", hz / 1e6)
    };
    if written.is_err() {
        line.clear();
        let fallback = line.push_str("freq:overrange");
        debug_assert!(fallback.is_ok());
    }
    line
}

/// Clear the display and show a readout on rows 1 to 4.
pub fn show<S: DisplaySink>(sink: &mut S, readout: &Readout) -> Result<(), S::Error> {
    sink.clear_graphics()?;
    sink.write_text(&readout.signal, 1, 1)?;
    sink.write_text(&readout.clock, 1, 2)?;
    sink.write_text(&readout.frequency, 1, 3)?;
    sink.write_text(&readout.mode, 1, 4)
}

/// Clear the display and show why there is no result.
pub fn show_error<S: DisplaySink>(sink: &mut S, error: MeasurementError) -> Result<(), S::Error> {
    let mut line = Line::new();
    let written = write!(line, "freq:{:<11}", error.describe());
    debug_assert!(written.is_ok());

    sink.clear_graphics()?;
    sink.write_text(&line, 1, 3)
}
