#![no_main]
#![no_std]

use defmt_brtt as _; // global logger

use display_interface_spi::SPIInterface;
use embassy_stm32::gpio::Output;
use embassy_stm32::mode::Blocking;
use embassy_stm32::spi::Spi;
use embassy_stm32::time::Hertz;
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use ili9341::Ili9341;
use panic_probe as _;

use embassy_stm32 as _; // memory layout

pub mod board;

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}

rtic_monotonics::systick_monotonic!(Mono, 1_000);

defmt::timestamp!("{=u32:ms}", {
    use rtic_monotonics::Monotonic;
    Mono::now().ticks()
});

/// Depth of the interrupt to engine event queue.
pub const QUEUE_LEN: usize = 32;

/// The ILI9341 panel on SPI1.
pub type Display = Ili9341<
    SPIInterface<ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, NoDelay>, Output<'static>>,
    Output<'static>,
>;

use embassy_stm32::timer::low_level::Timer;
use embedded_hal::delay::DelayNs;

/// Prescaler and auto-reload value that make a timer clocked at `clock`
/// overflow after `ns` nanoseconds.
///
/// Rounds down to whole ticks; a period too long for a 16-bit timer is
/// clamped to the longest one.
pub fn one_shot_period(clock: Hertz, ns: u64) -> (u16, u16) {
    let ticks = (u64::from(clock.0) * ns / 1_000_000_000).max(1);
    let psc = u16::try_from((ticks - 1) >> 16).unwrap_or(u16::MAX);
    let arr = (ticks / (u64::from(psc) + 1)).clamp(1, u64::from(u16::MAX));
    (psc, arr as u16)
}

/// Busy-wait delay on a basic timer, for the display driver.
pub struct TimerDelay<T>
where
    T: embassy_stm32::timer::CoreInstance,
{
    timer: Timer<'static, T>,
}

impl<T: embassy_stm32::timer::CoreInstance> TimerDelay<T> {
    pub fn new(timer: Timer<'static, T>) -> Self {
        Self { timer }
    }
}

impl<T: embassy_stm32::timer::CoreInstance> DelayNs for TimerDelay<T> {
    fn delay_ns(&mut self, ns: u32) {
        if ns == 0 {
            return;
        }

        let (psc, arr) = one_shot_period(self.timer.get_clock_frequency(), u64::from(ns));
        let regs = self.timer.regs_core();
        self.timer.stop();
        regs.psc().write_value(psc);
        regs.arr().write(|w| w.set_arr(arr));
        // Load the new prescaler, then drop the flag the load raised.
        regs.egr().write(|w| w.set_ug(true));
        regs.sr().modify(|reg| reg.set_uif(false));
        self.timer.start();

        let status = regs.sr();
        while !status.read().uif() {}

        status.modify(|reg| reg.set_uif(false));
        self.timer.stop();
    }
}
