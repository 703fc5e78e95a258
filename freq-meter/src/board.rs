//! The measurement peripherals of the NUCLEO-H755ZI-Q board.
//!
//! | Role                         | Peripheral | Pin       |
//! |------------------------------|------------|-----------|
//! | reference counter            | TIM3       | internal  |
//! | signal counter (ETR clock)   | TIM4       | PE0, AF2  |
//! | period capture, channel 1    | TIM5       | PA0, AF2  |
//! | gate one-shot                | TIM6       |           |
//! | flip-flop Q (sync edges)     | EXTI3      | PE3       |
//! | flip-flop D (window request) | GPIO       | PE5       |
//!
//! Each timer is split in two: the driver half implements the
//! [`freq_core`] capability traits and lives in the engine, the flag half
//! is owned by the interrupt handler and turns status bits into events.

use embassy_stm32::gpio::{Input, Output};
use embassy_stm32::pac::{self, gpio::vals::Moder, timer::TimCore, timer::TimGp16};
use embassy_stm32::peripherals::{TIM3, TIM4, TIM5, TIM6};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::low_level::{InputCaptureMode, InputTISelection, Timer};
use embassy_stm32::timer::{Channel, CoreInstance, GeneralInstance4Channel};
use freq_core::event::capture_interrupt;
use freq_core::{
    Capture, ClockSource, Counter, Edge, Engine, Event, GateTimer, SyncInput, Wait,
};
use fugit::MillisDurationU32;

use crate::{one_shot_period, QUEUE_LEN};

pub type BoardEngine = Engine<
    'static,
    TimerCounter<TIM4>,
    TimerCounter<TIM3>,
    CaptureUnit<TIM5>,
    SyncLine,
    Gate<TIM6>,
    Sleep,
    QUEUE_LEN,
>;

const SYNC_LINE: usize = 3;
/// EXTICR port code of GPIOE.
const SYNC_PORT: u8 = 4;

/// Switch `pin` of `port` to alternate function `af`.
///
/// Used for timer inputs that have no embassy driver (ETR) or whose
/// driver would take over the whole timer.
pub fn route_alternate(port: pac::gpio::Gpio, pin: usize, af: u8) {
    port.afr(pin / 8).modify(|w| w.set_afr(pin % 8, af));
    port.moder().modify(|w| w.set_moder(pin, Moder::ALTERNATE));
}

/// Prescaler that brings `clock` as close to `wanted` as possible without
/// exceeding it.
fn prescaler(clock: Hertz, wanted: Hertz) -> u16 {
    let divider = clock.0.div_ceil(wanted.0.max(1)).max(1);
    u16::try_from(divider - 1).unwrap_or(u16::MAX)
}

/// Status flags of a timer whose only interrupt is the update event.
#[derive(Copy, Clone)]
pub struct OverflowFlags {
    regs: TimCore,
}

impl OverflowFlags {
    /// Clear a pending update flag. Returns whether one was set.
    pub fn acknowledge(&self) -> bool {
        let status = self.regs.sr();
        if !status.read().uif() {
            return false;
        }
        status.modify(|reg| reg.set_uif(false));
        true
    }
}

/// A 16-bit counter clocked either by the prescaled timer clock or by the
/// ETR pin.
pub struct TimerCounter<T: GeneralInstance4Channel> {
    timer: Timer<'static, T>,
    psc: u16,
}

impl<T: GeneralInstance4Channel> TimerCounter<T> {
    /// `reference` is the rate wanted when counting the internal clock.
    pub fn new(timer: Timer<'static, T>, reference: Hertz) -> Self {
        let psc = prescaler(timer.get_clock_frequency(), reference);
        Self { timer, psc }
    }

    /// Rate actually achieved when counting the internal clock.
    pub fn rate(&self) -> Hertz {
        Hertz(self.timer.get_clock_frequency().0 / (u32::from(self.psc) + 1))
    }

    pub fn overflow_flags(&self) -> OverflowFlags {
        OverflowFlags {
            regs: self.timer.regs_core(),
        }
    }
}

impl<T: GeneralInstance4Channel> Counter for TimerCounter<T> {
    fn init(&mut self, source: ClockSource) {
        let regs = self.timer.regs_gp16();
        self.timer.stop();

        match source {
            ClockSource::Reference => {
                regs.smcr().modify(|w| w.set_ece(false));
                regs.psc().write_value(self.psc);
            }
            ClockSource::External => {
                // External clock mode 2. ETR polarity, prescaler and filter
                // stay at their reset values: rising edges, no division.
                regs.smcr().modify(|w| w.set_ece(true));
                regs.psc().write_value(0);
            }
        }
        regs.arr().write(|w| w.set_arr(u16::MAX));
        regs.egr().write(|w| w.set_ug(true));
        regs.sr().modify(|reg| reg.set_uif(false));
        self.timer.enable_update_interrupt(true);
    }

    fn start(&mut self) {
        self.timer.start();
    }

    fn stop(&mut self) {
        self.timer.stop();
        // Let an update interrupt raised before the stop run, so its
        // overflow is queued ahead of the register read.
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn clear(&mut self) {
        self.timer.reset();
    }

    fn value(&self) -> u16 {
        self.timer.regs_core().cnt().read().cnt()
    }
}

/// Status flags of the capture timer.
#[derive(Copy, Clone)]
pub struct CaptureFlags {
    regs: TimGp16,
}

impl CaptureFlags {
    /// Events for the current interrupt, in the order they happened.
    pub fn take(&self) -> [Option<Event>; 2] {
        let status = self.regs.sr().read();
        // Reading CCR1 clears CC1IF.
        let captured = status.ccif(0).then(|| self.regs.ccr(0).read().ccr());
        let overflowed = status.uif();
        if overflowed {
            self.regs.sr().modify(|reg| reg.set_uif(false));
        }
        capture_interrupt(captured, overflowed)
    }
}

/// Channel 1 input capture on a free-running 16-bit count of the
/// reference clock.
pub struct CaptureUnit<T: GeneralInstance4Channel> {
    timer: Timer<'static, T>,
    psc: u16,
}

impl<T: GeneralInstance4Channel> CaptureUnit<T> {
    pub fn new(timer: Timer<'static, T>, reference: Hertz) -> Self {
        let psc = prescaler(timer.get_clock_frequency(), reference);
        Self { timer, psc }
    }

    pub fn flags(&self) -> CaptureFlags {
        CaptureFlags {
            regs: self.timer.regs_gp16(),
        }
    }
}

impl<T: GeneralInstance4Channel> Capture for CaptureUnit<T> {
    fn init(&mut self, edge: Edge) {
        let regs = self.timer.regs_gp16();
        self.timer.stop();

        regs.psc().write_value(self.psc);
        // Wrap at 16 bits even on the 32-bit timers.
        regs.arr().write(|w| w.set_arr(u16::MAX));
        regs.egr().write(|w| w.set_ug(true));

        self.timer
            .set_input_ti_selection(Channel::Ch1, InputTISelection::Normal);
        let mode = match edge {
            Edge::Rising => InputCaptureMode::Rising,
            Edge::Falling => InputCaptureMode::Falling,
        };
        self.timer.set_input_capture_mode(Channel::Ch1, mode);
    }

    fn start(&mut self) {
        let regs = self.timer.regs_gp16();
        self.timer.reset();
        regs.sr().modify(|reg| {
            reg.set_uif(false);
            reg.set_ccif(0, false);
        });
        self.timer.enable_channel(Channel::Ch1, true);
        self.timer.enable_input_interrupt(Channel::Ch1, true);
        self.timer.enable_update_interrupt(true);
        self.timer.start();
    }

    fn stop(&mut self) {
        self.timer.stop();
        self.timer.enable_input_interrupt(Channel::Ch1, false);
        self.timer.enable_update_interrupt(false);
        self.timer.enable_channel(Channel::Ch1, false);
    }
}

fn exti() -> pac::exti::Cpu {
    pac::EXTI.cpu(0)
}

/// Flip-flop output edges on the sync line.
pub struct SyncEdgeFlags {
    level: Input<'static>,
}

impl SyncEdgeFlags {
    pub fn new(level: Input<'static>) -> Self {
        Self { level }
    }

    /// Clear a pending edge and report its direction.
    pub fn take(&self) -> Option<Event> {
        if !exti().pr(0).read().line(SYNC_LINE) {
            return None;
        }
        exti().pr(0).write(|w| w.set_line(SYNC_LINE, true));

        // Q only moves on a signal edge after D changed, so the level
        // is still the one the edge left behind.
        let edge = if self.level.is_high() {
            Edge::Rising
        } else {
            Edge::Falling
        };
        Some(Event::SyncEdge(edge))
    }
}

/// The flip-flop: D driven by a GPIO, Q watched by an EXTI line.
pub struct SyncLine {
    request: Output<'static>,
}

impl SyncLine {
    pub fn new(request: Output<'static>) -> Self {
        pac::RCC.apb4enr().modify(|w| w.set_syscfgen(true));
        pac::SYSCFG
            .exticr(SYNC_LINE / 4)
            .modify(|w| w.set_exti(SYNC_LINE % 4, SYNC_PORT));
        Self { request }
    }
}

impl SyncInput for SyncLine {
    fn arm(&mut self, edge: Edge) {
        pac::EXTI
            .rtsr(0)
            .modify(|w| w.set_line(SYNC_LINE, edge == Edge::Rising));
        pac::EXTI
            .ftsr(0)
            .modify(|w| w.set_line(SYNC_LINE, edge == Edge::Falling));
        exti().pr(0).write(|w| w.set_line(SYNC_LINE, true));
        exti().imr(0).modify(|w| w.set_line(SYNC_LINE, true));
    }

    fn disarm(&mut self) {
        exti().imr(0).modify(|w| w.set_line(SYNC_LINE, false));
    }

    fn request(&mut self, open: bool) {
        if open {
            self.request.set_high();
        } else {
            self.request.set_low();
        }
    }
}

/// One-pulse timer raising an update event when the gate elapses.
pub struct Gate<T: CoreInstance> {
    timer: Timer<'static, T>,
}

impl<T: CoreInstance> Gate<T> {
    pub fn new(timer: Timer<'static, T>) -> Self {
        timer.regs_core().cr1().modify(|w| w.set_opm(true));
        Self { timer }
    }

    pub fn flags(&self) -> OverflowFlags {
        OverflowFlags {
            regs: self.timer.regs_core(),
        }
    }
}

impl<T: CoreInstance> GateTimer for Gate<T> {
    fn start(&mut self, duration: MillisDurationU32) {
        let ns = u64::from(duration.to_millis()) * 1_000_000;
        let (psc, arr) = one_shot_period(self.timer.get_clock_frequency(), ns);
        let regs = self.timer.regs_core();

        self.timer.stop();
        // An expiry of the previous run is posted before the engine fences
        // the queue.
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
        regs.psc().write_value(psc);
        regs.arr().write(|w| w.set_arr(arr));
        regs.egr().write(|w| w.set_ug(true));
        regs.sr().modify(|reg| reg.set_uif(false));
        self.timer.enable_update_interrupt(true);
        self.timer.start();
    }

    fn stop(&mut self) {
        self.timer.stop();
        self.timer.regs_core().sr().modify(|reg| reg.set_uif(false));
    }
}

/// Sleeps the core until the next interrupt.
pub struct Sleep;

impl Wait for Sleep {
    fn wait(&mut self, pending: &dyn Fn() -> bool) {
        // WFI wakes on a pending interrupt even with PRIMASK set; the
        // handler runs once the critical section ends.
        cortex_m::interrupt::free(|_| {
            if !pending() {
                cortex_m::asm::wfi();
            }
        });
    }
}
