#![no_main]
#![no_std]

use freq_meter as _; // global logger + panicking-behavior + memory layout

#[rtic::app(
    device = embassy_stm32::pac,
    // Only hardware tasks, so no dispatchers are needed.
    peripherals = false
)]
mod app {
    use defmt::{debug, info, warn};
    use display_interface_spi::SPIInterface;
    use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
    use embassy_stm32::pac;
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;
    use embassy_stm32::timer::low_level::Timer;
    use embedded_graphics::pixelcolor::{Rgb565, RgbColor};
    use embedded_hal_bus::spi::ExclusiveDevice;
    use freq_core::{
        Config, Engine, Event, EventQueue, EventSender, FrequencyMeter, MeterError,
        NoSignalPolicy, Peripherals, TextPanel,
    };
    use freq_meter::board::{
        self, BoardEngine, CaptureFlags, CaptureUnit, Gate, OverflowFlags, Sleep, SyncEdgeFlags,
        SyncLine, TimerCounter,
    };
    use freq_meter::{Display, Mono, TimerDelay, QUEUE_LEN};
    use fugit::HertzU32;
    use ili9341::Ili9341;
    use rtic_monotonics::Monotonic;

    /// HSI, the clock tree `embassy_stm32::init` sets up by default.
    const SYSCLK_HZ: u32 = 64_000_000;

    // Shared resources go here
    #[shared]
    struct Shared {
        events: EventSender<'static, QUEUE_LEN>,
    }

    // Local resources go here
    #[local]
    struct Local {
        meter: FrequencyMeter<BoardEngine>,
        panel: TextPanel<Display>,
        led: Output<'static>,
        signal_flags: OverflowFlags,
        reference_flags: OverflowFlags,
        capture_flags: CaptureFlags,
        sync_flags: SyncEdgeFlags,
        gate_flags: OverflowFlags,
    }

    #[init(local = [queue: EventQueue<QUEUE_LEN> = EventQueue::new()])]
    fn init(cx: init::Context) -> (Shared, Local) {
        info!("init");

        let p = embassy_stm32::init(Default::default());
        debug!("Clocks set");

        Mono::start(cx.core.SYST, SYSCLK_HZ);

        let mut config = Config::default();
        // Signals with a period up to 8 gates (4 s) still measure.
        config.no_signal = NoSignalPolicy::Report { gates: 8 };
        let wanted = Hertz(config.reference.raw());

        // PE0: TIM4_ETR, synchronized signal. PA0: TIM5_CH1, raw signal.
        board::route_alternate(pac::GPIOE, 0, 2);
        board::route_alternate(pac::GPIOA, 0, 2);

        let signal = TimerCounter::new(Timer::new(p.TIM4), wanted);
        let reference = TimerCounter::new(Timer::new(p.TIM3), wanted);
        let capture = CaptureUnit::new(Timer::new(p.TIM5), wanted);
        let gate = Gate::new(Timer::new(p.TIM6));
        let sync = SyncLine::new(Output::new(p.PE5, Level::Low, Speed::Low));
        let sync_flags = SyncEdgeFlags::new(Input::new(p.PE3, Pull::None));

        config.reference = HertzU32::from_raw(reference.rate().0);
        info!("reference clock: {} Hz", config.reference.raw());

        let signal_flags = signal.overflow_flags();
        let reference_flags = reference.overflow_flags();
        let capture_flags = capture.flags();
        let gate_flags = gate.flags();

        let (sender, receiver) = cx.local.queue.split();
        let engine = Engine::new(
            Peripherals {
                signal,
                reference,
                capture,
                sync,
                gate,
            },
            receiver,
            Sleep,
            config,
        );
        debug!("Engine ready");

        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(16_000_000);
        let spi = Spi::new_blocking(p.SPI1, p.PA5, p.PB5, p.PA6, spi_config);

        let display_cs = Output::new(p.PD14, Level::High, Speed::VeryHigh);
        let dc = Output::new(p.PD15, Level::Low, Speed::VeryHigh);
        let rst = Output::new(p.PB1, Level::Low, Speed::Low);
        let spi_device = ExclusiveDevice::new_no_delay(spi, display_cs).unwrap();
        let mut delay = TimerDelay::new(Timer::new(p.TIM7));

        let interface = SPIInterface::new(spi_device, dc);
        let display = Ili9341::new(
            interface,
            rst,
            &mut delay,
            ili9341::Orientation::Portrait,
            ili9341::DisplaySize240x320,
        )
        .unwrap();
        let panel = TextPanel::new(display, Rgb565::WHITE, Rgb565::BLACK);
        debug!("Display ready");

        let led = Output::new(p.PB0, Level::Low, Speed::Low);

        (
            Shared { events: sender },
            Local {
                meter: FrequencyMeter::new(engine),
                panel,
                led,
                signal_flags,
                reference_flags,
                capture_flags,
                sync_flags,
                gate_flags,
            },
        )
    }

    #[idle(local = [meter, panel, led])]
    fn idle(cx: idle::Context) -> ! {
        info!("idle");

        let period = cx.local.meter.engine().config().gate;
        loop {
            let started = Mono::now();
            cx.local.led.toggle();

            match cx.local.meter.measure_once(cx.local.panel) {
                Ok(_) => {}
                Err(MeterError::Measurement(error)) => warn!("measurement failed: {}", error),
                Err(MeterError::Display(error)) => {
                    warn!("display failed: {}", defmt::Debug2Format(&error))
                }
            }

            // At most one session per gate period.
            let next = started + period;
            while Mono::now() < next {
                cortex_m::asm::wfi();
            }
        }
    }

    #[task(binds = TIM3, priority = 2, shared = [events], local = [reference_flags])]
    fn reference_overflow(mut cx: reference_overflow::Context) {
        if cx.local.reference_flags.acknowledge() {
            cx.shared
                .events
                .lock(|events| events.post(Event::ReferenceOverflow));
        }
    }

    #[task(binds = TIM4, priority = 2, shared = [events], local = [signal_flags])]
    fn signal_overflow(mut cx: signal_overflow::Context) {
        if cx.local.signal_flags.acknowledge() {
            cx.shared
                .events
                .lock(|events| events.post(Event::SignalOverflow));
        }
    }

    #[task(binds = TIM5, priority = 2, shared = [events], local = [capture_flags])]
    fn capture(mut cx: capture::Context) {
        let pending = cx.local.capture_flags.take();
        cx.shared.events.lock(|events| {
            for event in pending.into_iter().flatten() {
                events.post(event);
            }
        });
    }

    #[task(binds = EXTI3, priority = 2, shared = [events], local = [sync_flags])]
    fn sync_edge(mut cx: sync_edge::Context) {
        if let Some(event) = cx.local.sync_flags.take() {
            cx.shared.events.lock(|events| events.post(event));
        }
    }

    #[task(binds = TIM6_DAC, priority = 2, shared = [events], local = [gate_flags])]
    fn gate_expired(mut cx: gate_expired::Context) {
        if cx.local.gate_flags.acknowledge() {
            cx.shared.events.lock(|events| events.post(Event::GateExpired));
        }
    }
}
