//! The measurement engine: runs one session on real or simulated hardware.

use crate::config::Config;
use crate::error::MeasurementError;
use crate::event::{Event, EventReceiver};
use crate::hal::{Capture, ClockSource, Counter, Edge, GateTimer, SyncInput, Wait};
use crate::mode::MeasurementMode;
use crate::session::{Command, RawSessionOutput, Registers, Session};

/// Runs measurement sessions. Implemented by [`Engine`].
pub trait SessionRunner {
    fn config(&self) -> &Config;

    /// Block until a session of `mode` completes.
    fn run_session(&mut self, mode: MeasurementMode) -> Result<RawSessionOutput, MeasurementError>;
}

/// The hardware a session drives.
pub struct Peripherals<S, R, C, Y, G> {
    /// Counts the synchronized unknown signal.
    pub signal: S,
    /// Counts the reference clock during the synchronized window.
    pub reference: R,
    pub capture: C,
    pub sync: Y,
    pub gate: G,
}

/// Measurement engine.
pub struct Engine<'q, S, R, C, Y, G, W, const N: usize> {
    hw: Peripherals<S, R, C, Y, G>,
    events: EventReceiver<'q, N>,
    waiter: W,
    config: Config,
    /// Events queued before the gate was last restarted. An expiry among
    /// them belongs to the previous gate run.
    gate_fence: usize,
}

impl<'q, S, R, C, Y, G, W, const N: usize> Engine<'q, S, R, C, Y, G, W, N>
where
    S: Counter,
    R: Counter,
    C: Capture,
    Y: SyncInput,
    G: GateTimer,
    W: Wait,
{
    pub fn new(
        hw: Peripherals<S, R, C, Y, G>,
        events: EventReceiver<'q, N>,
        waiter: W,
        config: Config,
    ) -> Self {
        Self {
            hw,
            events,
            waiter,
            config,
            gate_fence: 0,
        }
    }

    pub fn release(self) -> (Peripherals<S, R, C, Y, G>, EventReceiver<'q, N>, W) {
        (self.hw, self.events, self.waiter)
    }

    fn apply(&mut self, commands: &[Command]) {
        for command in commands {
            trace!("command {}", command);
            match *command {
                Command::InitCounters => {
                    self.hw.signal.init(ClockSource::External);
                    self.hw.reference.init(ClockSource::Reference);
                }
                Command::ClearCounters => {
                    self.hw.signal.clear();
                    self.hw.reference.clear();
                }
                Command::StartCounters => {
                    self.hw.signal.start();
                    self.hw.reference.start();
                }
                Command::StopCounters => {
                    self.hw.signal.stop();
                    self.hw.reference.stop();
                }
                Command::ArmSync(edge) => self.hw.sync.arm(edge),
                Command::DisarmSync => self.hw.sync.disarm(),
                Command::RequestWindow(open) => self.hw.sync.request(open),
                Command::StartGate => {
                    self.hw.gate.start(self.config.gate);
                    self.gate_fence = self.events.queued();
                }
                Command::StopGate => self.hw.gate.stop(),
                Command::StartCapture => {
                    self.hw.capture.init(Edge::Rising);
                    self.hw.capture.start();
                }
                Command::StopCapture => self.hw.capture.stop(),
            }
        }
    }

    /// Next event, skipping gate expiries from before the last restart.
    fn next_event(&mut self) -> Option<Event> {
        loop {
            let event = self.events.next()?;
            let stale = self.gate_fence > 0;
            self.gate_fence = self.gate_fence.saturating_sub(1);
            if stale && event == Event::GateExpired {
                debug!("dropping expiry of a restarted gate");
                continue;
            }
            return Some(event);
        }
    }
}

impl<S, R, C, Y, G, W, const N: usize> SessionRunner for Engine<'_, S, R, C, Y, G, W, N>
where
    S: Counter,
    R: Counter,
    C: Capture,
    Y: SyncInput,
    G: GateTimer,
    W: Wait,
{
    fn config(&self) -> &Config {
        &self.config
    }

    fn run_session(&mut self, mode: MeasurementMode) -> Result<RawSessionOutput, MeasurementError> {
        let stale = self.events.clear();
        if stale > 0 {
            warn!("discarded {} events from the previous session", stale);
        }
        self.events.take_dropped();

        let mut session = Session::new(mode, self.config.no_signal);
        debug!("session start: {}", session.mode());
        self.gate_fence = 0;
        self.apply(session.start());

        let outcome = loop {
            let Some(event) = self.next_event() else {
                let events = &self.events;
                self.waiter.wait(&|| events.is_pending());
                continue;
            };

            trace!("event {}", event);
            let commands = session.handle(event);
            self.apply(commands);

            if session.is_finished() {
                // The terminal handler has stopped the counters, so every
                // overflow raised before the stop is queued by now.
                while let Some(event) = self.next_event() {
                    let commands = session.handle(event);
                    self.apply(commands);
                }
                let registers = Registers {
                    signal: self.hw.signal.value(),
                    reference: self.hw.reference.value(),
                };
                break session.finish(registers);
            }
        };

        if self.events.take_dropped() {
            warn!("event queue overflowed during the session");
            return Err(MeasurementError::EventsDropped);
        }
        outcome
    }
}
