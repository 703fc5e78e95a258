//! Scripted hardware for host tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use fugit::MillisDurationU32;

use crate::display::DisplaySink;
use crate::engine::Peripherals;
use crate::event::{Event, EventSender};
use crate::hal::{Capture, ClockSource, Counter, Edge, GateTimer, SyncInput, Wait};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Unit {
    Signal,
    Reference,
}

impl Unit {
    fn index(self) -> usize {
        match self {
            Unit::Signal => 0,
            Unit::Reference => 1,
        }
    }
}

/// A hardware command observed by the rig.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Call {
    Init(Unit, ClockSource),
    Start(Unit),
    Stop(Unit),
    Clear(Unit),
    CaptureInit(Edge),
    CaptureStart,
    CaptureStop,
    Arm(Edge),
    Disarm,
    Request(bool),
    GateStart(u32),
    GateStop,
}

#[derive(Default)]
struct RigState {
    calls: Vec<Call>,
    values: [u16; 2],
    running: [bool; 2],
}

/// Shared record of every command the engine issued.
#[derive(Clone, Default)]
pub struct Rig {
    state: Rc<RefCell<RigState>>,
}

pub type SimPeripherals = Peripherals<SimCounter, SimCounter, SimCapture, SimSync, SimGate>;

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Native register values the counters report once read.
    pub fn set_values(&self, signal: u16, reference: u16) {
        self.state.borrow_mut().values = [signal, reference];
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn running(&self, unit: Unit) -> bool {
        self.state.borrow().running[unit.index()]
    }

    pub fn peripherals(&self) -> SimPeripherals {
        Peripherals {
            signal: SimCounter {
                unit: Unit::Signal,
                rig: self.clone(),
            },
            reference: SimCounter {
                unit: Unit::Reference,
                rig: self.clone(),
            },
            capture: SimCapture { rig: self.clone() },
            sync: SimSync { rig: self.clone() },
            gate: SimGate { rig: self.clone() },
        }
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

pub struct SimCounter {
    unit: Unit,
    rig: Rig,
}

impl Counter for SimCounter {
    fn init(&mut self, source: ClockSource) {
        self.rig.record(Call::Init(self.unit, source));
    }

    fn start(&mut self) {
        self.rig.state.borrow_mut().running[self.unit.index()] = true;
        self.rig.record(Call::Start(self.unit));
    }

    fn stop(&mut self) {
        self.rig.state.borrow_mut().running[self.unit.index()] = false;
        self.rig.record(Call::Stop(self.unit));
    }

    fn clear(&mut self) {
        self.rig.record(Call::Clear(self.unit));
    }

    fn value(&self) -> u16 {
        let state = self.rig.state.borrow();
        assert!(
            !state.running[self.unit.index()],
            "{:?} counter read while running",
            self.unit
        );
        state.values[self.unit.index()]
    }
}

pub struct SimCapture {
    rig: Rig,
}

impl Capture for SimCapture {
    fn init(&mut self, edge: Edge) {
        self.rig.record(Call::CaptureInit(edge));
    }

    fn start(&mut self) {
        self.rig.record(Call::CaptureStart);
    }

    fn stop(&mut self) {
        self.rig.record(Call::CaptureStop);
    }
}

pub struct SimSync {
    rig: Rig,
}

impl SyncInput for SimSync {
    fn arm(&mut self, edge: Edge) {
        self.rig.record(Call::Arm(edge));
    }

    fn disarm(&mut self) {
        self.rig.record(Call::Disarm);
    }

    fn request(&mut self, open: bool) {
        self.rig.record(Call::Request(open));
    }
}

pub struct SimGate {
    rig: Rig,
}

impl GateTimer for SimGate {
    fn start(&mut self, duration: MillisDurationU32) {
        self.rig.record(Call::GateStart(duration.to_millis()));
    }

    fn stop(&mut self) {
        self.rig.record(Call::GateStop);
    }
}

/// Plays the role of the interrupt handlers: every time the engine
/// suspends with nothing pending, the next batch of events is posted.
pub struct Script<'q, const N: usize> {
    sender: EventSender<'q, N>,
    batches: VecDeque<Vec<Event>>,
}

impl<'q, const N: usize> Script<'q, N> {
    pub fn new(sender: EventSender<'q, N>, batches: Vec<Vec<Event>>) -> Self {
        Self {
            sender,
            batches: batches.into(),
        }
    }

    /// Whether every scripted batch was posted.
    pub fn is_exhausted(&self) -> bool {
        self.batches.is_empty()
    }
}

impl<const N: usize> Wait for Script<'_, N> {
    fn wait(&mut self, pending: &dyn Fn() -> bool) {
        if pending() {
            return;
        }
        let batch = self
            .batches
            .pop_front()
            .expect("session waited with no hardware events left");
        for event in batch {
            self.sender.post(event);
        }
    }
}

/// A display operation observed by [`Screen`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draw {
    Clear,
    Text(String, u8, u8),
}

/// Records what would have been drawn.
#[derive(Default)]
pub struct Screen {
    pub draws: Vec<Draw>,
}

impl DisplaySink for Screen {
    type Error = core::convert::Infallible;

    fn clear_graphics(&mut self) -> Result<(), Self::Error> {
        self.draws.push(Draw::Clear);
        Ok(())
    }

    fn write_text(&mut self, text: &str, column: u8, row: u8) -> Result<(), Self::Error> {
        self.draws.push(Draw::Text(text.to_string(), column, row));
        Ok(())
    }
}
