//! Per-session state machine.
//!
//! A [`Session`] is created fresh for every measurement. It turns each event
//! into a list of hardware [`Command`]s and never touches the hardware
//! itself. Once finished it is consumed into a [`RawSessionOutput`].

use crate::config::NoSignalPolicy;
use crate::count::{CaptureSample, ExtendedCount};
use crate::error::MeasurementError;
use crate::event::Event;
use crate::hal::Edge;
use crate::mode::MeasurementMode;

/// A hardware action requested by the session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Signal counter on the external clock, reference counter on the reference clock.
    InitCounters,
    ClearCounters,
    StartCounters,
    StopCounters,
    ArmSync(Edge),
    DisarmSync,
    /// Drive the flip-flop data input.
    RequestWindow(bool),
    StartGate,
    StopGate,
    /// Configure the capture unit for rising edges and start it.
    StartCapture,
    StopCapture,
}

const NOTHING: &[Command] = &[];

const SYNC_START: &[Command] = &[
    Command::InitCounters,
    Command::StopCounters,
    Command::ClearCounters,
    Command::ArmSync(Edge::Rising),
    Command::RequestWindow(true),
];
const SYNC_START_WATCHED: &[Command] = &[
    Command::InitCounters,
    Command::StopCounters,
    Command::ClearCounters,
    Command::ArmSync(Edge::Rising),
    Command::RequestWindow(true),
    Command::StartGate,
];
const SYNC_OPEN: &[Command] = &[
    Command::ClearCounters,
    Command::StartCounters,
    Command::ArmSync(Edge::Falling),
    Command::StartGate,
];
const SYNC_GATE_ELAPSED: &[Command] = &[Command::RequestWindow(false)];
const SYNC_GATE_ELAPSED_WATCHED: &[Command] = &[Command::RequestWindow(false), Command::StartGate];
const SYNC_CLOSE: &[Command] = &[
    Command::StopCounters,
    Command::DisarmSync,
    Command::StopGate,
];
const SYNC_ABORT: &[Command] = &[
    Command::StopCounters,
    Command::DisarmSync,
    Command::RequestWindow(false),
    Command::StopGate,
];

const PERIOD_START: &[Command] = &[Command::StartCapture];
const PERIOD_START_WATCHED: &[Command] = &[Command::StartCapture, Command::StartGate];
const PERIOD_CLOSE: &[Command] = &[Command::StopCapture, Command::StopGate];

const WATCHDOG: &[Command] = &[Command::StartGate];

/// What a finished session produced, before any arithmetic.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RawSessionOutput {
    Synchronous {
        signal: ExtendedCount,
        reference: ExtendedCount,
    },
    PeriodCapture(CaptureSample),
}

impl RawSessionOutput {
    pub fn mode(&self) -> MeasurementMode {
        match self {
            RawSessionOutput::Synchronous { .. } => MeasurementMode::Synchronous,
            RawSessionOutput::PeriodCapture(_) => MeasurementMode::PeriodCapture,
        }
    }
}

/// Native register values read once the counters are stopped.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    pub signal: u16,
    pub reference: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum SyncPhase {
    /// Waiting for the flip-flop to open the window.
    Armed,
    /// Window open, gate running.
    Counting,
    /// Gate elapsed, waiting for the flip-flop to close the window.
    Closing,
    Done,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum PeriodPhase {
    AwaitFirst,
    AwaitSecond,
    Done,
}

#[derive(Debug)]
enum State {
    Synchronous {
        phase: SyncPhase,
        signal_overflows: u32,
        reference_overflows: u32,
    },
    PeriodCapture {
        phase: PeriodPhase,
        sample: CaptureSample,
    },
}

/// One measurement session.
#[derive(Debug)]
pub struct Session {
    state: State,
    watchdog_limit: Option<u8>,
    idle_gates: u8,
    failure: Option<MeasurementError>,
}

impl Session {
    pub fn new(mode: MeasurementMode, policy: NoSignalPolicy) -> Self {
        let state = match mode {
            MeasurementMode::Synchronous => State::Synchronous {
                phase: SyncPhase::Armed,
                signal_overflows: 0,
                reference_overflows: 0,
            },
            MeasurementMode::PeriodCapture => State::PeriodCapture {
                phase: PeriodPhase::AwaitFirst,
                sample: CaptureSample::default(),
            },
        };
        let watchdog_limit = match policy {
            NoSignalPolicy::Block => None,
            NoSignalPolicy::Report { gates } => Some(gates.max(1)),
        };

        Self {
            state,
            watchdog_limit,
            idle_gates: 0,
            failure: None,
        }
    }

    pub fn mode(&self) -> MeasurementMode {
        match self.state {
            State::Synchronous { .. } => MeasurementMode::Synchronous,
            State::PeriodCapture { .. } => MeasurementMode::PeriodCapture,
        }
    }

    /// Commands that arm the hardware.
    pub fn start(&self) -> &'static [Command] {
        let watched = self.watchdog_limit.is_some();
        match (&self.state, watched) {
            (State::Synchronous { .. }, false) => SYNC_START,
            (State::Synchronous { .. }, true) => SYNC_START_WATCHED,
            (State::PeriodCapture { .. }, false) => PERIOD_START,
            (State::PeriodCapture { .. }, true) => PERIOD_START_WATCHED,
        }
    }

    pub fn is_finished(&self) -> bool {
        match self.state {
            State::Synchronous { phase, .. } => phase == SyncPhase::Done,
            State::PeriodCapture { phase, .. } => phase == PeriodPhase::Done,
        }
    }

    /// Advance on one event.
    ///
    /// A finished synchronous session still takes overflow events: a wrap
    /// between the closing edge and the counter stop is posted after the
    /// edge but belongs to the window.
    pub fn handle(&mut self, event: Event) -> &'static [Command] {
        let watched = self.watchdog_limit.is_some();
        match &mut self.state {
            State::Synchronous {
                phase,
                signal_overflows,
                reference_overflows,
            } => match (*phase, event) {
                (SyncPhase::Armed, Event::SyncEdge(Edge::Rising)) => {
                    debug!("synchronized window open");
                    *phase = SyncPhase::Counting;
                    *signal_overflows = 0;
                    *reference_overflows = 0;
                    self.idle_gates = 0;
                    SYNC_OPEN
                }
                (
                    SyncPhase::Counting | SyncPhase::Closing | SyncPhase::Done,
                    Event::SignalOverflow,
                ) => {
                    *signal_overflows += 1;
                    NOTHING
                }
                (
                    SyncPhase::Counting | SyncPhase::Closing | SyncPhase::Done,
                    Event::ReferenceOverflow,
                ) => {
                    *reference_overflows += 1;
                    NOTHING
                }
                (SyncPhase::Counting, Event::GateExpired) => {
                    debug!("gate elapsed, closing window");
                    *phase = SyncPhase::Closing;
                    if watched {
                        SYNC_GATE_ELAPSED_WATCHED
                    } else {
                        SYNC_GATE_ELAPSED
                    }
                }
                (SyncPhase::Closing, Event::SyncEdge(Edge::Falling)) => {
                    debug!("synchronized window closed");
                    *phase = SyncPhase::Done;
                    SYNC_CLOSE
                }
                (SyncPhase::Armed, Event::GateExpired) if watched => {
                    self.watchdog(MeasurementError::NoSignal, SYNC_ABORT)
                }
                (SyncPhase::Closing, Event::GateExpired) if watched => {
                    self.watchdog(MeasurementError::NotSynchronized, SYNC_ABORT)
                }
                (phase, event) => {
                    warn!("discarding {} in {}", event, phase);
                    NOTHING
                }
            },
            State::PeriodCapture { phase, sample } => match (*phase, event) {
                (PeriodPhase::AwaitFirst, Event::Captured(stamp)) => {
                    *phase = PeriodPhase::AwaitSecond;
                    sample.first = stamp;
                    sample.overflows = 0;
                    self.idle_gates = 0;
                    // The signal is there; give the second edge a full budget.
                    if watched {
                        WATCHDOG
                    } else {
                        NOTHING
                    }
                }
                (PeriodPhase::AwaitSecond, Event::ReferenceOverflow) => {
                    sample.overflows += 1;
                    NOTHING
                }
                (PeriodPhase::AwaitSecond, Event::Captured(stamp)) => {
                    *phase = PeriodPhase::Done;
                    sample.second = stamp;
                    PERIOD_CLOSE
                }
                (PeriodPhase::AwaitFirst | PeriodPhase::AwaitSecond, Event::GateExpired)
                    if watched =>
                {
                    self.watchdog(MeasurementError::NoSignal, PERIOD_CLOSE)
                }
                // Overflows before the first edge are not part of the period.
                (PeriodPhase::AwaitFirst, Event::ReferenceOverflow) => NOTHING,
                (phase, event) => {
                    warn!("discarding {} in {}", event, phase);
                    NOTHING
                }
            },
        }
    }

    /// Count one idle watchdog period, tearing down once the limit is hit.
    fn watchdog(
        &mut self,
        error: MeasurementError,
        teardown: &'static [Command],
    ) -> &'static [Command] {
        self.idle_gates = self.idle_gates.saturating_add(1);
        let limit = self.watchdog_limit.unwrap_or(u8::MAX);
        if self.idle_gates < limit {
            return WATCHDOG;
        }

        warn!("session gave up after {} gate periods", self.idle_gates);
        self.failure = Some(error);
        match &mut self.state {
            State::Synchronous { phase, .. } => *phase = SyncPhase::Done,
            State::PeriodCapture { phase, .. } => *phase = PeriodPhase::Done,
        }
        teardown
    }

    /// Consume a finished session.
    ///
    /// `registers` is only used in synchronous mode and must be read after
    /// the counters were stopped.
    pub fn finish(self, registers: Registers) -> Result<RawSessionOutput, MeasurementError> {
        debug_assert!(self.is_finished());
        if let Some(error) = self.failure {
            return Err(error);
        }

        Ok(match self.state {
            State::Synchronous {
                signal_overflows,
                reference_overflows,
                ..
            } => RawSessionOutput::Synchronous {
                signal: ExtendedCount::new(signal_overflows, registers.signal),
                reference: ExtendedCount::new(reference_overflows, registers.reference),
            },
            State::PeriodCapture { sample, .. } => RawSessionOutput::PeriodCapture(sample),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(session: &mut Session, events: &[Event]) {
        for event in events {
            session.handle(*event);
        }
    }

    #[test]
    fn synchronous_window_sequence() {
        let mut session = Session::new(MeasurementMode::Synchronous, NoSignalPolicy::Block);
        assert_eq!(session.start(), SYNC_START);

        assert_eq!(session.handle(Event::SyncEdge(Edge::Rising)), SYNC_OPEN);
        assert_eq!(session.handle(Event::SignalOverflow), NOTHING);
        assert_eq!(session.handle(Event::ReferenceOverflow), NOTHING);
        assert_eq!(
            session.handle(Event::GateExpired),
            &[Command::RequestWindow(false)]
        );
        assert!(!session.is_finished());
        assert_eq!(session.handle(Event::ReferenceOverflow), NOTHING);
        assert_eq!(session.handle(Event::SyncEdge(Edge::Falling)), SYNC_CLOSE);
        assert!(session.is_finished());

        let output = session.finish(Registers {
            signal: 1000,
            reference: 2000,
        });
        assert_eq!(
            output,
            Ok(RawSessionOutput::Synchronous {
                signal: ExtendedCount::new(1, 1000),
                reference: ExtendedCount::new(2, 2000),
            })
        );
    }

    #[test]
    fn overflow_after_the_closing_edge_still_counts() {
        let mut session = Session::new(MeasurementMode::Synchronous, NoSignalPolicy::Block);
        run(
            &mut session,
            &[
                Event::SyncEdge(Edge::Rising),
                Event::GateExpired,
                Event::SyncEdge(Edge::Falling),
            ],
        );
        assert!(session.is_finished());

        assert_eq!(session.handle(Event::SignalOverflow), NOTHING);
        assert_eq!(session.handle(Event::GateExpired), NOTHING);
        assert_eq!(
            session.finish(Registers {
                signal: 7,
                reference: 9,
            }),
            Ok(RawSessionOutput::Synchronous {
                signal: ExtendedCount::new(1, 7),
                reference: ExtendedCount::new(0, 9),
            })
        );
    }

    #[test]
    fn synchronous_ignores_events_before_window() {
        let mut session = Session::new(MeasurementMode::Synchronous, NoSignalPolicy::Block);
        run(
            &mut session,
            &[
                Event::SignalOverflow,
                Event::ReferenceOverflow,
                Event::GateExpired,
                Event::SyncEdge(Edge::Falling),
                Event::Captured(5),
            ],
        );
        assert!(!session.is_finished());

        run(
            &mut session,
            &[
                Event::SyncEdge(Edge::Rising),
                Event::GateExpired,
                Event::SyncEdge(Edge::Falling),
            ],
        );
        assert_eq!(
            session.finish(Registers::default()),
            Ok(RawSessionOutput::Synchronous {
                signal: ExtendedCount::new(0, 0),
                reference: ExtendedCount::new(0, 0),
            })
        );
    }

    #[test]
    fn early_falling_edge_does_not_close_window() {
        let mut session = Session::new(MeasurementMode::Synchronous, NoSignalPolicy::Block);
        run(
            &mut session,
            &[Event::SyncEdge(Edge::Rising), Event::SyncEdge(Edge::Falling)],
        );
        assert!(!session.is_finished());
    }

    #[test]
    fn period_sequence_counts_only_inner_overflows() {
        let mut session = Session::new(MeasurementMode::PeriodCapture, NoSignalPolicy::Block);
        assert_eq!(session.start(), PERIOD_START);

        run(
            &mut session,
            &[
                Event::ReferenceOverflow,
                Event::Captured(60_000),
                Event::ReferenceOverflow,
                Event::SignalOverflow,
            ],
        );
        assert!(!session.is_finished());
        assert_eq!(session.handle(Event::Captured(100)), PERIOD_CLOSE);
        assert!(session.is_finished());

        assert_eq!(
            session.finish(Registers::default()),
            Ok(RawSessionOutput::PeriodCapture(CaptureSample {
                first: 60_000,
                second: 100,
                overflows: 1,
            }))
        );
    }

    #[test]
    fn blocking_policy_never_arms_the_watchdog() {
        let mut session = Session::new(MeasurementMode::PeriodCapture, NoSignalPolicy::Block);
        for _ in 0..300 {
            assert_eq!(session.handle(Event::GateExpired), NOTHING);
        }
        assert!(!session.is_finished());
    }

    #[test]
    fn blocking_first_capture_leaves_the_gate_alone() {
        let mut session = Session::new(MeasurementMode::PeriodCapture, NoSignalPolicy::Block);
        assert_eq!(session.handle(Event::Captured(1)), NOTHING);
    }

    #[test]
    fn period_watchdog_reports_no_signal() {
        let mut session = Session::new(
            MeasurementMode::PeriodCapture,
            NoSignalPolicy::Report { gates: 3 },
        );
        assert_eq!(session.start(), PERIOD_START_WATCHED);

        assert_eq!(session.handle(Event::GateExpired), WATCHDOG);
        assert_eq!(session.handle(Event::GateExpired), WATCHDOG);
        assert_eq!(session.handle(Event::GateExpired), PERIOD_CLOSE);
        assert!(session.is_finished());
        assert_eq!(
            session.finish(Registers::default()),
            Err(MeasurementError::NoSignal)
        );
    }

    #[test]
    fn first_capture_resets_the_watchdog() {
        let mut session = Session::new(
            MeasurementMode::PeriodCapture,
            NoSignalPolicy::Report { gates: 2 },
        );
        assert_eq!(session.handle(Event::GateExpired), WATCHDOG);
        assert_eq!(session.handle(Event::Captured(1)), WATCHDOG);
        assert_eq!(session.handle(Event::GateExpired), WATCHDOG);
        assert!(!session.is_finished());
        session.handle(Event::Captured(2));
        assert_eq!(
            session.finish(Registers::default()),
            Ok(RawSessionOutput::PeriodCapture(CaptureSample {
                first: 1,
                second: 2,
                overflows: 0,
            }))
        );
    }

    #[test]
    fn zero_gate_limit_acts_as_one() {
        let mut session = Session::new(
            MeasurementMode::Synchronous,
            NoSignalPolicy::Report { gates: 0 },
        );
        assert_eq!(session.handle(Event::GateExpired), SYNC_ABORT);
        assert_eq!(
            session.finish(Registers::default()),
            Err(MeasurementError::NoSignal)
        );
    }

    #[test]
    fn window_that_never_closes_is_reported() {
        let mut session = Session::new(
            MeasurementMode::Synchronous,
            NoSignalPolicy::Report { gates: 1 },
        );
        assert_eq!(session.start(), SYNC_START_WATCHED);
        run(&mut session, &[Event::SyncEdge(Edge::Rising)]);
        assert_eq!(session.handle(Event::GateExpired), SYNC_GATE_ELAPSED_WATCHED);
        assert_eq!(session.handle(Event::GateExpired), SYNC_ABORT);
        assert_eq!(
            session.finish(Registers::default()),
            Err(MeasurementError::NotSynchronized)
        );
    }

    #[test]
    fn events_after_the_end_are_ignored() {
        let mut session = Session::new(MeasurementMode::PeriodCapture, NoSignalPolicy::Block);
        run(&mut session, &[Event::Captured(10), Event::Captured(20)]);
        assert_eq!(session.handle(Event::Captured(30)), NOTHING);
        assert_eq!(session.handle(Event::ReferenceOverflow), NOTHING);
        assert_eq!(
            session.finish(Registers::default()),
            Ok(RawSessionOutput::PeriodCapture(CaptureSample {
                first: 10,
                second: 20,
                overflows: 0,
            }))
        );
    }
}
