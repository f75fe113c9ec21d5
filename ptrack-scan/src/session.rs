//! Scan session state machine
//!
//! A session exists from the moment a station and mode are chosen until the
//! operator leaves the scan screen.
//!
//! ```text
//!            begin()                finish()
//!   Idle ───────────────► Busy ────────────────► Settling{until, then}
//!    ▲                     │                         │
//!    │                     └─► AwaitingDismissal ────┤ dismiss()
//!    │                                               ▼
//!    └────────────── settle elapsed (Resume) ─── Settling
//!                    settle elapsed (Exit)  ───► Closed
//! ```
//!
//! Only an idle session can mint a [`Flight`]; only the matching flight can
//! release the busy state. That is the single-flight guarantee: at most one
//! submission per session is ever in flight.

use crate::debounce::Debouncer;
use crate::queue::ContinuousQueue;
use crate::tasks::TaskLedger;
use ptrack_common::events::ExitReason;
use ptrack_common::{ProcessType, ScanMode};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// What happens when a settle delay runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterSettle {
    /// Back to idle, keep scanning
    Resume,
    /// Leave the scan screen
    Exit(ExitReason),
}

/// Current phase of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Ready for the next decode
    Idle,
    /// A submission for `code` is in flight
    Busy { code: String, since: Instant },
    /// Cool-down before the next decode is accepted
    Settling { until: Instant, then: AfterSettle },
    /// Blocking notice shown, waiting for the operator
    AwaitingDismissal { code: String },
    /// Session over; late results are ignored
    Closed(ExitReason),
}

/// Ticket for the one in-flight submission of a session
///
/// Not `Clone`: exactly one exists per busy period.
#[derive(Debug, PartialEq, Eq)]
pub struct Flight {
    pub session_id: Uuid,
    pub generation: u64,
    pub code: String,
}

/// One active scanning context
#[derive(Debug)]
pub struct ScanSession {
    id: Uuid,
    generation: u64,
    process: ProcessType,
    mode: ScanMode,
    phase: SessionPhase,
    debouncer: Debouncer,
    queue: ContinuousQueue,
    tasks: TaskLedger,
}

impl ScanSession {
    pub fn new(process: ProcessType, mode: ScanMode, generation: u64, debounce_window: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            process,
            mode,
            phase: SessionPhase::Idle,
            debouncer: Debouncer::new(debounce_window),
            queue: ContinuousQueue::new(),
            tasks: TaskLedger::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn process(&self) -> ProcessType {
        self.process
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn debouncer_mut(&mut self) -> &mut Debouncer {
        &mut self.debouncer
    }

    pub fn queue(&self) -> &ContinuousQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut ContinuousQueue {
        &mut self.queue
    }

    pub fn tasks(&self) -> &TaskLedger {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskLedger {
        &mut self.tasks
    }

    pub fn is_idle(&self) -> bool {
        self.phase == SessionPhase::Idle
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, SessionPhase::Busy { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, SessionPhase::Closed(_))
    }

    /// Enter the busy state for `code`; `None` unless idle
    pub fn begin(&mut self, code: &str, now: Instant) -> Option<Flight> {
        if !self.is_idle() {
            return None;
        }
        self.phase = SessionPhase::Busy {
            code: code.to_string(),
            since: now,
        };
        Some(Flight {
            session_id: self.id,
            generation: self.generation,
            code: code.to_string(),
        })
    }

    /// Whether `flight` was minted by this session and is the one in flight
    pub fn owns(&self, flight: &Flight) -> bool {
        flight.session_id == self.id
            && flight.generation == self.generation
            && matches!(&self.phase, SessionPhase::Busy { code, .. } if *code == flight.code)
    }

    /// Leave the busy state into a cool-down
    pub fn settle(&mut self, flight: Flight, delay: Duration, then: AfterSettle, now: Instant) -> bool {
        if !self.owns(&flight) {
            return false;
        }
        self.phase = SessionPhase::Settling {
            until: now + delay,
            then,
        };
        true
    }

    /// Leave the busy state into a blocking notice
    pub fn block(&mut self, flight: Flight) -> bool {
        if !self.owns(&flight) {
            return false;
        }
        self.phase = SessionPhase::AwaitingDismissal { code: flight.code };
        true
    }

    /// Operator dismissed the blocking notice
    pub fn dismiss(&mut self, delay: Duration, now: Instant) -> bool {
        if !matches!(self.phase, SessionPhase::AwaitingDismissal { .. }) {
            return false;
        }
        self.phase = SessionPhase::Settling {
            until: now + delay,
            then: AfterSettle::Resume,
        };
        true
    }

    /// Cool-down that does not follow a flight (batch upload)
    pub fn schedule(&mut self, delay: Duration, then: AfterSettle, now: Instant) {
        if !self.is_closed() {
            self.phase = SessionPhase::Settling {
                until: now + delay,
                then,
            };
        }
    }

    /// Advance an elapsed cool-down; returns the exit reason if the session closed
    pub fn poll(&mut self, now: Instant) -> Option<ExitReason> {
        let SessionPhase::Settling { until, then } = self.phase else {
            return None;
        };
        if now < until {
            return None;
        }
        match then {
            AfterSettle::Resume => {
                self.phase = SessionPhase::Idle;
                None
            }
            AfterSettle::Exit(reason) => {
                self.phase = SessionPhase::Closed(reason);
                Some(reason)
            }
        }
    }

    /// When the current cool-down ends, if any
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            SessionPhase::Settling { until, .. } => Some(until),
            _ => None,
        }
    }

    pub fn close(&mut self, reason: ExitReason) {
        self.phase = SessionPhase::Closed(reason);
    }
}
