//! Match clock module
//!
//! Times the phases of a practice match (autonomous, teleop, endgame) and
//! tells state fusion which mode the robot should be in while a match runs.
//! The clock only has authority when the operator has opted in and no field
//! controller is attached, and every transition errs towards disabling.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::time::{Duration, Instant};

use log::info;
use serde::Serialize;
use thiserror::Error;

// Internal
use comms_if::wire::MatchPhase;
use util::module::State;

use crate::params::MatchClockParams;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Match clock module state.
#[derive(Default)]
pub struct MatchClock {
    params: MatchClockParams,

    running: bool,
    paused: bool,
    phase: MatchPhase,

    /// When the current phase elapses, absent while not running or paused.
    deadline: Option<Instant>,

    /// Remaining phase time captured when pausing.
    paused_remaining: Option<Duration>,

    /// Operator enable seen on the previous cycle, for auto-start edges.
    last_enabled: bool,

    // Pending report items raised by operations between cycles
    pending_phase_change: Option<MatchPhase>,
    pending_disable: bool
}

/// Input data to the match clock.
pub struct InputData {
    /// A field-control directive is currently fresh.
    pub fms_attached: bool,

    /// The operator's enable intent, used for the auto-start option.
    pub operator_enabled: bool
}

/// Output data from the match clock.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct OutputData {
    /// True while the clock has mode authority (opted in, running, no field
    /// control present).
    pub active: bool,

    pub phase: MatchPhase,

    /// Whole seconds remaining in the current phase.
    pub seconds_remaining: u16
}

/// Status report for match clock processing.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatusReport {
    /// Set when the clock entered a new phase this cycle.
    pub phase_changed: Option<MatchPhase>,

    /// The clock demands the operator enable be withdrawn.
    pub disable_requested: bool
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during match clock operation.
///
/// The clock currently has no failure modes.
#[derive(Debug, Error)]
pub enum MatchClockError {}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl State for MatchClock {
    type InitData = MatchClockParams;
    type InitError = MatchClockError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MatchClockError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        self.params = init_data;
        Ok(())
    }

    /// Perform cyclic processing of the match clock.
    fn proc(&mut self, now: Instant, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Auto-start on the rising edge of the operator enable while sitting
        // in pre-match
        let enable_edge = input_data.operator_enabled && !self.last_enabled;
        self.last_enabled = input_data.operator_enabled;

        if self.params.enabled
            && self.params.auto_start
            && enable_edge
            && !self.running
            && self.phase == MatchPhase::PreMatch
        {
            info!("Auto-starting practice match on enable");
            self.start(now);
        }

        // Advance through any elapsed phases
        if self.running && !self.paused {
            while let Some(deadline) = self.deadline {
                if now >= deadline {
                    self.advance(deadline);
                }
                else {
                    break
                }
            }
        }

        let report = StatusReport {
            phase_changed: self.pending_phase_change.take(),
            disable_requested: self.pending_disable
        };
        self.pending_disable = false;

        let output = OutputData {
            active: self.params.enabled
                && self.running
                && !input_data.fms_attached,
            phase: self.phase,
            seconds_remaining: self.seconds_remaining(now)
        };

        Ok((output, report))
    }
}

impl MatchClock {
    /// Start the match from pre-match.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return
        }

        info!("Practice match started");

        self.running = true;
        self.paused = false;
        self.paused_remaining = None;
        self.transition(now, MatchPhase::Autonomous);
    }

    /// Stop the match, returning to pre-match and demanding a disable.
    pub fn stop(&mut self, now: Instant) {
        if !self.running {
            return
        }

        info!("Practice match stopped");

        self.running = false;
        self.paused = false;
        self.paused_remaining = None;
        self.pending_disable = true;
        self.transition(now, MatchPhase::PreMatch);
    }

    /// Freeze the clock, demanding a disable.
    pub fn pause(&mut self, now: Instant) {
        if !self.running || self.paused {
            return
        }

        info!("Practice match paused");

        self.paused = true;
        self.paused_remaining = self.deadline
            .map(|d| d.saturating_duration_since(now));
        self.deadline = None;
        self.pending_disable = true;
    }

    /// Resume a paused clock where it left off.
    pub fn resume(&mut self, now: Instant) {
        if !self.running || !self.paused {
            return
        }

        info!("Practice match resumed");

        self.paused = false;
        self.deadline = self.paused_remaining.take().map(|r| now + r);
    }

    /// Return the clock to pre-match without starting a new match.
    pub fn reset(&mut self, now: Instant) {
        let was_running = self.running;

        self.running = false;
        self.paused = false;
        self.paused_remaining = None;
        self.deadline = None;

        if was_running {
            info!("Practice match reset");
            self.pending_disable = true;
        }

        self.transition(now, MatchPhase::PreMatch);
    }

    /// Whole seconds remaining in the current phase.
    fn seconds_remaining(&self, now: Instant) -> u16 {
        let remaining = match (self.paused, self.paused_remaining, self.deadline) {
            (true, Some(r), _) => r,
            (false, _, Some(d)) => d.saturating_duration_since(now),
            _ => Duration::from_secs(0)
        };

        remaining.as_secs_f64().ceil() as u16
    }

    /// Move into a new phase, arming its deadline.
    fn transition(&mut self, now: Instant, phase: MatchPhase) {
        if self.phase != phase {
            info!("Match phase: {:?} -> {:?}", self.phase, phase);
            self.pending_phase_change = Some(phase);
        }

        self.phase = phase;

        let duration_s = match phase {
            MatchPhase::Autonomous => self.params.auto_s,
            MatchPhase::Teleop => self.params.teleop_s,
            MatchPhase::Endgame => self.params.endgame_s,
            MatchPhase::PreMatch | MatchPhase::PostMatch => 0
        };

        self.deadline = if self.running && duration_s > 0 {
            Some(now + Duration::from_secs(duration_s as u64))
        }
        else {
            None
        };
    }

    /// Advance past an elapsed phase deadline.
    ///
    /// Phases with zero configured duration are skipped over; the end of the
    /// match stops the clock and demands a disable.
    fn advance(&mut self, at: Instant) {
        match self.phase {
            MatchPhase::Autonomous => {
                if self.params.teleop_s > 0 {
                    self.transition(at, MatchPhase::Teleop);
                }
                else if self.params.endgame_s > 0 {
                    self.transition(at, MatchPhase::Endgame);
                }
                else {
                    self.stop(at);
                }
            },
            MatchPhase::Teleop => {
                if self.params.endgame_s > 0 {
                    self.transition(at, MatchPhase::Endgame);
                }
                else {
                    self.stop(at);
                }
            },
            MatchPhase::Endgame => self.stop(at),
            MatchPhase::PreMatch | MatchPhase::PostMatch => {
                self.deadline = None;
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
