//! State fusion module
//!
//! Folds operator intent, the connection state machine, safety latches and
//! the external mode authorities (field control, match clock) into the
//! control flags carried by this tick's outgoing frame.
//!
//! The enable/mode source is chosen first (field control when attached, then
//! the match clock's phase, then the operator), and the safety clamps are
//! applied on top so that nothing can out-rank a disable: frames while not
//! connected, while the emergency stop is latched or while the battery
//! monitor demands it always carry `enabled = 0`.
//!
//! One-shot reboot/restart requests are not fused here: they are latched in
//! the data store and drained into a frame at emission, so a request is
//! never consumed without a frame actually carrying it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

// Internal
use comms_if::{
    fms::FmsDirective,
    wire::{ControlFlags, MatchPhase, RobotMode, Station}
};
use util::module::State;

use crate::data_store::ConnState;
use crate::match_clock;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// State fusion module state.
///
/// Fusion is a pure function of its inputs, the struct only exists to fit
/// the cyclic module shape.
#[derive(Default)]
pub struct StateFusion {}

/// Input data to state fusion.
pub struct InputData {
    pub conn_state: ConnState,

    /// The emergency stop latch.
    pub estop: bool,

    /// The battery monitor's forced disable.
    pub battery_force_disable: bool,

    pub operator_enabled: bool,
    pub operator_mode: RobotMode,
    pub station: Station,

    /// The current fresh field-control directive, if any.
    pub fms: Option<FmsDirective>,

    /// This cycle's match clock output.
    pub match_clock: match_clock::OutputData
}

/// Output data from state fusion: the fused control intent.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct OutputData {
    pub flags: ControlFlags,
    pub station: Station
}

/// Status report for state fusion processing.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatusReport {
    /// A field-control directive supplied the enable/mode this cycle.
    pub fms_override: bool,

    /// The match clock dictated the mode this cycle.
    pub clock_override: bool,

    /// A safety clamp withdrew the enable this cycle.
    pub safety_disable: bool
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during state fusion.
///
/// Fusion currently has no failure modes.
#[derive(Debug, Error)]
pub enum FusionError {}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl State for StateFusion {
    type InitData = ();
    type InitError = FusionError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = FusionError;

    fn init(&mut self, _init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        Ok(())
    }

    /// Fuse this cycle's inputs into the outgoing control intent.
    ///
    /// Fusion is the one cyclic module with no use for the clock: the
    /// time-dependent authorities (match clock, directive freshness) are
    /// resolved before their outputs arrive here.
    fn proc(&mut self, _now: Instant, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let mut report = StatusReport::default();

        let mut flags = ControlFlags::default();
        flags.ds_attached = true;

        // Select the enable/mode authority: an attached field controller
        // overrides the operator
        let (enabled, mode) = match &input_data.fms {
            Some(directive) if directive.attached => {
                report.fms_override = true;
                flags.field_attached = true;
                (directive.enabled, directive.mode)
            },
            _ => (input_data.operator_enabled, input_data.operator_mode)
        };

        flags.enabled = enabled;
        flags.set_mode(mode);

        // An active match clock dictates the mode from its phase. The clock
        // is never active while a field controller is attached.
        if input_data.match_clock.active {
            report.clock_override = true;

            match input_data.match_clock.phase {
                MatchPhase::PreMatch | MatchPhase::PostMatch => {
                    flags.enabled = false;
                },
                MatchPhase::Autonomous => {
                    flags.set_mode(RobotMode::Autonomous);
                },
                MatchPhase::Teleop | MatchPhase::Endgame => {
                    flags.set_mode(RobotMode::Teleop);
                }
            }
        }

        // Safety clamps, nothing below may re-enable

        if input_data.conn_state != ConnState::Connected {
            flags.enabled = false;
        }

        if input_data.estop {
            flags.enabled = false;
            flags.emergency_stop = true;
            report.safety_disable = true;
        }

        if input_data.battery_force_disable {
            flags.enabled = false;
            report.safety_disable = true;
        }

        let output = OutputData {
            flags,
            station: input_data.station
        };

        Ok((output, report))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::wire::{Alliance, Station};

    fn fusion() -> StateFusion {
        let mut fusion = StateFusion::default();
        fusion.init(()).unwrap();
        fusion
    }

    fn proc(fusion: &mut StateFusion, input: &InputData) -> (OutputData, StatusReport) {
        fusion.proc(Instant::now(), input).unwrap()
    }

    fn base_input() -> InputData {
        InputData {
            conn_state: ConnState::Connected,
            estop: false,
            battery_force_disable: false,
            operator_enabled: true,
            operator_mode: RobotMode::Teleop,
            station: Station::new(Alliance::Red, 2).unwrap(),
            fms: None,
            match_clock: match_clock::OutputData::default()
        }
    }

    #[test]
    fn test_operator_intent_passes_through() {
        let (out, report) = proc(&mut fusion(), &base_input());

        assert!(out.flags.enabled);
        assert!(out.flags.ds_attached);
        assert!(!out.flags.field_attached);
        assert_eq!(out.flags.mode(), RobotMode::Teleop);
        assert_eq!(out.station.to_byte(), 1);
        assert!(!report.safety_disable);
    }

    #[test]
    fn test_disabled_when_not_connected() {
        for state in [
            ConnState::Disconnected,
            ConnState::Discovering,
            ConnState::ConnectionLost
        ].iter() {
            let mut input = base_input();
            input.conn_state = *state;

            let (out, _) = proc(&mut fusion(), &input);
            assert!(!out.flags.enabled, "enabled while {:?}", state);
        }
    }

    #[test]
    fn test_estop_dominance() {
        let mut input = base_input();
        input.estop = true;

        // Even a field controller demanding enable cannot beat the latch
        input.fms = Some(FmsDirective {
            attached: true,
            enabled: true,
            mode: RobotMode::Autonomous,
            match_number: 1,
            match_type: "Practice".to_string()
        });

        let (out, report) = proc(&mut fusion(), &input);
        assert!(!out.flags.enabled);
        assert!(out.flags.emergency_stop);
        assert!(report.safety_disable);
    }

    #[test]
    fn test_battery_force_disable() {
        let mut input = base_input();
        input.battery_force_disable = true;

        let (out, report) = proc(&mut fusion(), &input);
        assert!(!out.flags.enabled);
        assert!(report.safety_disable);
    }

    #[test]
    fn test_fms_override() {
        let mut input = base_input();
        input.operator_enabled = false;
        input.operator_mode = RobotMode::Test;
        input.fms = Some(FmsDirective {
            attached: true,
            enabled: true,
            mode: RobotMode::Autonomous,
            match_number: 12,
            match_type: "Qualification".to_string()
        });

        let (out, report) = proc(&mut fusion(), &input);
        assert!(out.flags.enabled);
        assert!(out.flags.field_attached);
        assert_eq!(out.flags.mode(), RobotMode::Autonomous);
        assert!(report.fms_override);
    }

    #[test]
    fn test_match_clock_dictates_mode() {
        let phase_mode = |phase: MatchPhase| {
            let mut input = base_input();
            input.match_clock = match_clock::OutputData {
                active: true,
                phase,
                seconds_remaining: 10
            };
            proc(&mut fusion(), &input).0.flags
        };

        assert_eq!(
            phase_mode(MatchPhase::Autonomous).mode(),
            RobotMode::Autonomous
        );
        assert_eq!(phase_mode(MatchPhase::Teleop).mode(), RobotMode::Teleop);
        assert_eq!(phase_mode(MatchPhase::Endgame).mode(), RobotMode::Teleop);
        assert!(!phase_mode(MatchPhase::PreMatch).enabled);
        assert!(!phase_mode(MatchPhase::PostMatch).enabled);
    }

    #[test]
    fn test_mode_exclusivity() {
        let mut input = base_input();
        input.operator_mode = RobotMode::Test;

        let (out, _) = proc(&mut fusion(), &input);
        assert!(out.flags.test);
        assert!(!out.flags.autonomous);
    }
}
