//! # Station command processor
//!
//! Applies operator commands to the data store. Commands only ever mutate
//! intent and latches; their effect on the wire is realised by state fusion
//! and the frame emitted later in the same cycle, so a command observed
//! before a tick is always reflected in that tick's frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::time::Instant;

use log::{info, warn};

// Internal
use comms_if::{tc::StationCommand, wire::RequestType};

use crate::data_store::{ConnRequest, DataStore, DsError};

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Execute a station command against the data store.
pub fn exec(ds: &mut DataStore, cmd: &StationCommand, now: Instant) {
    match cmd {
        StationCommand::Enable => {
            if ds.estop {
                warn!("Enable refused, emergency stop is latched");
                ds.raise_error(DsError::Config(
                    "cannot enable while the emergency stop is latched".into()
                ));
            }
            else {
                info!("Operator enable");
                ds.operator_enabled = true;
            }
        },

        StationCommand::Disable => {
            info!("Operator disable");
            ds.operator_enabled = false;
        },

        StationCommand::Estop => ds.set_estop(),

        StationCommand::ClearEstop => ds.clear_estop(),

        StationCommand::SetMode(mode) => {
            info!("Operator mode: {:?}", mode);
            ds.mode = *mode;
        },

        StationCommand::SetStation(station) => {
            info!(
                "Operator station: {:?} {}",
                station.alliance, station.position
            );
            ds.station = *station;
        },

        StationCommand::Reboot => {
            info!("Robot reboot requested");
            ds.pending_request = Some(RequestType::Reboot);
        },

        StationCommand::RestartCode => {
            info!("Robot code restart requested");
            ds.pending_request = Some(RequestType::RestartCode);
        },

        StationCommand::Connect => {
            ds.conn_request = Some(ConnRequest::Connect);
        },

        StationCommand::Disconnect => {
            ds.conn_request = Some(ConnRequest::Disconnect);
        },

        StationCommand::BindJoystick { device_id, slot } => {
            if let Err(e) = ds.joysticks.bind(*device_id, *slot) {
                ds.raise_error(DsError::Config(e.to_string()));
            }
        },

        StationCommand::UnbindJoystick { slot } => {
            if let Err(e) = ds.joysticks.unbind(*slot) {
                ds.raise_error(DsError::Config(e.to_string()));
            }
        },

        StationCommand::MatchStart => ds.match_clock.start(now),
        StationCommand::MatchStop => ds.match_clock.stop(now),
        StationCommand::MatchPause => ds.match_clock.pause(now),
        StationCommand::MatchResume => ds.match_clock.resume(now),
        StationCommand::MatchReset => ds.match_clock.reset(now)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::data_store::DsEvent;
    use comms_if::wire::RobotMode;

    #[test]
    fn test_enable_disable() {
        let mut ds = DataStore::default();
        let now = Instant::now();

        exec(&mut ds, &StationCommand::Enable, now);
        assert!(ds.operator_enabled);

        exec(&mut ds, &StationCommand::Disable, now);
        assert!(!ds.operator_enabled);
    }

    #[test]
    fn test_enable_refused_while_estopped() {
        let mut ds = DataStore::default();
        let now = Instant::now();

        exec(&mut ds, &StationCommand::Estop, now);
        exec(&mut ds, &StationCommand::Enable, now);

        assert!(!ds.operator_enabled);
        assert!(matches!(ds.last_error, Some(DsError::Config(_))));

        // After clearing, enable works again
        exec(&mut ds, &StationCommand::ClearEstop, now);
        exec(&mut ds, &StationCommand::Enable, now);
        assert!(ds.operator_enabled);
    }

    #[test]
    fn test_requests_latch() {
        let mut ds = DataStore::default();
        let now = Instant::now();

        exec(&mut ds, &StationCommand::Reboot, now);
        assert_eq!(ds.pending_request, Some(RequestType::Reboot));

        exec(&mut ds, &StationCommand::RestartCode, now);
        assert_eq!(ds.pending_request, Some(RequestType::RestartCode));
    }

    #[test]
    fn test_mode_and_station() {
        let mut ds = DataStore::default();
        let now = Instant::now();

        exec(&mut ds, &StationCommand::SetMode(RobotMode::Test), now);
        assert_eq!(ds.mode, RobotMode::Test);
    }

    #[test]
    fn test_bad_bind_raises_error() {
        let mut ds = DataStore::default();
        let now = Instant::now();

        exec(
            &mut ds,
            &StationCommand::BindJoystick { device_id: 1, slot: 9 },
            now
        );

        assert!(ds.events.iter().any(|e| matches!(e, DsEvent::Error(_))));
    }
}
