//! # Station command module
//!
//! Defines the commands an operator (UI shell, remote console or command
//! script) can issue to the driver station executive.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde_json::{self, Value};
use thiserror::Error;

// Internal
use crate::wire::{Alliance, RobotMode, Station};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command issued by the operator to the station executive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StationCommand {
    /// Permit robot actuation.
    Enable,

    /// Withdraw the enable.
    Disable,

    /// Latch the emergency stop.
    Estop,

    /// Clear a latched emergency stop.
    ClearEstop,

    /// Select the robot operating mode.
    SetMode(RobotMode),

    /// Select the alliance station reported to the robot.
    SetStation(Station),

    /// Ask the robot controller to reboot.
    Reboot,

    /// Ask the robot controller to restart user code.
    RestartCode,

    /// Begin discovery of the configured robot.
    Connect,

    /// Drop the link and stop sending.
    Disconnect,

    /// Bind an input device into a joystick slot.
    BindJoystick { device_id: u32, slot: usize },

    /// Clear a joystick slot.
    UnbindJoystick { slot: usize },

    /// Start the practice match clock.
    MatchStart,

    /// Stop the practice match clock and return to pre-match.
    MatchStop,

    /// Pause the practice match clock, disabling the robot.
    MatchPause,

    /// Resume a paused practice match clock.
    MatchResume,

    /// Reset the practice match clock to pre-match.
    MatchReset
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Command has an invalid type ({0})")]
    InvalidType(String),

    #[error("Command of type {0} has an invalid payload: {1}")]
    InvalidPayload(String, String)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StationCommand {

    /// Parse a new command from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, CommandParseError> {
        // Parse the JSON string into a value
        let val: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Err(CommandParseError::InvalidJson(e))
        };

        // Get the type of the command
        let cmd_type = match val["type"].as_str() {
            Some(s) => s,
            None => return Err(CommandParseError::InvalidType(String::from(
                "Expected \"type\" to be a string"
            )))
        };

        match cmd_type {
            "ENABLE" => Ok(StationCommand::Enable),
            "DISABLE" => Ok(StationCommand::Disable),
            "ESTOP" => Ok(StationCommand::Estop),
            "CLEAR_ESTOP" => Ok(StationCommand::ClearEstop),
            "REBOOT" => Ok(StationCommand::Reboot),
            "RESTART_CODE" => Ok(StationCommand::RestartCode),
            "CONNECT" => Ok(StationCommand::Connect),
            "DISCONNECT" => Ok(StationCommand::Disconnect),
            "MATCH_START" => Ok(StationCommand::MatchStart),
            "MATCH_STOP" => Ok(StationCommand::MatchStop),
            "MATCH_PAUSE" => Ok(StationCommand::MatchPause),
            "MATCH_RESUME" => Ok(StationCommand::MatchResume),
            "MATCH_RESET" => Ok(StationCommand::MatchReset),
            "MODE" => Self::parse_mode(&val),
            "STATION" => Self::parse_station(&val),
            "BIND" => Self::parse_bind(&val),
            "UNBIND" => Self::parse_unbind(&val),
            t => Err(CommandParseError::InvalidType(format!(
                "{} is not a recognised command type", t
            )))
        }
    }

    fn parse_mode(val: &Value) -> Result<Self, CommandParseError> {
        let mode_str = val["payload"]["mode"].as_str().ok_or_else(||
            CommandParseError::InvalidPayload(
                "MODE".into(),
                "expected \"mode\" to be a string".into()
            )
        )?;

        match RobotMode::from_str(mode_str) {
            Some(m) => Ok(StationCommand::SetMode(m)),
            None => Err(CommandParseError::InvalidPayload(
                "MODE".into(),
                format!("{} is not a recognised mode", mode_str)
            ))
        }
    }

    fn parse_station(val: &Value) -> Result<Self, CommandParseError> {
        let alliance = match val["payload"]["alliance"].as_str() {
            Some("RED") => Alliance::Red,
            Some("BLUE") => Alliance::Blue,
            _ => return Err(CommandParseError::InvalidPayload(
                "STATION".into(),
                "expected \"alliance\" to be \"RED\" or \"BLUE\"".into()
            ))
        };

        let position = val["payload"]["position"].as_u64().ok_or_else(||
            CommandParseError::InvalidPayload(
                "STATION".into(),
                "expected \"position\" to be an integer".into()
            )
        )?;

        if position < 1 || position > 3 {
            return Err(CommandParseError::InvalidPayload(
                "STATION".into(),
                format!("position {} is out of range", position)
            ))
        }

        match Station::new(alliance, position as u8) {
            Some(s) => Ok(StationCommand::SetStation(s)),
            None => Err(CommandParseError::InvalidPayload(
                "STATION".into(),
                format!("position {} is out of range", position)
            ))
        }
    }

    fn parse_bind(val: &Value) -> Result<Self, CommandParseError> {
        let device_id = val["payload"]["device"].as_u64().ok_or_else(||
            CommandParseError::InvalidPayload(
                "BIND".into(),
                "expected \"device\" to be an integer".into()
            )
        )?;

        let slot = val["payload"]["slot"].as_u64().ok_or_else(||
            CommandParseError::InvalidPayload(
                "BIND".into(),
                "expected \"slot\" to be an integer".into()
            )
        )?;

        if device_id > u32::MAX as u64 {
            return Err(CommandParseError::InvalidPayload(
                "BIND".into(),
                format!("device id {} is out of range", device_id)
            ))
        }

        Ok(StationCommand::BindJoystick {
            device_id: device_id as u32,
            slot: slot as usize
        })
    }

    fn parse_unbind(val: &Value) -> Result<Self, CommandParseError> {
        let slot = val["payload"]["slot"].as_u64().ok_or_else(||
            CommandParseError::InvalidPayload(
                "UNBIND".into(),
                "expected \"slot\" to be an integer".into()
            )
        )?;

        Ok(StationCommand::UnbindJoystick { slot: slot as usize })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
