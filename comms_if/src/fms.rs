//! # Field-control directive module
//!
//! When a field controller is present on the network it periodically sends
//! the station a directive snapshot which overrides operator enable and mode
//! authority. Directives arrive as JSON datagrams on the field-control port.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use thiserror::Error;

// Internal
use crate::wire::RobotMode;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A snapshot of the field controller's demands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FmsDirective {
    /// The field controller considers itself attached to this station.
    pub attached: bool,

    /// The field controller demands the robot be enabled.
    pub enabled: bool,

    /// The mode the field controller demands.
    pub mode: RobotMode,

    /// Current match number.
    pub match_number: i32,

    /// Current match type, e.g. "Qualification".
    pub match_type: String
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible directive parsing errors.
#[derive(Debug, Error)]
pub enum DirectiveParseError {
    #[error("Directive contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Directive is not valid UTF-8")]
    NonUtf8
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FmsDirective {
    /// Parse a directive from a received datagram.
    pub fn from_datagram(data: &[u8]) -> Result<Self, DirectiveParseError> {
        let json_str = std::str::from_utf8(data)
            .map_err(|_| DirectiveParseError::NonUtf8)?;

        serde_json::from_str(json_str)
            .map_err(|e| DirectiveParseError::InvalidJson(e))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_directive() {
        let directive = FmsDirective::from_datagram(
            br#"{
                "attached": true,
                "enabled": true,
                "mode": "AUTO",
                "match_number": 42,
                "match_type": "Qualification"
            }"#
        ).unwrap();

        assert_eq!(directive, FmsDirective {
            attached: true,
            enabled: true,
            mode: RobotMode::Autonomous,
            match_number: 42,
            match_type: "Qualification".to_string()
        });
    }

    #[test]
    fn test_invalid_directives() {
        assert!(matches!(
            FmsDirective::from_datagram(b"nope"),
            Err(DirectiveParseError::InvalidJson(_))
        ));
        assert!(matches!(
            FmsDirective::from_datagram(&[0xFF, 0xFE]),
            Err(DirectiveParseError::NonUtf8)
        ));
    }
}
