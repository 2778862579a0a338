//! # Robot address module
//!
//! Derives the set of candidate robot addresses to probe during discovery
//! from the operator's connection configuration.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::net::Ipv4Addr;

use serde::{Serialize, Deserialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Lowest valid team number.
pub const MIN_TEAM_NUMBER: u16 = 1;

/// Highest valid team number.
pub const MAX_TEAM_NUMBER: u16 = 9999;

/// UDP port the robot listens for control frames on.
pub const DEFAULT_ROBOT_PORT: u16 = 1110;

/// UDP port the station listens for status frames on.
pub const DEFAULT_LOCAL_PORT: u16 = 1110;

/// UDP port the field-control directive listener binds.
pub const DEFAULT_FMS_PORT: u16 = 1750;

/// Address of a robot controller tethered over USB.
pub const USB_FALLBACK_ADDRESS: Ipv4Addr = Ipv4Addr::new(172, 22, 11, 2);

/// Address of a robot controller behind a bridged Ethernet adapter.
pub const BRIDGE_FALLBACK_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A selected robot endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RobotEndpoint {
    pub address: Ipv4Addr,

    /// Port the robot receives control frames on.
    pub robot_port: u16,

    /// Port the station receives status frames on.
    pub local_port: u16
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How the operator has asked the station to find the robot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionConfig {
    /// Derive candidate addresses from the team number.
    Team { team: u16 },

    /// Probe a single explicit address.
    Direct { address: Ipv4Addr }
}

/// Errors raised while validating a connection configuration.
#[derive(Debug, Error, PartialEq)]
pub enum AddrError {
    #[error("Team number {0} is outside the valid range [1, 9999]")]
    InvalidTeam(u16),

    #[error("\"{0}\" is not a valid IPv4 address")]
    InvalidAddress(String)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ConnectionConfig {
    /// Build a direct-mode configuration from an address string.
    pub fn direct(address: &str) -> Result<Self, AddrError> {
        match address.parse::<Ipv4Addr>() {
            Ok(a) => Ok(ConnectionConfig::Direct { address: a }),
            Err(_) => Err(AddrError::InvalidAddress(address.to_string()))
        }
    }

    /// Check the configuration is self-consistent.
    pub fn validate(&self) -> Result<(), AddrError> {
        match self {
            ConnectionConfig::Team { team } => {
                if *team < MIN_TEAM_NUMBER || *team > MAX_TEAM_NUMBER {
                    Err(AddrError::InvalidTeam(*team))
                }
                else {
                    Ok(())
                }
            },
            ConnectionConfig::Direct { .. } => Ok(())
        }
    }

    /// Produce the ordered candidate address list for discovery probing.
    ///
    /// Team mode yields the derived primary address followed by the USB and
    /// bridged-Ethernet fallbacks. The name-service candidate is not included
    /// here, its lookup is asynchronous and the resolver appends the result
    /// when (and if) it arrives. Direct mode yields the single configured
    /// address.
    pub fn candidates(&self) -> Result<Vec<Ipv4Addr>, AddrError> {
        self.validate()?;

        match self {
            ConnectionConfig::Team { team } => Ok(vec![
                team_primary_address(*team),
                USB_FALLBACK_ADDRESS,
                BRIDGE_FALLBACK_ADDRESS
            ]),
            ConnectionConfig::Direct { address } => Ok(vec![*address])
        }
    }

    /// The mDNS host name of the robot controller, for team mode.
    pub fn name_service_host(&self) -> Option<String> {
        match self {
            ConnectionConfig::Team { team } =>
                Some(format!("roboRIO-{}-FRC.local", team)),
            ConnectionConfig::Direct { .. } => None
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Derive the primary robot address for a team number.
///
/// Team `tthh` maps onto `10.tt.hh.2`, e.g. team 254 onto `10.2.54.2`.
pub fn team_primary_address(team: u16) -> Ipv4Addr {
    Ipv4Addr::new(10, (team / 100) as u8, (team % 100) as u8, 2)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_primary_address() {
        assert_eq!(
            team_primary_address(254),
            Ipv4Addr::new(10, 2, 54, 2)
        );
        assert_eq!(
            team_primary_address(9999),
            Ipv4Addr::new(10, 99, 99, 2)
        );
        assert_eq!(
            team_primary_address(1),
            Ipv4Addr::new(10, 0, 1, 2)
        );
    }

    #[test]
    fn test_team_candidates() {
        let config = ConnectionConfig::Team { team: 9999 };

        assert_eq!(config.candidates().unwrap(), vec![
            Ipv4Addr::new(10, 99, 99, 2),
            Ipv4Addr::new(172, 22, 11, 2),
            Ipv4Addr::new(192, 168, 1, 2)
        ]);
        assert_eq!(
            config.name_service_host().unwrap(),
            "roboRIO-9999-FRC.local"
        );
    }

    #[test]
    fn test_direct_candidates() {
        let config = ConnectionConfig::direct("10.0.0.17").unwrap();

        assert_eq!(config.candidates().unwrap(), vec![
            Ipv4Addr::new(10, 0, 0, 17)
        ]);
        assert_eq!(config.name_service_host(), None);
    }

    #[test]
    fn test_invalid_team() {
        assert_eq!(
            ConnectionConfig::Team { team: 0 }.validate(),
            Err(AddrError::InvalidTeam(0))
        );
        assert_eq!(
            ConnectionConfig::Team { team: 10000 }.candidates(),
            Err(AddrError::InvalidTeam(10000))
        );
        assert!(ConnectionConfig::Team { team: 1 }.validate().is_ok());
        assert!(ConnectionConfig::Team { team: 9999 }.validate().is_ok());
    }

    #[test]
    fn test_invalid_address() {
        assert_eq!(
            ConnectionConfig::direct("not-an-address"),
            Err(AddrError::InvalidAddress("not-an-address".to_string()))
        );
        assert_eq!(
            ConnectionConfig::direct("256.0.0.1"),
            Err(AddrError::InvalidAddress("256.0.0.1".to_string()))
        );
    }
}
