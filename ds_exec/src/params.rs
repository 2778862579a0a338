//! Parameters for the driver station executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use comms_if::addr::{
    ConnectionConfig, DEFAULT_FMS_PORT, DEFAULT_LOCAL_PORT, DEFAULT_ROBOT_PORT
};

use crate::data_store::DsError;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for the driver station executable, normally loaded from
/// `ds_exec.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DsExecParams {
    #[serde(default)]
    pub connection: ConnectionParams,

    #[serde(default)]
    pub network: NetworkParams,

    #[serde(default)]
    pub match_clock: MatchClockParams,

    #[serde(default)]
    pub battery: BattMonitorParams
}

/// How the robot is to be located.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Either "team" or "direct".
    pub mode: String,

    /// Team number used in "team" mode.
    pub team: u16,

    /// Explicit IPv4 address used in "direct" mode.
    pub address: String
}

/// Network ports and loop timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    /// Port the robot receives control frames on.
    pub robot_port: u16,

    /// Port the station binds for status frames. Zero selects an ephemeral
    /// port, which the tests use to run many stations on one host.
    pub local_port: u16,

    /// Port the field-control listener binds.
    pub fms_port: u16,

    /// Whether to listen for field-control directives at all.
    pub fms_enabled: bool,

    /// Period of the send tick in milliseconds.
    pub send_interval_ms: u64,

    /// Telemetry silence after which the link is declared lost.
    pub watchdog_timeout_ms: u64,

    /// Total time discovery may spend probing before reporting failure.
    pub discovery_window_ms: u64,

    /// Minimum gap between a failed discovery and the next probe.
    pub discovery_cooldown_ms: u64
}

/// Practice match clock configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchClockParams {
    /// The operator has opted in to the practice match clock.
    pub enabled: bool,

    /// Start the clock on the first enable while in pre-match.
    pub auto_start: bool,

    /// Autonomous phase duration in seconds.
    pub auto_s: u16,

    /// Teleop phase duration in seconds.
    pub teleop_s: u16,

    /// Endgame phase duration in seconds.
    pub endgame_s: u16
}

/// Battery monitor thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BattMonitorParams {
    /// At or below this voltage the battery is critical.
    pub critical_volts: f64,

    /// At or below this voltage the battery is in warning.
    pub warning_volts: f64,

    /// Force a disable when the 2 s average sits at or below critical.
    pub auto_disable: bool
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ConnectionParams {
    /// Build the validated connection configuration.
    pub fn config(&self) -> Result<ConnectionConfig, DsError> {
        let config = match self.mode.as_str() {
            "team" => ConnectionConfig::Team { team: self.team },
            "direct" => ConnectionConfig::direct(&self.address)
                .map_err(DsError::from)?,
            m => return Err(DsError::Config(format!(
                "connection mode must be \"team\" or \"direct\", got \"{}\"", m
            )))
        };

        config.validate().map_err(DsError::from)?;

        Ok(config)
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            mode: "team".to_string(),
            team: 0,
            address: String::new()
        }
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            robot_port: DEFAULT_ROBOT_PORT,
            local_port: DEFAULT_LOCAL_PORT,
            fms_port: DEFAULT_FMS_PORT,
            fms_enabled: false,
            send_interval_ms: 20,
            watchdog_timeout_ms: 3000,
            discovery_window_ms: 5000,
            discovery_cooldown_ms: 1000
        }
    }
}

impl Default for MatchClockParams {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_start: false,
            auto_s: 15,
            teleop_s: 135,
            endgame_s: 30
        }
    }
}

impl Default for BattMonitorParams {
    fn default() -> Self {
        Self {
            critical_volts: 10.5,
            warning_volts: 11.5,
            auto_disable: true
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_partial_toml() {
        let params: DsExecParams = util::params::load_str("
            [connection]
            mode = \"team\"
            team = 254

            [network]
            watchdog_timeout_ms = 2000
        ").unwrap();

        assert_eq!(params.connection.team, 254);
        assert_eq!(params.network.watchdog_timeout_ms, 2000);

        // Unset values take their defaults
        assert_eq!(params.network.send_interval_ms, 20);
        assert_eq!(params.match_clock.auto_s, 15);
        assert!((params.battery.critical_volts - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_connection_config() {
        let params = ConnectionParams {
            mode: "team".to_string(),
            team: 1678,
            address: String::new()
        };
        assert_eq!(
            params.config().unwrap(),
            ConnectionConfig::Team { team: 1678 }
        );

        let params = ConnectionParams {
            mode: "direct".to_string(),
            team: 0,
            address: "10.0.0.2".to_string()
        };
        assert!(matches!(
            params.config().unwrap(),
            ConnectionConfig::Direct { .. }
        ));

        let params = ConnectionParams {
            mode: "psychic".to_string(),
            team: 0,
            address: String::new()
        };
        assert!(matches!(params.config(), Err(DsError::Config(_))));

        // Default params are team mode with no team set, which must refuse
        assert!(matches!(
            ConnectionParams::default().config(),
            Err(DsError::InvalidTeam(0))
        ));
    }
}
