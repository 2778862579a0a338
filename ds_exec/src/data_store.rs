//! # Data Store

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use comms_if::{
    addr::{AddrError, RobotEndpoint},
    fms::FmsDirective,
    wire::{MatchPhase, RequestType, RobotMode, Station, StatusFlags, StatusFrame}
};

use crate::{
    batt_monitor::{self, BattMonitor, BatteryLevel},
    joystick::JoystickAggregator,
    match_clock::{self, MatchClock},
    state_fusion::{self, StateFusion}
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The user-visible connection state of the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnState {
    Disconnected,
    Discovering,
    Connected,
    ConnectionLost
}

/// A pending operator connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnRequest {
    Connect,
    Disconnect
}

/// Errors surfaced by the executive.
///
/// None of these are fatal to the cycle: they are recorded in the last-error
/// slot, fanned out as events and, for link failures, expressed as a
/// connection state transition.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum DsError {
    #[error("Team number {0} is invalid")]
    InvalidTeam(u16),

    #[error("\"{0}\" is not a valid IPv4 address")]
    InvalidAddress(String),

    #[error("No robot found within the discovery window")]
    NotFound,

    #[error("Robot link lost")]
    LinkLost,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Frame decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String)
}

/// Discrete events fanned out to telemetry subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DsEvent {
    /// The connection state machine moved.
    ConnStateChanged(ConnState),

    /// An error was recorded (also placed in the last-error slot).
    Error(DsError),

    /// The emergency stop latch changed.
    EstopChanged(bool),

    /// The battery alert level changed to warning or critical.
    BatteryAlert { level: BatteryLevel, volts: f64 },

    /// The battery monitor raised or released its forced disable.
    ForceDisableChanged(bool),

    /// The practice match clock moved to a new phase.
    MatchPhaseChanged(MatchPhase)
}

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Global data store for the executable.
///
/// The store is exclusively owned and mutated by the executive; everything
/// leaving it does so as an immutable snapshot through the telemetry server.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    /// Number of cycles per second, set once at initialisation
    pub cycles_per_second: u128,

    // Connection state machine
    pub conn_state: ConnState,

    /// Connect/disconnect request drained by the executive each cycle
    pub conn_request: Option<ConnRequest>,

    /// The selected robot endpoint, present from discovery success until
    /// discovery restarts or the operator disconnects
    pub endpoint: Option<RobotEndpoint>,

    /// Monotonic time of the last valid status frame
    pub last_packet_time: Option<Instant>,

    // Operator intent
    pub operator_enabled: bool,
    pub mode: RobotMode,
    pub station: Station,

    /// Emergency stop latch, cleared only by an explicit operator command
    pub estop: bool,

    /// One-shot request awaiting transmission
    pub pending_request: Option<RequestType>,

    // External authority
    /// The current fresh field-control directive, if any
    pub fms_directive: Option<FmsDirective>,

    // Modules
    pub joysticks: JoystickAggregator,
    pub match_clock: MatchClock,
    pub batt_monitor: BattMonitor,
    pub fusion: StateFusion,

    // Module outputs
    pub match_clock_output: match_clock::OutputData,
    pub batt_output: batt_monitor::OutputData,
    pub control_intent: state_fusion::OutputData,

    // Robot telemetry
    pub robot_status: Option<StatusFlags>,
    pub battery_volts: f64,
    pub cpu_pct: u8,
    pub ram_pct: u8,
    pub disk_pct: u8,
    pub can_util_pct: f64,
    pub can_bus_off: u8,
    pub code_running: bool,
    pub robot_match_phase: Option<MatchPhase>,
    pub robot_seconds_remaining: u16,

    // Network statistics
    pub latency_ms: f64,
    pub packet_loss: f64,
    pub bandwidth_kbps: f64,

    // Events and errors
    /// Events raised during this cycle, drained by the telemetry server
    pub events: Vec<DsEvent>,

    /// The most recent error, for the UI's last-error slot
    pub last_error: Option<DsError>
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ConnState {
    fn default() -> Self {
        ConnState::Disconnected
    }
}

impl ConnState {
    /// The textual state shown in the operator UI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnState::Disconnected => "Disconnected",
            ConnState::Discovering => "Discovering",
            ConnState::Connected => "Connected",
            ConnState::ConnectionLost => "ConnectionLost"
        }
    }
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<AddrError> for DsError {
    fn from(e: AddrError) -> Self {
        match e {
            AddrError::InvalidTeam(t) => DsError::InvalidTeam(t),
            AddrError::InvalidAddress(a) => DsError::InvalidAddress(a)
        }
    }
}

impl DataStore {
    /// Perform actions required at the start of a cycle.
    ///
    /// Clears the event list and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self) {
        self.is_1_hz_cycle = self.cycles_per_second > 0
            && self.num_cycles % self.cycles_per_second == 0;

        self.events.clear();
    }

    /// Move the connection state machine, raising an event on change.
    pub fn set_conn_state(&mut self, state: ConnState) {
        if self.conn_state != state {
            info!("Connection state: {} -> {}", self.conn_state, state);
            self.conn_state = state;
            self.events.push(DsEvent::ConnStateChanged(state));
        }
    }

    /// Latch the emergency stop. The enable is withdrawn at the same time so
    /// that clearing the latch later does not spring the robot back to life.
    pub fn set_estop(&mut self) {
        if !self.estop {
            warn!("Emergency stop latched");
            self.estop = true;
            self.operator_enabled = false;
            self.events.push(DsEvent::EstopChanged(true));
        }
    }

    /// Clear a latched emergency stop. The operator must re-enable
    /// explicitly afterwards.
    pub fn clear_estop(&mut self) {
        if self.estop {
            info!("Emergency stop cleared");
            self.estop = false;
            self.events.push(DsEvent::EstopChanged(false));
        }
    }

    /// Record an error in the last-error slot and raise it as an event.
    pub fn raise_error(&mut self, error: DsError) {
        warn!("{}", error);
        self.last_error = Some(error.clone());
        self.events.push(DsEvent::Error(error));
    }

    /// Zero all telemetry derived from the robot link.
    ///
    /// Called when the watchdog declares the link lost and when the operator
    /// disconnects.
    pub fn zero_link_telemetry(&mut self) {
        self.robot_status = None;
        self.battery_volts = 0.0;
        self.cpu_pct = 0;
        self.ram_pct = 0;
        self.disk_pct = 0;
        self.can_util_pct = 0.0;
        self.can_bus_off = 0;
        self.code_running = false;
        self.robot_match_phase = None;
        self.robot_seconds_remaining = 0;
        self.latency_ms = 0.0;
        self.packet_loss = 0.0;
        self.bandwidth_kbps = 0.0;
    }

    /// Apply a valid status frame to the robot telemetry fields.
    pub fn apply_status_frame(&mut self, frame: &StatusFrame, now: Instant) {
        self.robot_status = Some(frame.status);
        self.battery_volts = frame.battery_volts();
        self.cpu_pct = frame.cpu_pct;
        self.ram_pct = frame.ram_pct;
        self.disk_pct = frame.disk_pct;
        self.can_util_pct = frame.can_util_pct();
        self.can_bus_off = frame.can_bus_off;
        self.code_running = frame.code_running;
        self.robot_match_phase = Some(frame.match_phase);
        self.robot_seconds_remaining = frame.seconds_remaining;
        self.last_packet_time = Some(now);

        self.batt_monitor.update_voltage(now, frame.battery_volts());
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
