//! # Driver station library.
//!
//! This library exposes the driver station executive so that it can be driven
//! cycle-by-cycle by tests or embedded underneath an operator UI shell. The
//! `ds_exec` binary wraps [`exec::DsExec`] in a real-time 50 Hz loop.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Battery monitor - classifies robot battery voltage and forces a disable on
/// sustained critical readings.
pub mod batt_monitor;

/// Communications client - owns the UDP socket, sequence numbering and
/// network statistics.
pub mod comms_client;

/// Central data store for the executive.
pub mod data_store;

/// The cyclic executive itself.
pub mod exec;

/// Field-control client - receives directives from a field controller.
pub mod fms_client;

/// Joystick aggregator - binds operator input devices into the six frame
/// slots.
pub mod joystick;

/// Match clock - drives timed mode transitions during practice matches.
pub mod match_clock;

/// Executable parameters.
pub mod params;

/// Robot discovery - candidate probing and endpoint selection.
pub mod resolver;

/// State fusion - folds operator intent, safety state and external authority
/// into the per-tick control intent.
pub mod state_fusion;

/// Station command processor - applies operator commands to the data store.
pub mod tc_processor;

/// Telemetry server - fans immutable state snapshots out to subscribers.
pub mod tm_server;
