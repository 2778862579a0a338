//! # Telemetry Server
//!
//! Fans the executive's state out to subscribers (UI shell, loggers, tests)
//! as immutable snapshots over channels. One snapshot is broadcast per
//! cycle, together with any discrete events the cycle raised; subscribers
//! never share mutable state with the control loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::sync::mpsc::{self, Receiver, Sender};

use serde::Serialize;

// Internal
use comms_if::{
    fms::FmsDirective,
    wire::{MatchPhase, RobotMode, Station, StatusFlags}
};

use crate::batt_monitor::BatteryLevel;
use crate::data_store::{ConnState, DataStore, DsError, DsEvent};
use crate::match_clock;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Telemetry server.
#[derive(Default)]
pub struct TmServer {
    subscribers: Vec<Sender<TmMessage>>
}

/// Snapshot of the station state that is broadcast every cycle.
#[derive(Clone, Debug, Serialize)]
pub struct DsTelemetry {
    pub conn_state: ConnState,

    /// The enable actually being sent to the robot this cycle.
    pub enabled: bool,

    /// The mode actually being sent to the robot this cycle.
    pub mode: RobotMode,

    pub estop: bool,
    pub station: Station,

    pub battery_volts: f64,
    pub battery_level: BatteryLevel,
    pub battery_force_disable: bool,

    pub robot_status: Option<StatusFlags>,
    pub cpu_pct: u8,
    pub ram_pct: u8,
    pub disk_pct: u8,
    pub can_util_pct: f64,
    pub can_bus_off: u8,
    pub code_running: bool,

    pub match_clock: match_clock::OutputData,
    pub robot_match_phase: Option<MatchPhase>,
    pub robot_seconds_remaining: u16,

    pub fms: Option<FmsDirective>,

    pub latency_ms: f64,
    pub packet_loss: f64,
    pub bandwidth_kbps: f64,

    pub joysticks_bound: usize,

    pub last_error: Option<DsError>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A message delivered to telemetry subscribers.
#[derive(Clone, Debug, Serialize)]
pub enum TmMessage {
    /// The per-cycle state snapshot.
    Telemetry(DsTelemetry),

    /// A discrete event raised during the cycle.
    Event(DsEvent)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmServer {
    /// Register a new subscriber.
    pub fn subscribe(&mut self) -> Receiver<TmMessage> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Broadcast this cycle's events and state snapshot.
    ///
    /// Subscribers whose receiving end has gone away are dropped silently.
    pub fn send_cycle(&mut self, ds: &DataStore) {
        for event in ds.events.iter() {
            self.broadcast(TmMessage::Event(event.clone()));
        }

        self.broadcast(TmMessage::Telemetry(DsTelemetry::from_datastore(ds)));
    }

    fn broadcast(&mut self, message: TmMessage) {
        self.subscribers.retain(|tx| tx.send(message.clone()).is_ok());
    }
}

impl DsTelemetry {
    pub fn from_datastore(ds: &DataStore) -> Self {
        Self {
            conn_state: ds.conn_state,
            enabled: ds.control_intent.flags.enabled,
            mode: ds.control_intent.flags.mode(),
            estop: ds.estop,
            station: ds.station,

            battery_volts: ds.battery_volts,
            battery_level: ds.batt_output.level,
            battery_force_disable: ds.batt_output.force_disable,

            robot_status: ds.robot_status,
            cpu_pct: ds.cpu_pct,
            ram_pct: ds.ram_pct,
            disk_pct: ds.disk_pct,
            can_util_pct: ds.can_util_pct,
            can_bus_off: ds.can_bus_off,
            code_running: ds.code_running,

            match_clock: ds.match_clock_output,
            robot_match_phase: ds.robot_match_phase,
            robot_seconds_remaining: ds.robot_seconds_remaining,

            fms: ds.fms_directive.clone(),

            latency_ms: ds.latency_ms,
            packet_loss: ds.packet_loss,
            bandwidth_kbps: ds.bandwidth_kbps,

            joysticks_bound: ds.joysticks.bound_count(),

            last_error: ds.last_error.clone()
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
    fn test_events_then_snapshot() {
        let mut server = TmServer::default();
        let rx = server.subscribe();

        let mut ds = DataStore::default();
        ds.set_conn_state(ConnState::Discovering);
        ds.battery_volts = 12.1;

        server.send_cycle(&ds);

        match rx.try_recv().unwrap() {
            TmMessage::Event(DsEvent::ConnStateChanged(state)) =>
                assert_eq!(state, ConnState::Discovering),
            other => panic!("expected event, got {:?}", other)
        }

        match rx.try_recv().unwrap() {
            TmMessage::Telemetry(tm) => {
                assert_eq!(tm.conn_state, ConnState::Discovering);
                assert!((tm.battery_volts - 12.1).abs() < 1e-9);
                assert!(!tm.enabled);
            },
            other => panic!("expected telemetry, got {:?}", other)
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dead_subscribers_dropped() {
        let mut server = TmServer::default();

        let rx_live = server.subscribe();
        let rx_dead = server.subscribe();
        drop(rx_dead);

        server.send_cycle(&DataStore::default());
        assert_eq!(server.subscribers.len(), 1);

        assert!(rx_live.try_recv().is_ok());
    }

    #[test]
    fn test_snapshot_serialises() {
        let tm = DsTelemetry::from_datastore(&DataStore::default());
        let json = serde_json::to_string(&TmMessage::Telemetry(tm)).unwrap();
        assert!(json.contains("Disconnected"));
    }
}
