//! # Driver station executive
//!
//! [`DsExec`] owns the data store, the cyclic modules and the network
//! clients, and runs one control cycle per call to [`DsExec::cycle`]. The
//! binary drives it at 50 Hz against the wall clock; tests drive it with
//! fabricated instants.
//!
//! Within a cycle the order is fixed: operator commands, device feed,
//! field control, network drain, connection management, match clock,
//! battery monitor, state fusion, frame emission, telemetry fan-out.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::cmp::max;
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use thiserror::Error;

// Internal
use comms_if::{
    addr::RobotEndpoint,
    tc::StationCommand,
    wire::{ControlFrame, RequestType, StatusFrame}
};
use util::module::State;

use crate::batt_monitor::{self, BattMonitorError, BatteryLevel};
use crate::comms_client::{CommsClient, CommsError};
use crate::data_store::{ConnRequest, ConnState, DataStore, DsError, DsEvent};
use crate::fms_client::{FmsClient, FmsClientError};
use crate::joystick::DeviceEvent;
use crate::match_clock::{self, MatchClockError};
use crate::params::DsExecParams;
use crate::resolver::Resolver;
use crate::state_fusion::{self, FusionError};
use crate::tc_processor;
use crate::tm_server::{TmMessage, TmServer};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// The driver station executive.
pub struct DsExec {
    params: DsExecParams,

    ds: DataStore,

    comms: CommsClient,
    fms_client: FmsClient,
    tm_server: TmServer,

    /// Present only while discovery is in progress.
    resolver: Option<Resolver>,

    /// When the last discovery attempt failed, for the cooldown.
    last_discovery_fail: Option<Instant>,

    /// Decode-error count already surfaced in the last-error slot.
    surfaced_decode_errors: u64,

    command_queue: VecDeque<StationCommand>,
    device_queue: VecDeque<DeviceEvent>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while initialising the executive.
#[derive(Debug, Error)]
pub enum DsExecInitError {
    #[error("Could not initialise the comms client: {0}")]
    CommsError(#[from] CommsError),

    #[error("Could not initialise the field-control client: {0}")]
    FmsError(#[from] FmsClientError),

    #[error("Could not initialise the battery monitor: {0}")]
    BattMonitorError(#[from] BattMonitorError),

    #[error("Could not initialise the match clock: {0}")]
    MatchClockError(#[from] MatchClockError),

    #[error("Could not initialise state fusion: {0}")]
    FusionError(#[from] FusionError)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DsExec {
    /// Build the executive: bind the sockets and initialise the modules.
    pub fn new(params: DsExecParams) -> Result<Self, DsExecInitError> {
        let comms = CommsClient::new(params.network.local_port)?;
        let fms_client = FmsClient::new(
            params.network.fms_port,
            params.network.fms_enabled
        )?;

        let mut ds = DataStore::default();
        ds.cycles_per_second =
            (1000 / max(params.network.send_interval_ms, 1)) as u128;

        ds.match_clock.init(params.match_clock.clone())?;
        ds.batt_monitor.init(params.battery.clone())?;
        ds.fusion.init(())?;

        info!(
            "Executive initialised, station port {}, {} cycles/s",
            comms.local_port(),
            ds.cycles_per_second
        );

        Ok(Self {
            params,
            ds,
            comms,
            fms_client,
            tm_server: TmServer::default(),
            resolver: None,
            last_discovery_fail: None,
            surfaced_decode_errors: 0,
            command_queue: VecDeque::new(),
            device_queue: VecDeque::new()
        })
    }

    /// Queue an operator command for the next cycle.
    pub fn push_command(&mut self, cmd: StationCommand) {
        self.command_queue.push_back(cmd);
    }

    /// Queue a device feed event for the next cycle.
    pub fn push_device_event(&mut self, event: DeviceEvent) {
        self.device_queue.push_back(event);
    }

    /// Register a telemetry subscriber.
    pub fn subscribe(&mut self) -> Receiver<TmMessage> {
        self.tm_server.subscribe()
    }

    /// Read-only view of the data store, for embedders and tests.
    pub fn data_store(&self) -> &DataStore {
        &self.ds
    }

    /// The port the station socket actually bound.
    pub fn local_port(&self) -> u16 {
        self.comms.local_port()
    }

    /// The port the field-control listener actually bound, zero when
    /// disabled.
    pub fn fms_port(&self) -> u16 {
        self.fms_client.local_port()
    }

    /// Run one control cycle.
    pub fn cycle(&mut self, now: Instant) {
        self.ds.cycle_start();

        // ---- COMMAND PROCESSING ----

        while let Some(cmd) = self.command_queue.pop_front() {
            tc_processor::exec(&mut self.ds, &cmd, now);
        }

        // ---- DEVICE FEED ----

        while let Some(event) = self.device_queue.pop_front() {
            self.ds.joysticks.handle_event(&event);
        }

        // ---- FIELD CONTROL ----

        self.ds.fms_directive = self.fms_client.poll(now);

        // ---- STATUS RECEIVE ----

        for (src, frame) in self.comms.recv_all(now) {
            self.handle_status_frame(src, frame, now);
        }

        // ---- CONNECTION MANAGEMENT ----

        match self.ds.conn_request.take() {
            Some(ConnRequest::Connect) => self.start_discovery(now),
            Some(ConnRequest::Disconnect) => self.drop_link(),
            None => ()
        }

        self.discovery_proc(now);
        self.watchdog_proc(now);

        if self.ds.is_1_hz_cycle {
            self.net_stats_proc(now);
        }

        // ---- MATCH CLOCK ----

        let clock_input = match_clock::InputData {
            fms_attached: self.ds.fms_directive.is_some(),
            operator_enabled: self.ds.operator_enabled
        };
        match self.ds.match_clock.proc(now, &clock_input) {
            Ok((output, report)) => {
                if let Some(phase) = report.phase_changed {
                    self.ds.events.push(DsEvent::MatchPhaseChanged(phase));
                }
                if report.disable_requested {
                    self.ds.operator_enabled = false;
                }
                self.ds.match_clock_output = output;
            },
            Err(e) => match e {}
        }

        // ---- BATTERY MONITOR ----

        match self.ds.batt_monitor.proc(now, &()) {
            Ok((output, report)) => {
                if report.force_disable_changed {
                    self.ds.events.push(
                        DsEvent::ForceDisableChanged(output.force_disable)
                    );
                }
                if let Some(level) = report.level_changed {
                    if level == BatteryLevel::Warning
                        || level == BatteryLevel::Critical
                    {
                        self.ds.events.push(DsEvent::BatteryAlert {
                            level,
                            volts: output.volts
                        });
                    }
                }
                self.ds.batt_output = output;
            },
            Err(e) => warn!("Error during battery monitor processing: {}", e)
        }

        // ---- STATE FUSION ----

        let fusion_input = state_fusion::InputData {
            conn_state: self.ds.conn_state,
            estop: self.ds.estop,
            battery_force_disable: self.ds.batt_output.force_disable,
            operator_enabled: self.ds.operator_enabled,
            operator_mode: self.ds.mode,
            station: self.ds.station,
            fms: self.ds.fms_directive.clone(),
            match_clock: self.ds.match_clock_output
        };
        match self.ds.fusion.proc(now, &fusion_input) {
            Ok((intent, _)) => self.ds.control_intent = intent,
            Err(e) => match e {}
        }

        // ---- FRAME EMISSION ----

        self.emit_frame(now);

        // ---- TELEMETRY ----

        self.tm_server.send_cycle(&self.ds);

        self.ds.num_cycles += 1;
    }

    // ---- CYCLE STEPS ----

    /// Route one decoded status frame.
    fn handle_status_frame(
        &mut self,
        src: std::net::Ipv4Addr,
        frame: StatusFrame,
        now: Instant
    ) {
        match self.ds.conn_state {
            ConnState::Discovering => {
                let selected = self.resolver
                    .as_ref()
                    .map(|r| r.is_candidate(src))
                    .unwrap_or(false);

                if selected {
                    info!("Robot discovered at {}", src);

                    self.ds.endpoint = Some(RobotEndpoint {
                        address: src,
                        robot_port: self.params.network.robot_port,
                        local_port: self.comms.local_port()
                    });
                    self.resolver = None;
                    self.comms.reset_stats();

                    self.ds.set_conn_state(ConnState::Connected);
                    self.ds.apply_status_frame(&frame, now);
                }
                else {
                    debug!("Ignoring status frame from non-candidate {}", src);
                }
            },

            ConnState::Connected | ConnState::ConnectionLost => {
                // The peer is identified by address alone
                let from_robot = self.ds.endpoint
                    .map(|e| e.address == src)
                    .unwrap_or(false);

                if from_robot {
                    if self.ds.conn_state == ConnState::ConnectionLost {
                        info!("Robot link re-established");
                        self.comms.reset_stats();
                        self.ds.set_conn_state(ConnState::Connected);
                    }

                    self.ds.apply_status_frame(&frame, now);
                }
            },

            ConnState::Disconnected => {
                debug!("Ignoring status frame from {} while disconnected", src);
            }
        }
    }

    /// Begin discovery from the configured connection settings.
    ///
    /// A failed validation refuses the operation without touching the
    /// current connection state.
    fn start_discovery(&mut self, now: Instant) {
        let config = match self.params.connection.config() {
            Ok(c) => c,
            Err(e) => {
                self.ds.raise_error(e);
                return
            }
        };

        let earliest = match self.last_discovery_fail {
            Some(failed) => max(
                now,
                failed + Duration::from_millis(
                    self.params.network.discovery_cooldown_ms
                )
            ),
            None => now
        };

        match Resolver::begin(
            &config,
            earliest,
            Duration::from_millis(self.params.network.discovery_window_ms)
        ) {
            Ok(resolver) => {
                self.resolver = Some(resolver);
                self.ds.endpoint = None;
                self.ds.set_conn_state(ConnState::Discovering);
            },
            Err(e) => self.ds.raise_error(e.into())
        }
    }

    /// Operator disconnect: drop everything and go quiet.
    fn drop_link(&mut self) {
        info!("Operator disconnect");

        self.resolver = None;
        self.ds.endpoint = None;
        self.ds.zero_link_telemetry();
        self.ds.batt_monitor.clear_latest();
        self.comms.reset_stats();
        self.ds.set_conn_state(ConnState::Disconnected);
    }

    /// Advance discovery: collect the name-service result, enforce the
    /// window, send the probe that is due.
    fn discovery_proc(&mut self, now: Instant) {
        if self.ds.conn_state != ConnState::Discovering {
            return
        }

        let expired = match self.resolver.as_mut() {
            Some(resolver) => {
                resolver.poll_name_service();
                resolver.expired(now)
            },
            None => return
        };

        if expired {
            self.resolver = None;
            self.last_discovery_fail = Some(now);

            self.ds.raise_error(DsError::NotFound);
            self.ds.set_conn_state(ConnState::Disconnected);

            return
        }

        let probe_dest = match self.resolver.as_mut() {
            Some(resolver) => resolver.next_probe(now),
            None => None
        };

        if let Some(address) = probe_dest {
            let probe = ControlFrame::neutral(0);

            match self.comms.send_frame(
                probe, address, self.params.network.robot_port, now
            ) {
                Ok(seq) => debug!("Probe {} sent to {}", seq, address),
                Err(e) => warn!("Could not send probe to {}: {}", address, e)
            }
        }
    }

    /// Declare the link lost after the watchdog timeout of silence.
    fn watchdog_proc(&mut self, now: Instant) {
        if self.ds.conn_state != ConnState::Connected {
            return
        }

        let timeout = Duration::from_millis(
            self.params.network.watchdog_timeout_ms
        );
        let silent = self.ds.last_packet_time
            .map(|t| now.saturating_duration_since(t) > timeout)
            .unwrap_or(true);

        if silent {
            error!(
                "No telemetry for more than {} ms, link lost",
                self.params.network.watchdog_timeout_ms
            );

            self.ds.set_conn_state(ConnState::ConnectionLost);
            self.ds.zero_link_telemetry();
            self.ds.batt_monitor.clear_latest();
            self.comms.reset_stats();
            self.ds.raise_error(DsError::LinkLost);
        }
    }

    /// Refresh the link statistics on the 1 Hz tick.
    fn net_stats_proc(&mut self, now: Instant) {
        self.comms.prune(now);

        if self.ds.conn_state == ConnState::Connected {
            let stats = self.comms.stats();
            self.ds.latency_ms = stats.latency_ms;
            self.ds.packet_loss = stats.packet_loss;
            self.ds.bandwidth_kbps = stats.bandwidth_kbps;
        }

        // Decode failures are dropped and counted where they happen; here
        // they only refresh the last-error slot, without event spam
        let decode_errors = self.comms.decode_errors();
        if decode_errors > self.surfaced_decode_errors {
            self.surfaced_decode_errors = decode_errors;
            self.ds.last_error = Some(DsError::Decode(format!(
                "{} undecodable datagram(s) dropped", decode_errors
            )));
        }
    }

    /// Emit this cycle's control frame towards the selected endpoint.
    ///
    /// While no endpoint is selected there is nothing to address a frame
    /// to; during discovery the probes take this role.
    fn emit_frame(&mut self, now: Instant) {
        let endpoint = match self.ds.endpoint {
            Some(e) => e,
            None => return
        };

        // A pending one-shot request rides in exactly one frame
        let request = self.ds.pending_request
            .take()
            .unwrap_or(RequestType::Normal);

        let frame = ControlFrame {
            seq: 0,
            flags: self.ds.control_intent.flags,
            request,
            station: self.ds.control_intent.station,
            joysticks: self.ds.joysticks.snapshot()
        };

        match self.comms.send_frame(
            frame, endpoint.address, endpoint.robot_port, now
        ) {
            Ok(_) => (),
            Err(e) => {
                warn!("Could not send control frame: {}", e);
                self.ds.last_error = Some(DsError::Transport(e.to_string()));

                // The request never made it onto the wire, keep it pending
                if request != RequestType::Normal {
                    self.ds.pending_request = Some(request);
                }
            }
        }
    }
}
