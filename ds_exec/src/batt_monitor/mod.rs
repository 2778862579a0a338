//! Battery monitor module
//!
//! Watches the robot battery voltage reported in telemetry, classifies it
//! into alert levels and forces the robot disabled while the rolling average
//! sits at or below the critical threshold.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

// Internal
use util::module::State;

use crate::params::BattMonitorParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of voltage readings retained (one hour at 1 Hz).
const MAX_HISTORY_SIZE: usize = 3600;

/// Window over which a sustained critical average forces a disable.
const SUSTAINED_CRITICAL_WINDOW: Duration = Duration::from_secs(2);

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Battery monitor module state.
#[derive(Default)]
pub struct BattMonitor {
    params: BattMonitorParams,

    /// Latest reported voltage, zero when no robot is on the link.
    latest_volts: f64,

    level: BatteryLevel,

    force_disable: bool,

    history: VecDeque<(Instant, f64)>
}

/// Output data from the battery monitor.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct OutputData {
    pub level: BatteryLevel,

    pub volts: f64,

    /// The monitor demands the robot stay disabled.
    pub force_disable: bool
}

/// Status report for battery monitor processing.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatusReport {
    /// Set when the alert level changed this cycle.
    pub level_changed: Option<BatteryLevel>,

    /// Set when the forced disable was raised or released this cycle.
    pub force_disable_changed: bool
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Battery alert levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BatteryLevel {
    Unknown,
    Critical,
    Warning,
    Normal
}

/// Possible errors that can occur during battery monitor operation.
#[derive(Debug, Error)]
pub enum BattMonitorError {
    #[error(
        "Critical threshold ({0} V) must be below the warning threshold \
        ({1} V)")]
    InvalidThresholds(f64, f64)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for BatteryLevel {
    fn default() -> Self {
        BatteryLevel::Unknown
    }
}

impl State for BattMonitor {
    type InitData = BattMonitorParams;
    type InitError = BattMonitorError;

    /// Voltages arrive through [`BattMonitor::update_voltage`] as telemetry
    /// lands, the cycle itself needs nothing beyond its timestamp.
    type InputData = ();
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = BattMonitorError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        if init_data.critical_volts >= init_data.warning_volts {
            return Err(BattMonitorError::InvalidThresholds(
                init_data.critical_volts,
                init_data.warning_volts
            ))
        }

        self.params = init_data;

        Ok(())
    }

    /// Perform cyclic processing of the battery monitor.
    fn proc(&mut self, now: Instant, _input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let mut report = StatusReport::default();

        // Reclassify the latest voltage
        let new_level = self.classify(self.latest_volts);
        if new_level != self.level {
            info!(
                "Battery level changed: {:?} -> {:?} ({:.2} V)",
                self.level, new_level, self.latest_volts
            );
            self.level = new_level;
            report.level_changed = Some(new_level);
        }

        // Check for a sustained critical average over the rolling window
        let average = self.average_voltage(now, SUSTAINED_CRITICAL_WINDOW);
        let sustained_critical = self.params.auto_disable
            && average > 0.0
            && average <= self.params.critical_volts;

        if sustained_critical != self.force_disable {
            self.force_disable = sustained_critical;
            report.force_disable_changed = true;

            if sustained_critical {
                warn!(
                    "Sustained critical battery voltage ({:.2} V average), \
                    forcing disable",
                    average
                );
            }
            else {
                info!("Battery voltage recovered, disable released");
            }
        }

        let output = OutputData {
            level: self.level,
            volts: self.latest_volts,
            force_disable: self.force_disable
        };

        Ok((output, report))
    }
}

impl BattMonitor {
    /// Record a voltage reading from a telemetry update.
    pub fn update_voltage(&mut self, now: Instant, volts: f64) {
        self.latest_volts = volts;

        self.history.push_back((now, volts));
        while self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }

    /// Forget the latest reading, used when the robot link drops.
    ///
    /// The history is retained for post-run inspection.
    pub fn clear_latest(&mut self) {
        self.latest_volts = 0.0;
    }

    /// Replace the alert thresholds. The level is reclassified on the next
    /// cycle.
    pub fn set_thresholds(
        &mut self, critical_volts: f64, warning_volts: f64
    ) -> Result<(), BattMonitorError> {
        if critical_volts >= warning_volts {
            return Err(BattMonitorError::InvalidThresholds(
                critical_volts, warning_volts
            ))
        }

        self.params.critical_volts = critical_volts;
        self.params.warning_volts = warning_volts;

        Ok(())
    }

    /// Voltage readings within the given window, oldest first.
    pub fn voltage_history(&self, now: Instant, window: Duration) -> Vec<f64> {
        self.history
            .iter()
            .filter(|(t, _)| now.saturating_duration_since(*t) <= window)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Mean voltage over the given window, zero when no readings fall in it.
    pub fn average_voltage(&self, now: Instant, window: Duration) -> f64 {
        let history = self.voltage_history(now, window);

        if history.is_empty() {
            return 0.0
        }

        history.iter().sum::<f64>() / history.len() as f64
    }

    /// Minimum voltage over the given window, zero when no readings fall in
    /// it.
    pub fn minimum_voltage(&self, now: Instant, window: Duration) -> f64 {
        self.voltage_history(now, window)
            .into_iter()
            .fold(0.0f64, |min, v| if min == 0.0 || v < min { v } else { min })
    }

    fn classify(&self, volts: f64) -> BatteryLevel {
        if volts <= 0.0 {
            BatteryLevel::Unknown
        }
        else if volts <= self.params.critical_volts {
            BatteryLevel::Critical
        }
        else if volts <= self.params.warning_volts {
            BatteryLevel::Warning
        }
        else {
            BatteryLevel::Normal
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn monitor() -> BattMonitor {
        let mut monitor = BattMonitor::default();
        monitor.init(BattMonitorParams::default()).unwrap();
        monitor
    }

    #[test]
    fn test_level_classification() {
        let mut monitor = monitor();
        let t0 = Instant::now();

        let mut level_at = |volts: f64, at: Instant| {
            monitor.update_voltage(at, volts);
            monitor.proc(at, &()).unwrap().0.level
        };

        assert_eq!(level_at(12.6, t0), BatteryLevel::Normal);
        assert_eq!(level_at(11.5, t0), BatteryLevel::Warning);
        assert_eq!(level_at(10.5, t0), BatteryLevel::Critical);
        assert_eq!(level_at(0.0, t0), BatteryLevel::Unknown);
    }

    #[test]
    fn test_sustained_critical_force_disable() {
        let mut monitor = monitor();
        let t0 = Instant::now();

        // Healthy readings first
        for s in 0..3u64 {
            monitor.update_voltage(t0 + Duration::from_secs(s), 12.5);
        }
        let (out, _) = monitor
            .proc(t0 + Duration::from_secs(2), &())
            .unwrap();
        assert!(!out.force_disable);

        // Two seconds of critical readings drag the rolling average down
        let mut t = t0 + Duration::from_secs(3);
        monitor.update_voltage(t, 9.8);
        t += Duration::from_secs(1);
        monitor.update_voltage(t, 9.9);
        t += Duration::from_secs(1);
        monitor.update_voltage(t, 10.0);

        let (out, report) = monitor.proc(t, &()).unwrap();
        assert!(out.force_disable);
        assert!(report.force_disable_changed);

        // Recovery releases the disable once the average climbs back out
        t += Duration::from_secs(1);
        monitor.update_voltage(t, 12.7);
        t += Duration::from_secs(1);
        monitor.update_voltage(t, 12.8);
        t += Duration::from_secs(1);
        monitor.update_voltage(t, 12.8);

        let (out, report) = monitor.proc(t, &()).unwrap();
        assert!(!out.force_disable);
        assert!(report.force_disable_changed);
    }

    #[test]
    fn test_auto_disable_opt_out() {
        let mut monitor = BattMonitor::default();
        monitor.init(BattMonitorParams {
            auto_disable: false,
            ..Default::default()
        }).unwrap();

        let t0 = Instant::now();
        monitor.update_voltage(t0, 9.0);
        monitor.update_voltage(t0 + Duration::from_secs(1), 9.0);
        monitor.update_voltage(t0 + Duration::from_secs(2), 9.0);

        let (out, _) = monitor
            .proc(t0 + Duration::from_secs(2), &())
            .unwrap();

        assert_eq!(out.level, BatteryLevel::Critical);
        assert!(!out.force_disable);
    }

    #[test]
    fn test_history_queries() {
        let mut monitor = monitor();
        let t0 = Instant::now();

        for s in 0..10u64 {
            monitor.update_voltage(
                t0 + Duration::from_secs(s), 12.0 + s as f64 * 0.1
            );
        }
        let now = t0 + Duration::from_secs(9);

        let recent = monitor.voltage_history(now, Duration::from_secs(3));
        assert_eq!(recent.len(), 4);
        assert!((recent[0] - 12.6).abs() < 1e-9);

        assert!(
            (monitor.minimum_voltage(now, Duration::from_secs(3)) - 12.6).abs()
            < 1e-9
        );

        let average = monitor.average_voltage(now, Duration::from_secs(3));
        assert!((average - 12.75).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_thresholds() {
        let mut uninitialised = BattMonitor::default();
        assert!(matches!(
            uninitialised.init(BattMonitorParams {
                critical_volts: 12.0,
                warning_volts: 11.0,
                ..Default::default()
            }),
            Err(BattMonitorError::InvalidThresholds(_, _))
        ));

        let mut initialised = monitor();
        assert!(initialised.set_thresholds(10.0, 11.0).is_ok());
        assert!(initialised.set_thresholds(11.0, 10.0).is_err());
    }
}
