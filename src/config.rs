//! System configuration parameters
//!
//! All tunable parameters for the cooling loop controller: temperature
//! thresholds, safety timeouts, PID gains, control-loop timing, and the
//! CAN identifiers of every sensor and actuator on the bus.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Temperature thresholds (Celsius) ---
    /// Coolant temperature setpoint for the fan PID
    pub temp_target: f64,
    /// Sustained operation above this triggers the over-temperature timeout
    pub temp_max: f64,
    /// Immediate emergency stop above this
    pub temp_critical: f64,
    /// Fan switches on above this temperature
    pub fan_start_temp: f64,
    /// Fan switches off below `fan_start_temp - fan_hysteresis`
    pub fan_hysteresis: f64,

    // --- PID gains ---
    pub pid_kp: f64,
    pub pid_ki: f64,
    pub pid_kd: f64,

    // --- Safety timeouts (seconds) ---
    /// Pump circulation time before INITIALIZING completes
    pub pump_init_secs: f64,
    /// Grace period for a low coolant level reading while running
    pub low_level_timeout_secs: f64,
    /// Grace period above `temp_max` before the system errors out
    pub over_temp_timeout_secs: f64,

    // --- Timing ---
    /// Control loop interval (milliseconds)
    pub control_loop_interval_ms: u64,

    // --- CAN identifiers ---
    pub temp_sensor_id: u16,
    pub level_sensor_id: u16,
    pub ignition_id: u16,
    pub pump_control_id: u16,
    pub fan_control_id: u16,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Thresholds
            temp_target: 65.0,
            temp_max: 75.0,
            temp_critical: 85.0,
            fan_start_temp: 60.0,
            fan_hysteresis: 5.0,

            // PID
            pid_kp: 2.5,
            pid_ki: 0.5,
            pid_kd: 0.1,

            // Safety timeouts
            pump_init_secs: 2.0,
            low_level_timeout_secs: 3.0,
            over_temp_timeout_secs: 10.0,

            // Timing
            control_loop_interval_ms: 100, // 10 Hz

            // CAN IDs
            temp_sensor_id: 0x100,
            level_sensor_id: 0x101,
            ignition_id: 0x102,
            pump_control_id: 0x200,
            fan_control_id: 0x201,
        }
    }
}

impl SystemConfig {
    /// Validate value ranges before the system starts.
    ///
    /// Invalid ranges are rejected, not silently clamped — a bad
    /// `--setpoint` must not be able to disable thermal protection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.temp_target.is_finite() {
            return Err(ConfigError::NotFinite { field: "temp_target" });
        }
        if self.temp_target <= 0.0 || self.temp_target >= self.temp_critical {
            return Err(ConfigError::OutOfRange {
                field: "temp_target",
                value: self.temp_target,
            });
        }
        if self.temp_max >= self.temp_critical {
            return Err(ConfigError::OutOfRange {
                field: "temp_max",
                value: self.temp_max,
            });
        }
        if self.fan_hysteresis < 0.0 || !self.fan_hysteresis.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: "fan_hysteresis",
                value: self.fan_hysteresis,
            });
        }
        if self.control_loop_interval_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "control_loop_interval_ms",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Duration of one control tick in seconds.
    pub fn tick_secs(&self) -> f64 {
        self.control_loop_interval_ms as f64 / 1000.0
    }
}
