//! Shared mutable context threaded through every FSM callback.
//!
//! `ControlContext` is the single struct that entry hooks, guards, and
//! the safety checks read from and write to: the latest sensor values,
//! the actuator command outputs, the safety debounce timers, and the
//! configuration. The supervisor serializes all access under its lock.

use std::time::Instant;

use crate::config::SystemConfig;

// ---------------------------------------------------------------------------
// Actuator outputs (written by state hooks and temperature control;
// emitted onto the bus by the supervisor)
// ---------------------------------------------------------------------------

/// Commanded actuator state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorOutputs {
    /// Circulation pump on/off.
    pub pump_on: bool,
    /// Fan on/off.
    pub fan_on: bool,
    /// Fan speed in percent (0–100).
    pub fan_speed: u8,
}

impl ActuatorOutputs {
    /// Everything off — safe default.
    pub fn all_off() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// ControlContext
// ---------------------------------------------------------------------------

/// The shared context passed to every FSM callback.
pub struct ControlContext {
    // -- Sensor data --
    /// Latest coolant temperature (°C).
    pub current_temp: f64,
    /// Coolant level switch: `true` = level adequate.
    pub level_ok: bool,
    /// Ignition input.
    pub ignition: bool,

    // -- Actuator outputs --
    pub outputs: ActuatorOutputs,

    // -- Safety timers --
    /// When the pump was started for the INITIALIZING circulation wait.
    /// `Some` only while INITIALIZING with the pump commanded on.
    pub pump_start: Option<Instant>,
    /// Start of a continuous low-level reading while RUNNING.
    pub low_level_since: Option<Instant>,
    /// Start of a continuous above-`temp_max` excursion while RUNNING.
    pub over_temp_since: Option<Instant>,

    // -- Configuration --
    pub config: SystemConfig,
}

impl ControlContext {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            current_temp: 25.0,
            level_ok: true,
            ignition: false,
            outputs: ActuatorOutputs::all_off(),
            pump_start: None,
            low_level_since: None,
            over_temp_since: None,
            config,
        }
    }

    /// Drop all safety debounce timers (on leaving RUNNING the
    /// conditions they track are no longer meaningful).
    pub fn clear_safety_timers(&mut self) {
        self.low_level_since = None;
        self.over_temp_since = None;
    }
}
