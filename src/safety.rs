//! Safety checks for the RUNNING state.
//!
//! The monitor runs **every control tick before temperature control**
//! and decides whether a safety event must be posted to the state
//! machine. Two of the conditions are debounced against the monotonic
//! clock (timers live in [`ControlContext`]); the critical-temperature
//! check pre-empts everything with no grace period.
//!
//! ## Condition lifecycle
//!
//! 1. A condition appears (e.g. level switch reads low).
//! 2. The first tick that sees it arms the corresponding timer.
//! 3. If the condition persists past its timeout, the monitor returns
//!    the matching [`SystemEvent`] and the supervisor drives the
//!    transition to ERROR (or EMERGENCY_STOP for critical temperature).
//! 4. If the condition clears first, the timer is disarmed and nothing
//!    is posted.

use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::SystemConfig;
use crate::fsm::context::ControlContext;
use crate::fsm::states::SystemEvent;

/// Periodic safety monitor.
pub struct SafetyMonitor {
    temp_max: f64,
    temp_critical: f64,
    low_level_timeout: Duration,
    over_temp_timeout: Duration,
}

impl SafetyMonitor {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            temp_max: config.temp_max,
            temp_critical: config.temp_critical,
            low_level_timeout: Duration::from_secs_f64(config.low_level_timeout_secs),
            over_temp_timeout: Duration::from_secs_f64(config.over_temp_timeout_secs),
        }
    }

    /// Evaluate all RUNNING-state safety conditions.
    ///
    /// Returns at most one event per tick, highest severity first; a
    /// persisting lower-severity condition is picked up on the next
    /// tick. Timers for cleared conditions are disarmed.
    pub fn check_running(&self, ctx: &mut ControlContext, now: Instant) -> Option<SystemEvent> {
        // ── Critical temperature: immediate, no debounce ─────────
        if ctx.current_temp > self.temp_critical {
            error!(
                "SAFETY: {:.1}°C exceeds critical limit {:.1}°C",
                ctx.current_temp, self.temp_critical
            );
            return Some(SystemEvent::CriticalTemp);
        }

        // ── Coolant level (debounced) ────────────────────────────
        if !ctx.level_ok {
            match ctx.low_level_since {
                None => {
                    warn!("SAFETY: coolant level low, arming timer");
                    ctx.low_level_since = Some(now);
                }
                Some(since) if now.duration_since(since) >= self.low_level_timeout => {
                    error!(
                        "SAFETY: coolant level low for {:.1}s",
                        now.duration_since(since).as_secs_f64()
                    );
                    return Some(SystemEvent::LowCoolant);
                }
                Some(_) => {}
            }
        } else if ctx.low_level_since.take().is_some() {
            info!("SAFETY: coolant level restored");
        }

        // ── Over-temperature (debounced) ─────────────────────────
        if ctx.current_temp > self.temp_max {
            match ctx.over_temp_since {
                None => {
                    warn!(
                        "SAFETY: {:.1}°C above max {:.1}°C, arming timer",
                        ctx.current_temp, self.temp_max
                    );
                    ctx.over_temp_since = Some(now);
                }
                Some(since) if now.duration_since(since) >= self.over_temp_timeout => {
                    error!(
                        "SAFETY: over-temperature for {:.1}s",
                        now.duration_since(since).as_secs_f64()
                    );
                    return Some(SystemEvent::OverTemp);
                }
                Some(_) => {}
            }
        } else if ctx.over_temp_since.take().is_some() {
            info!("SAFETY: temperature back below max");
        }

        None
    }

    /// Recovery condition evaluated while in ERROR: level restored,
    /// temperature below max, and the operator still wants the system
    /// on.
    pub fn recovery_ready(&self, ctx: &ControlContext) -> bool {
        ctx.level_ok && ctx.current_temp < self.temp_max && ctx.ignition
    }
}
